//! Settings loading from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `SQLWEAVE_DEBUG` | `debug` |
//! | `SQLWEAVE_LOG_LEVEL` | `log_level` |
//! | `SQLWEAVE_DIALECT` | `default_dialect` |
//! | `SQLWEAVE_CIPHER_KEY` | `cipher.default_key` |
//! | `SQLWEAVE_CIPHER_KEY_SIZE` | `cipher.key_size` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use sqlweave_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/sqlweave.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::WeaveError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, WeaveError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| WeaveError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_into_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, WeaveError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        WeaveError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, WeaveError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, WeaveError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| WeaveError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_into_defaults(json_value, "JSON")
}

/// Applies `SQLWEAVE_*` environment variable overrides to a settings struct.
///
/// Unparseable numeric values are ignored and leave the setting unchanged.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("SQLWEAVE_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("SQLWEAVE_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_DIALECT") {
        settings.default_dialect = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_CIPHER_KEY") {
        settings.cipher.default_key = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_CIPHER_KEY_SIZE") {
        if let Ok(size) = val.trim().parse::<u16>() {
            settings.cipher.key_size = size;
        }
    }
}

// ============================================================
// Helpers
// ============================================================

fn merge_into_defaults(value: serde_json::Value, format: &str) -> Result<Settings, WeaveError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        WeaveError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        WeaveError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests touching them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = false
            default_dialect = "postgresql"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.default_dialect, "postgresql");
        // Defaults preserved
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.cipher.key_size, 128);
    }

    #[test]
    fn test_from_toml_str_cipher_table() {
        let toml = r#"
            [cipher]
            default_key = "s3cret"
            key_size = 256
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.cipher.default_key, "s3cret");
        assert_eq!(settings.cipher.key_size, 256);
    }

    #[test]
    fn test_from_toml_str_partial_cipher_table_keeps_defaults() {
        let settings = from_toml_str("[cipher]\ndefault_key = \"k\"").unwrap();
        assert_eq!(settings.cipher.default_key, "k");
        assert_eq!(settings.cipher.key_size, 128);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert!(settings.debug);
        assert_eq!(settings.default_dialect, "mssql");
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(matches!(result, Err(WeaveError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let result = from_toml_str("debug = \"sometimes\"");
        assert!(result.is_err());
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{"log_level": "debug", "cipher": {"key_size": 256}}"#;
        let settings = from_json_str(json).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.cipher.key_size, 256);
        assert!(settings.cipher.default_key.is_empty());
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{invalid json").is_err());
    }

    // ── File loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlweave.toml");
        std::fs::write(&path, "default_dialect = \"sqlite\"\ndebug = false\n").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert_eq!(settings.default_dialect, "sqlite");
        assert!(!settings.debug);
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/path/sqlweave.toml");
        assert!(result.is_err());
    }

    // ── Environment variable overrides ──────────────────────────────

    #[test]
    fn test_apply_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut settings = Settings::default();
        std::env::set_var("SQLWEAVE_DIALECT", "postgresql");
        std::env::set_var("SQLWEAVE_CIPHER_KEY", "env-key");
        std::env::set_var("SQLWEAVE_CIPHER_KEY_SIZE", "256");
        std::env::set_var("SQLWEAVE_DEBUG", "0");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.default_dialect, "postgresql");
        assert_eq!(settings.cipher.default_key, "env-key");
        assert_eq!(settings.cipher.key_size, 256);
        assert!(!settings.debug);
        std::env::remove_var("SQLWEAVE_DIALECT");
        std::env::remove_var("SQLWEAVE_CIPHER_KEY");
        std::env::remove_var("SQLWEAVE_CIPHER_KEY_SIZE");
        std::env::remove_var("SQLWEAVE_DEBUG");
    }

    #[test]
    fn test_apply_env_overrides_invalid_key_size() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut settings = Settings::default();
        std::env::set_var("SQLWEAVE_CIPHER_KEY_SIZE", "huge");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.cipher.key_size, 128);
        std::env::remove_var("SQLWEAVE_CIPHER_KEY_SIZE");
    }

    #[test]
    fn test_toml_with_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings_env.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

        std::env::set_var("SQLWEAVE_LOG_LEVEL", "trace");
        let settings = from_toml_file_with_env(&path).unwrap();
        assert_eq!(settings.log_level, "trace");
        std::env::remove_var("SQLWEAVE_LOG_LEVEL");
    }

    // ── merge_json helper ───────────────────────────────────────────

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"outer": {"a": 1, "b": 2}});
        let over = serde_json::json!({"outer": {"b": 3}});
        let merged = merge_json(base, over);
        assert_eq!(merged["outer"]["a"], 1);
        assert_eq!(merged["outer"]["b"], 3);
    }
}
