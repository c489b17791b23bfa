//! Settings for the sqlweave crates.
//!
//! This module provides the [`Settings`] struct, which holds the process-wide
//! configuration (default dialect, logging, cipher defaults), and
//! [`LazySettings`], a globally-accessible, lazily-initialized settings
//! instance.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Defaults for the field cipher.
///
/// A column's cipher annotation may leave its key blank, in which case the
/// `default_key` configured here is used. `key_size` is the key size in bits
/// (128 or 256) applied when no annotation says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherSettings {
    /// Passphrase used when an annotation does not carry its own key.
    pub default_key: String,
    /// Default key size in bits.
    pub key_size: u16,
}

impl Default for CipherSettings {
    fn default() -> Self {
        Self {
            default_key: String::new(),
            key_size: 128,
        }
    }
}

/// The complete set of sqlweave settings.
///
/// # Examples
///
/// ```
/// use sqlweave_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.default_dialect, "mssql");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty log output).
    pub debug: bool,
    /// The log filter (e.g. "info", "sqlweave_db=debug").
    pub log_level: String,
    /// The dialect used when a query does not name one
    /// ("mssql", "postgresql" or "sqlite").
    pub default_dialect: String,
    /// Field cipher defaults.
    pub cipher: CipherSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            default_dialect: "mssql".to_string(),
            cipher: CipherSettings::default(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup to set the
/// settings, then use [`get`](LazySettings::get) to access them.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    /// Returns the configured settings, or `None` before `configure`.
    pub fn try_get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
