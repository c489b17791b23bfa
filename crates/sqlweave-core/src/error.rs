//! Core error types for the sqlweave crates.
//!
//! This module provides the [`WeaveError`] enum shared by the predicate
//! compiler, the metadata layer, the field cipher and the settings loader.
//! Every compilation is all-or-nothing: an error aborts the predicate that
//! raised it and no partial SQL is handed back.

use thiserror::Error;

/// The primary error type for sqlweave.
///
/// Variants carry a human-readable message naming the offending construct,
/// entity, column or setting.
#[derive(Error, Debug)]
pub enum WeaveError {
    // ── Translation ──────────────────────────────────────────────────

    /// An operator, method, member shape or modifier the compiler does not
    /// know how to translate.
    #[error("Unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// A captured value referenced by the predicate was not present in the
    /// value table handed to the compiler.
    #[error("Unbound value: {0}")]
    UnboundValue(String),

    /// A placeholder token survived the final resolution pass.
    #[error("Unresolved token: {0}")]
    UnresolvedToken(String),

    // ── Metadata ─────────────────────────────────────────────────────

    /// Entity metadata is missing something the compiler needs (primary
    /// key, foreign-key relation, column, navigation).
    #[error("Metadata error: {0}")]
    MetadataError(String),

    // ── Cipher ───────────────────────────────────────────────────────

    /// Encryption or decryption failed (truncated or corrupt ciphertext,
    /// bad padding, invalid key material).
    #[error("Cipher error: {0}")]
    CipherError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl WeaveError {
    /// Returns `true` for errors raised while translating a predicate tree.
    pub const fn is_translation_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedConstruct(_)
                | Self::UnboundValue(_)
                | Self::UnresolvedToken(_)
                | Self::MetadataError(_)
        )
    }
}

/// A convenience type alias for `Result<T, WeaveError>`.
pub type WeaveResult<T> = Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weave_error_display() {
        let err = WeaveError::UnsupportedConstruct("method 'Trim'".into());
        assert_eq!(err.to_string(), "Unsupported construct: method 'Trim'");
    }

    #[test]
    fn test_translation_error_classification() {
        assert!(WeaveError::UnsupportedConstruct("x".into()).is_translation_error());
        assert!(WeaveError::UnboundValue("x".into()).is_translation_error());
        assert!(WeaveError::MetadataError("x".into()).is_translation_error());
        assert!(WeaveError::UnresolvedToken("x".into()).is_translation_error());
        assert!(!WeaveError::CipherError("x".into()).is_translation_error());
        assert!(!WeaveError::ConfigurationError("x".into()).is_translation_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: WeaveError = io_err.into();
        assert!(!err.is_translation_error());
        assert!(err.to_string().contains("file missing"));
    }
}
