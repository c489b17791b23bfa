//! # sqlweave-core
//!
//! Error types, settings, and logging setup shared by the sqlweave crates.
//! This crate has no framework dependencies and provides the foundation for
//! `sqlweave-db`.
//!
//! ## Modules
//!
//! - [`error`] - Error type and result alias
//! - [`settings`] - Settings and global configuration
//! - [`settings_loader`] - Loading settings from TOML/JSON and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{WeaveError, WeaveResult};
pub use settings::{CipherSettings, Settings, SETTINGS};
