//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// `--config` named a file that does not exist.
    #[error("configuration file '{}' does not exist", path.display())]
    MissingFile { path: PathBuf },

    /// A section the command needs has not been filled in.
    #[error("configuration section '{section}' is not configured: {hint}")]
    NotConfigured { section: String, hint: String },

    /// A configuration field has an invalid value.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
