// Error types for gateway settings

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting the gateway cannot run without is blank.
    #[error("Required setting is missing: {0}")]
    MissingSetting(String),

    /// A setting is present but unusable.
    #[error("Invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Failed to load settings: {0}")]
    LoadError(String),

    #[error("Failed to parse settings file: {0}")]
    ParseError(String),

    #[error("Settings do not match the expected shape: {0}")]
    DeserializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
