//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading or validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration variable is missing
    #[error("Missing required configuration: {var}")]
    MissingRequired { var: String },

    /// A configuration variable has an invalid value
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    /// Failed to load .env file
    #[error("Failed to load .env file from {path}: {source}")]
    EnvFileLoad {
        path: PathBuf,
        #[source]
        source: dotenv::Error,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// Invalid database URL format
    #[error("Invalid database URL format: {0}")]
    InvalidDatabaseUrl(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_display() {
        let err = ConfigError::MissingRequired {
            var: "AGORA_DATABASE_URL".to_string(),
        };
        assert!(err.to_string().contains("AGORA_DATABASE_URL"));
        assert!(err.to_string().contains("Missing required"));
    }

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            var: "AGORA_ACK_WAIT_SECS".to_string(),
            value: "soon".to_string(),
        };
        assert!(err.to_string().contains("AGORA_ACK_WAIT_SECS"));
        assert!(err.to_string().contains("soon"));
    }
}
