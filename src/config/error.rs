//! Configuration Error Types
//!
//! Specific, actionable error messages for configuration loading and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Invalid TOML syntax or shape in a configuration source
    #[error("Failed to parse configuration from '{source_name}': {error}")]
    ParseError { source_name: String, error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Environment-specific configuration issues
    #[error("Environment configuration error for '{environment}': {error}")]
    EnvironmentConfigError { environment: String, error: String },

    /// Configuration validation errors
    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn parse_error<S: Into<String>, E: std::fmt::Display>(source_name: S, error: E) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn environment_error<E: Into<String>, R: std::fmt::Display>(
        environment: E,
        error: R,
    ) -> Self {
        Self::EnvironmentConfigError {
            environment: environment.into(),
            error: error.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation_error<E: Into<String>>(error: E) -> Self {
        Self::ValidationError {
            error: error.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        match error {
            config::ConfigError::NotFound(path) => Self::ConfigFileNotFound {
                searched_paths: vec![PathBuf::from(path)],
            },
            other => Self::ParseError {
                source_name: "configuration sources".to_string(),
                error: other.to_string(),
            },
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;
