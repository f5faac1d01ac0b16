//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension or format name is not TOML or JSON.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error, or a layered value that does not fit the schema.
    #[error("failed to parse configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A `.env` file exists but could not be loaded.
    #[error("failed to load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),

    /// Unknown field in configuration.
    #[error("unknown configuration field: {field} in section {section}")]
    UnknownField {
        /// The unknown field name.
        field: String,
        /// The section containing the field.
        section: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new unknown field error.
    pub fn unknown_field(field: impl Into<String>, section: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            section: section.into(),
        }
    }

    /// Create a new invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/path/to/conduit.toml");
        assert!(err.to_string().contains("/path/to/conduit.toml"));
    }

    #[test]
    fn test_unknown_field_error() {
        let err = ConfigError::unknown_field("prefetch_count", "broker");
        assert!(err.to_string().contains("prefetch_count"));
        assert!(err.to_string().contains("broker"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("retry.multiplier", "must be at least 1.0");
        assert!(err.to_string().contains("retry.multiplier"));
        assert!(err.to_string().contains("must be at least 1.0"));
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("CONDUIT__BROKER__PREFETCH", "expected integer");
        assert!(err.to_string().contains("CONDUIT__BROKER__PREFETCH"));
        assert!(err.to_string().contains("expected integer"));
    }
}
