//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid configuration JSON
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration version is not supported by this version
    #[error("Unsupported configuration version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Values failed validation; every problem is listed
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
