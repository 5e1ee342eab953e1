//! Error types for the RWX loader
//!
//! Malformed scene text is never an error; those problems are recovered and
//! counted in [`crate::Diagnostics`]. Only conditions that leave nothing to
//! interpret surface here.

use thiserror::Error;

/// Loader errors
#[derive(Debug, Error)]
pub enum RwxError {
    /// Input had nothing but whitespace
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Input is not valid UTF-8
    #[error("Invalid UTF-8 in {path}: {source}")]
    InvalidUtf8 {
        path: String,
        #[source]
        source: std::str::Utf8Error,
    },

    /// Reading a file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be parsed
    #[error("Invalid loader configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, RwxError>;
