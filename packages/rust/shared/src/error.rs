//! Error types for markbatch.
//!
//! Library crates use [`MarkbatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all markbatch operations.
#[derive(Debug, thiserror::Error)]
pub enum MarkbatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A location string that cannot be parsed or mapped to an output path.
    #[error("invalid path: {message}")]
    InvalidPath { message: String },

    /// Compressed payload is corrupt or truncated.
    #[error("decompress error: {0}")]
    Decompress(String),

    /// Content filtering failed (undecodable bytes, strict-mode parse errors).
    #[error("cleaning error: {0}")]
    Cleaning(String),

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The eligible-record query failed. Fatal to a batch.
    #[error("query error: {0}")]
    Query(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MarkbatchError>;

impl MarkbatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-path error from any displayable message.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
