//! Error types for the log reader.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the log reader engine.
///
/// Malformed log text is never an error: the grammar degrades to coarser
/// fields instead. Failures while deleting entries or unlinking files are
/// absorbed into the returned counts.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The configured log directory does not exist or cannot be listed.
    #[error("Unable to retrieve files from path: {}", path.display())]
    UnableToRetrieveLogFiles { path: PathBuf },

    /// The filename pattern could not be compiled.
    #[error("invalid filename pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A log file could not be read.
    #[error("failed to read log file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The read-state cache backend failed.
    #[error("read-state cache error: {0}")]
    Cache(String),

    /// A configuration file could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;
