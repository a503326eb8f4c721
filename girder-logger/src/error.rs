//! Error types for girder-logger.
//!
//! Every failure is returned as a value; the logger never panics or
//! terminates the process on its own.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by logger construction, record emission, and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    // === Construction ===

    #[error("failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open log file {path}: {source}")]
    OpenFile { path: PathBuf, source: io::Error },

    // === Emission ===

    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to log sink: {0}")]
    SinkWrite(#[source] io::Error),

    #[error("logger is closed")]
    Closed,

    // === Shutdown ===

    #[error("failed to flush log buffer: {0}")]
    Flush(#[source] io::Error),

    #[error("failed to close log file: {0}")]
    Close(#[source] io::Error),
}

/// Result type alias using LoggerError
pub type Result<T> = std::result::Result<T, LoggerError>;
