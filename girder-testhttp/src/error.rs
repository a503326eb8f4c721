//! Error types for girder-testhttp.

use std::io;

/// Errors surfaced while standing up the mock server.
#[derive(Debug, thiserror::Error)]
pub enum MockServerError {
    #[error("failed to bind mock server: {0}")]
    Bind(#[source] io::Error),
}

/// Result type alias using MockServerError
pub type Result<T> = std::result::Result<T, MockServerError>;
