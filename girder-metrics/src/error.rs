//! Error types for girder-metrics.

use std::io;

/// Errors surfaced by metric registration and the exposition endpoint.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    // === Registration ===

    #[error("metric requires both name and help to register")]
    MissingNameOrHelp,

    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),

    #[error("wrong number of label values: expected {expected}, got {got}")]
    LabelArity { expected: usize, got: usize },

    // === Exposition ===

    #[error("failed to bind metrics endpoint: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to accept metrics connection: {0}")]
    Accept(#[source] io::Error),
}

/// Result type alias using MetricsError
pub type Result<T> = std::result::Result<T, MetricsError>;
