//! Error types for girder-config.

use std::io;
use std::path::PathBuf;

/// Errors surfaced while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("configuration is invalid: {0}")]
    Invalid(#[from] toml::de::Error),
}

/// Result type alias using ConfigError
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Display Tests ====================

    #[test]
    fn test_display_read() {
        let err = ConfigError::Read {
            path: PathBuf::from("/etc/svc/config.toml"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("failed to read config file"));
        assert!(msg.contains("/etc/svc/config.toml"));
    }

    #[test]
    fn test_display_parse_keeps_path() {
        let source = toml::from_str::<toml::Table>("not toml at all [").unwrap_err();
        let err = ConfigError::Parse {
            path: PathBuf::from("/etc/svc/config.toml"),
            source,
        };
        assert!(err.to_string().contains("config.toml"));
    }
}
