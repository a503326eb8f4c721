//! Loading and merging of configuration sources.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{ConfigError, Result};

/// Load a config strictly from one TOML file.
///
/// Read and parse failures propagate with the path attached.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    toml::Value::Table(read_table(path)?)
        .try_into()
        .map_err(ConfigError::Invalid)
}

/// Resolve a config from a TOML file and/or the environment.
///
/// The file (when given) is parsed first; then every environment variable
/// named `PREFIX_KEY` or `PREFIX_SECTION__KEY` overrides the matching entry,
/// with `__` separating nesting levels and names lowercased. Values are
/// coerced to bool, integer or float when they parse as one, else kept as
/// strings. With no file, the environment alone populates the schema.
pub fn load<T: DeserializeOwned>(path: Option<&Path>, env_prefix: &str) -> Result<T> {
    let mut table = match path {
        Some(path) => read_table(path)?,
        None => toml::Table::new(),
    };
    apply_env_overrides(&mut table, env_prefix);
    toml::Value::Table(table)
        .try_into()
        .map_err(ConfigError::Invalid)
}

/// Load from a TOML file, falling back to defaults on any failure.
///
/// A missing file is expected and only logged at debug level; a present but
/// unreadable or unparseable file logs a warning.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        tracing::debug!("config file {} not found, using defaults", path.display());
        return T::default();
    }
    match load_file(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("failed to load config: {}, using defaults", err);
            T::default()
        }
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env_overrides(table: &mut toml::Table, prefix: &str) {
    if prefix.is_empty() {
        return;
    }
    let marker = format!("{prefix}_");
    for (key, value) in std::env::vars() {
        let Some(rest) = key.strip_prefix(&marker) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let segments: Vec<String> = rest.split("__").map(|s| s.to_lowercase()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            continue;
        }
        insert_path(table, &segments, coerce(&value));
    }
}

/// Walk (creating) nested tables for all but the last segment, then set it.
fn insert_path(table: &mut toml::Table, segments: &[String], value: toml::Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        table.insert(first.clone(), value);
        return;
    }
    let child = table
        .entry(first.clone())
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    if !child.is_table() {
        *child = toml::Value::Table(toml::Table::new());
    }
    if let toml::Value::Table(inner) = child {
        insert_path(inner, rest, value);
    }
}

fn coerce(raw: &str) -> toml::Value {
    if let Ok(flag) = raw.parse::<bool>() {
        return toml::Value::Boolean(flag);
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return toml::Value::Integer(integer);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return toml::Value::Float(float);
    }
    toml::Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Default, PartialEq, serde::Deserialize)]
    #[serde(default)]
    struct ServiceConfig {
        listen_port: u16,
        log_path: String,
        server: ServerSection,
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    #[serde(default)]
    struct ServerSection {
        workers: i64,
        request_timeout_secs: f64,
        verbose: bool,
    }

    impl Default for ServerSection {
        fn default() -> Self {
            ServerSection {
                workers: 4,
                request_timeout_secs: 30.0,
                verbose: false,
            }
        }
    }

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    // ==================== File Loading Tests ====================

    #[test]
    fn test_load_file_full_config() {
        let (_dir, path) = write_config(
            r#"
            listen_port = 8080
            log_path = "/var/log/svc.log"

            [server]
            workers = 16
            verbose = true
        "#,
        );
        let config: ServiceConfig = load_file(&path).unwrap();
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.log_path, "/var/log/svc.log");
        assert_eq!(config.server.workers, 16);
        assert!(config.server.verbose);
        // Defaults for unspecified
        assert_eq!(config.server.request_timeout_secs, 30.0);
    }

    #[test]
    fn test_load_file_empty_config_uses_defaults() {
        let (_dir, path) = write_config("");
        let config: ServiceConfig = load_file(&path).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_load_file_missing_is_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_file::<ServiceConfig>(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_file_bad_syntax_is_parse_error() {
        let (_dir, path) = write_config("listen_port = [broken");
        let err = load_file::<ServiceConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    // ==================== Environment Override Tests ====================

    #[test]
    fn test_env_overrides_file_values() {
        let (_dir, path) = write_config("listen_port = 8080");
        std::env::set_var("GIRDER_OVERRIDE_LISTEN_PORT", "9090");

        let config: ServiceConfig = load(Some(&path), "GIRDER_OVERRIDE").unwrap();
        assert_eq!(config.listen_port, 9090);

        std::env::remove_var("GIRDER_OVERRIDE_LISTEN_PORT");
    }

    #[test]
    fn test_env_reaches_nested_sections() {
        std::env::set_var("GIRDER_NESTED_SERVER__WORKERS", "32");
        std::env::set_var("GIRDER_NESTED_SERVER__VERBOSE", "true");

        let config: ServiceConfig = load(None, "GIRDER_NESTED").unwrap();
        assert_eq!(config.server.workers, 32);
        assert!(config.server.verbose);

        std::env::remove_var("GIRDER_NESTED_SERVER__WORKERS");
        std::env::remove_var("GIRDER_NESTED_SERVER__VERBOSE");
    }

    #[test]
    fn test_env_values_are_coerced() {
        std::env::set_var("GIRDER_COERCE_SERVER__REQUEST_TIMEOUT_SECS", "1.5");
        std::env::set_var("GIRDER_COERCE_LOG_PATH", "/tmp/svc.log");

        let config: ServiceConfig = load(None, "GIRDER_COERCE").unwrap();
        assert_eq!(config.server.request_timeout_secs, 1.5);
        assert_eq!(config.log_path, "/tmp/svc.log");

        std::env::remove_var("GIRDER_COERCE_SERVER__REQUEST_TIMEOUT_SECS");
        std::env::remove_var("GIRDER_COERCE_LOG_PATH");
    }

    #[test]
    fn test_load_without_file_or_env_is_all_defaults() {
        let config: ServiceConfig = load(None, "GIRDER_UNSET_PREFIX").unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_unrelated_env_vars_are_ignored() {
        std::env::set_var("GIRDER_OTHER_LISTEN_PORT", "7070");
        let config: ServiceConfig = load(None, "GIRDER_IGNORED").unwrap();
        assert_eq!(config.listen_port, 0);
        std::env::remove_var("GIRDER_OTHER_LISTEN_PORT");
    }

    // ==================== Fallback Tests ====================

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config: ServiceConfig = load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_load_or_default_on_unparseable_file() {
        let (_dir, path) = write_config("listen_port = [broken");
        let config: ServiceConfig = load_or_default(&path);
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_load_or_default_on_good_file() {
        let (_dir, path) = write_config("listen_port = 4000");
        let config: ServiceConfig = load_or_default(&path);
        assert_eq!(config.listen_port, 4000);
    }
}
