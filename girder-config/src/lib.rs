//! girder-config: configuration loading from file and environment
//!
//! Schemas are plain `serde` structs (typically `#[serde(default)]` so a
//! partial file works). A config resolves from a TOML file, from environment
//! variables, or from both, with the environment taking precedence.

mod error;
mod loader;

pub use error::{ConfigError, Result};
pub use loader::{load, load_file, load_or_default};
