//! girder-logger: bunyan-format structured logging
//!
//! Emits one JSON object per line with the reserved fields `hostname`,
//! `level`, `msg`, `name`, `pid`, `time` and `v`, to the console or to an
//! append-mode file, under a single write lock so concurrent records never
//! interleave.

mod error;
mod level;
mod logger;
mod sink;

pub use error::{LoggerError, Result};
pub use level::{Level, LOG_FORMAT_VERSION};
pub use logger::{Fields, Logger};
pub use sink::SinkState;
