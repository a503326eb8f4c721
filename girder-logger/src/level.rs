//! Severity levels for the bunyan line format.

/// Schema version emitted in every record's `v` field.
pub const LOG_FORMAT_VERSION: u64 = 0;

/// Severity of a log record.
///
/// Six fixed levels in ascending order. The numeric values are part of the
/// wire format; no custom levels exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Trace = 10,
    Debug = 20,
    Info = 30,
    Warn = 40,
    Error = 50,
    Fatal = 60,
}

impl Level {
    /// Numeric value written to the record's `level` field.
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Lowercase name, the form `set_severity` accepts.
    pub fn name(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// Parse a lowercase level name. Case-sensitive; unknown names are `None`.
    pub fn from_name(name: &str) -> Option<Level> {
        match name {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }

    /// Recover a level from its stored numeric value.
    pub(crate) fn from_value(value: u8) -> Level {
        match value {
            20 => Level::Debug,
            30 => Level::Info,
            40 => Level::Warn,
            50 => Level::Error,
            60 => Level::Fatal,
            _ => Level::Trace,
        }
    }

    /// All levels in ascending order.
    pub fn all() -> [Level; 6] {
        [
            Level::Trace,
            Level::Debug,
            Level::Info,
            Level::Warn,
            Level::Error,
            Level::Fatal,
        ]
    }
}
