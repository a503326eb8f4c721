//! The structured logger.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::{LoggerError, Result};
use crate::level::{Level, LOG_FORMAT_VERSION};
use crate::sink::{self, Sink, SinkState};

/// Extra fields merged into a record on top of the reserved ones.
///
/// Mappings are applied in call order: later keys overwrite earlier ones and
/// may overwrite any reserved field they match.
pub type Fields = BTreeMap<String, String>;

/// A handle to one configured log stream.
///
/// The handle owns exactly one sink for its lifetime and is safe to share
/// across threads; a single lock serializes every write, so records from
/// concurrent callers appear whole, in lock-acquisition order.
#[derive(Debug)]
pub struct Logger {
    name: String,
    hostname: String,
    pid: u32,
    threshold: AtomicU8,
    sink: Mutex<Sink>,
}

impl Logger {
    /// Create a logger writing to the console, or to `path` when given.
    ///
    /// A file path has missing parent directories created and the file
    /// opened for append; either failing is a construction error.
    pub fn new(name: &str, path: Option<&str>) -> Result<Logger> {
        let sink = sink::resolve(path, None)?;
        Ok(Logger::from_sink(name, sink))
    }

    /// Create a logger whose writes pass through a fixed-capacity buffer.
    ///
    /// Buffered output only reaches the destination on [`Logger::close`].
    pub fn with_buffer(name: &str, buffer_size: usize, path: Option<&str>) -> Result<Logger> {
        let sink = sink::resolve(path, Some(buffer_size))?;
        Ok(Logger::from_sink(name, sink))
    }

    fn from_sink(name: &str, sink: Sink) -> Logger {
        Logger {
            name: name.trim().to_string(),
            hostname: hostname(),
            pid: std::process::id(),
            threshold: AtomicU8::new(Level::Trace.value()),
            sink: Mutex::new(sink),
        }
    }

    /// Set the minimum severity; records below it are suppressed.
    ///
    /// Accepts the lowercase names `"fatal"`, `"error"`, `"warn"`, `"info"`
    /// and `"debug"`. Any other name silently resets the threshold to
    /// trace, so every record passes.
    pub fn set_severity(&self, level: &str) {
        let threshold = Level::from_name(level).unwrap_or(Level::Trace);
        self.threshold.store(threshold.value(), Ordering::Relaxed);
    }

    /// Write a record at trace level.
    pub fn trace(&self, msg: &str, extras: &[Fields]) -> Result<()> {
        self.guarded(Level::Trace, msg, extras)
    }

    /// Write a record at debug level.
    pub fn debug(&self, msg: &str, extras: &[Fields]) -> Result<()> {
        self.guarded(Level::Debug, msg, extras)
    }

    /// Write a record at info level.
    pub fn info(&self, msg: &str, extras: &[Fields]) -> Result<()> {
        self.guarded(Level::Info, msg, extras)
    }

    /// Write a record at warn level.
    pub fn warn(&self, msg: &str, extras: &[Fields]) -> Result<()> {
        self.guarded(Level::Warn, msg, extras)
    }

    /// Write a record at error level.
    pub fn error(&self, msg: &str, extras: &[Fields]) -> Result<()> {
        self.guarded(Level::Error, msg, extras)
    }

    /// Write a record at fatal level.
    ///
    /// Fatal here is a severity tag only; the process is never terminated.
    pub fn fatal(&self, msg: &str, extras: &[Fields]) -> Result<()> {
        self.guarded(Level::Fatal, msg, extras)
    }

    fn guarded(&self, level: Level, msg: &str, extras: &[Fields]) -> Result<()> {
        if level.value() >= self.threshold.load(Ordering::Relaxed) {
            return self.log(msg, level, extras);
        }
        Ok(())
    }

    /// Serialize one record and write it to the sink, bypassing the
    /// severity threshold.
    ///
    /// On a sink write failure the logger permanently redirects itself to
    /// the console, emits an error record describing the failure there, and
    /// returns the original error. On a serialization failure the raw error
    /// text is written to the sink as plain text, so some trace of the
    /// record always lands.
    pub fn log(&self, msg: &str, level: Level, extras: &[Fields]) -> Result<()> {
        let record = self.build_record(msg, level, extras);

        let mut sink = self.sink.lock();
        if sink.is_closed() {
            return Err(LoggerError::Closed);
        }

        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(err) => {
                let text = format!("failed to serialize log record: {err}");
                let _ = sink.write(text.as_bytes());
                return Err(LoggerError::Serialize(err));
            }
        };
        line.push(b'\n');

        if let Err(err) = sink.write(&line) {
            sink.degrade();
            // The lock is already held, so the failure record goes through
            // the sink directly rather than back through the public API.
            let notice = self.build_record(
                &format!("log write failed, redirecting to console: {err}"),
                Level::Error,
                &[],
            );
            if let Ok(mut notice_line) = serde_json::to_vec(&notice) {
                notice_line.push(b'\n');
                let _ = sink.write(&notice_line);
            }
            return Err(LoggerError::SinkWrite(err));
        }
        Ok(())
    }

    /// Flush and close the sink.
    ///
    /// Returns the flush result and the close result separately; either may
    /// fail while the other succeeds, and neither masks the other. The
    /// console is never closed. Afterwards every write returns
    /// [`LoggerError::Closed`].
    pub fn close(&self) -> (Result<()>, Result<()>) {
        let mut sink = self.sink.lock();
        sink.close()
    }

    /// Process name attached to every record, trimmed at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hostname resolved once at construction; empty if resolution failed.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Process id resolved once at construction.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current severity threshold.
    pub fn severity(&self) -> Level {
        Level::from_value(self.threshold.load(Ordering::Relaxed))
    }

    /// Current sink selection; degrades permanently after a write failure.
    pub fn sink_state(&self) -> SinkState {
        self.sink.lock().state()
    }

    fn build_record(&self, msg: &str, level: Level, extras: &[Fields]) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("hostname".into(), Value::from(self.hostname.as_str()));
        record.insert("level".into(), Value::from(level.value()));
        record.insert("msg".into(), Value::from(msg));
        record.insert("name".into(), Value::from(self.name.as_str()));
        record.insert("pid".into(), Value::from(self.pid));
        record.insert("time".into(), Value::from(timestamp()));
        record.insert("v".into(), Value::from(LOG_FORMAT_VERSION));
        for fields in extras {
            for (key, value) in fields {
                record.insert(key.clone(), Value::from(value.as_str()));
            }
        }
        record
    }
}

/// Resolve the machine hostname.
///
/// Failure is tolerated: the record's `hostname` field is left empty rather
/// than construction failing.
fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for writes of the length passed alongside it
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return String::new();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Render the record timestamp.
///
/// The local clock at millisecond precision, with the separating space
/// swapped for `T` and a literal `Z` appended. No timezone conversion is
/// performed; existing consumers of the stream expect exactly this shape.
fn timestamp() -> String {
    let local = chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string();
    format!("{}Z", local.replacen(' ', "T", 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    fn read_records(path: &std::path::Path) -> Vec<Map<String, Value>> {
        let content = fs::read_to_string(path).unwrap();
        content
            .lines()
            .map(|line| match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(record)) => record,
                other => panic!("expected a JSON object per line, got {:?}", other),
            })
            .collect()
    }

    // ==================== Construction Tests ====================

    #[test]
    fn test_console_logger_identity() {
        let logger = Logger::new("svc", None).unwrap();
        assert_eq!(logger.name(), "svc");
        assert_eq!(logger.pid(), std::process::id());
        assert_eq!(logger.severity(), Level::Trace);
        assert_eq!(logger.sink_state(), SinkState::Primary);
    }

    #[test]
    fn test_name_is_trimmed() {
        let logger = Logger::new("  svc  ", None).unwrap();
        assert_eq!(logger.name(), "svc");
    }

    #[test]
    fn test_construction_error_propagates() {
        let dir = tempfile::TempDir::new().unwrap();
        // A directory path cannot be opened as the log file
        let err = Logger::new("svc", Some(dir.path().to_str().unwrap())).unwrap_err();
        assert!(matches!(err, LoggerError::OpenFile { .. }));
    }

    #[test]
    fn test_hostname_resolves_without_nul_bytes() {
        let logger = Logger::new("svc", None).unwrap();
        assert!(!logger.hostname().contains('\0'));
    }

    // ==================== Record Format Tests ====================

    #[test]
    fn test_record_has_all_reserved_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        logger.info("started", &[]).unwrap();

        let records = read_records(&path);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        for field in ["hostname", "level", "msg", "name", "pid", "time", "v"] {
            assert!(record.contains_key(field), "missing reserved field {field}");
        }
        assert_eq!(record["level"], Value::from(30));
        assert_eq!(record["msg"], Value::from("started"));
        assert_eq!(record["name"], Value::from("svc"));
        assert_eq!(record["pid"], Value::from(std::process::id()));
        assert_eq!(record["v"], Value::from(0));
    }

    #[test]
    fn test_trace_on_default_threshold() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        logger.trace("hello", &[]).unwrap();

        let records = read_records(&path);
        assert_eq!(records[0]["level"], Value::from(10));
        assert_eq!(records[0]["msg"], Value::from("hello"));
        assert_eq!(records[0]["name"], Value::from("svc"));
    }

    #[test]
    fn test_time_field_shape() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        logger.info("x", &[]).unwrap();

        let records = read_records(&path);
        let time = records[0]["time"].as_str().unwrap();
        assert_eq!(time.len(), 24);
        assert!(time.ends_with('Z'));
        assert_eq!(&time[10..11], "T");
        // Millisecond precision, parseable without the suffix
        chrono::NaiveDateTime::parse_from_str(&time[..23], "%Y-%m-%dT%H:%M:%S%.3f").unwrap();
    }

    #[test]
    fn test_each_level_writes_its_value() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        logger.trace("t", &[]).unwrap();
        logger.debug("d", &[]).unwrap();
        logger.info("i", &[]).unwrap();
        logger.warn("w", &[]).unwrap();
        logger.error("e", &[]).unwrap();
        logger.fatal("f", &[]).unwrap();

        let levels: Vec<u64> = read_records(&path)
            .iter()
            .map(|r| r["level"].as_u64().unwrap())
            .collect();
        assert_eq!(levels, vec![10, 20, 30, 40, 50, 60]);
    }

    // ==================== Extra Field Tests ====================

    #[test]
    fn test_extras_are_merged() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        let extra = Fields::from([("request_id".to_string(), "abc-123".to_string())]);
        logger.info("handled", &[extra]).unwrap();

        let records = read_records(&path);
        assert_eq!(records[0]["request_id"], Value::from("abc-123"));
    }

    #[test]
    fn test_later_extras_override_earlier() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        let first = Fields::from([("shard".to_string(), "1".to_string())]);
        let second = Fields::from([("shard".to_string(), "2".to_string())]);
        logger.info("x", &[first, second]).unwrap();

        let records = read_records(&path);
        assert_eq!(records[0]["shard"], Value::from("2"));
    }

    #[test]
    fn test_extras_override_reserved_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        let extra = Fields::from([
            ("msg".to_string(), "overridden".to_string()),
            ("hostname".to_string(), "elsewhere".to_string()),
        ]);
        logger.info("original", &[extra]).unwrap();

        let records = read_records(&path);
        assert_eq!(records[0]["msg"], Value::from("overridden"));
        assert_eq!(records[0]["hostname"], Value::from("elsewhere"));
    }

    // ==================== Severity Threshold Tests ====================

    #[test]
    fn test_suppressed_record_is_silent_no_op() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        logger.set_severity("warn");

        logger.info("x", &[]).unwrap();
        assert!(fs::read_to_string(&path).unwrap().is_empty());

        logger.warn("y", &[]).unwrap();
        assert_eq!(read_records(&path).len(), 1);
    }

    #[test]
    fn test_threshold_gates_exactly_at_or_above() {
        for threshold in Level::all() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("svc.log");
            let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
            logger.set_severity(threshold.name());

            for level in Level::all() {
                logger.log_at(level, "x").unwrap();
            }
            let expected = Level::all()
                .iter()
                .filter(|l| l.value() >= threshold.value())
                .count();
            assert_eq!(
                read_records(&path).len(),
                expected,
                "threshold {}",
                threshold.name()
            );
        }
    }

    #[test]
    fn test_unknown_severity_resets_to_trace() {
        let logger = Logger::new("svc", None).unwrap();
        logger.set_severity("fatal");
        assert_eq!(logger.severity(), Level::Fatal);
        logger.set_severity("loud");
        assert_eq!(logger.severity(), Level::Trace);
    }

    #[test]
    fn test_log_bypasses_threshold() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        logger.set_severity("fatal");
        logger.log("forced", Level::Trace, &[]).unwrap();
        assert_eq!(read_records(&path).len(), 1);
    }

    // ==================== Buffered Logger Tests ====================

    #[test]
    fn test_buffered_writes_land_on_close() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::with_buffer("svc", 64 * 1024, Some(path.to_str().unwrap())).unwrap();
        logger.info("buffered", &[]).unwrap();
        assert!(fs::read_to_string(&path).unwrap().is_empty());

        let (flushed, closed) = logger.close();
        flushed.unwrap();
        closed.unwrap();
        assert_eq!(read_records(&path).len(), 1);
    }

    #[test]
    fn test_write_after_close_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Logger::new("svc", Some(path.to_str().unwrap())).unwrap();
        let (flushed, closed) = logger.close();
        flushed.unwrap();
        closed.unwrap();

        let err = logger.info("too late", &[]).unwrap_err();
        assert!(matches!(err, LoggerError::Closed));
    }

    // ==================== Degraded Mode Tests ====================

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_degrades_to_console() {
        // /dev/full accepts the open but rejects every write
        let logger = Logger::new("svc", Some("/dev/full")).unwrap();
        let err = logger.info("doomed", &[]).unwrap_err();
        assert!(matches!(err, LoggerError::SinkWrite(_)));
        assert_eq!(logger.sink_state(), SinkState::DegradedToConsole);

        // Later writes land on the console and succeed
        logger.info("recovered", &[]).unwrap();
        assert_eq!(logger.sink_state(), SinkState::DegradedToConsole);
    }

    // ==================== Concurrency Tests ====================

    #[test]
    fn test_concurrent_writers_never_interleave() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let logger = Arc::new(Logger::new("svc", Some(path.to_str().unwrap())).unwrap());

        let mut handles = Vec::new();
        for worker in 0..8 {
            let logger = Arc::clone(&logger);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    let extra = Fields::from([
                        ("worker".to_string(), worker.to_string()),
                        ("seq".to_string(), i.to_string()),
                    ]);
                    logger.info("tick", &[extra]).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every line parses whole; no record is a byte-level merge of two
        let records = read_records(&path);
        assert_eq!(records.len(), 8 * 25);
        for record in &records {
            assert_eq!(record["msg"], Value::from("tick"));
            assert!(record.contains_key("worker"));
        }
    }

    impl Logger {
        fn log_at(&self, level: Level, msg: &str) -> Result<()> {
            match level {
                Level::Trace => self.trace(msg, &[]),
                Level::Debug => self.debug(msg, &[]),
                Level::Info => self.info(msg, &[]),
                Level::Warn => self.warn(msg, &[]),
                Level::Error => self.error(msg, &[]),
                Level::Fatal => self.fatal(msg, &[]),
            }
        }
    }
}
