//! Sink resolution and the write-side state machine.
//!
//! A sink is chosen once at construction: the console, or an append-mode
//! file with any missing parent directories created first. After a write
//! failure the sink selection flips, permanently, to the console.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::PathBuf;

use crate::error::{LoggerError, Result};

/// Which destination the next write lands on.
///
/// The transition is one-way: once a write to the primary sink fails, every
/// later record goes to the console for the rest of the handle's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Primary,
    DegradedToConsole,
}

/// The configured destination, resolved once at construction.
#[derive(Debug)]
enum Dest {
    Console,
    BufferedConsole(BufWriter<io::Stdout>),
    File(File),
    BufferedFile(BufWriter<File>),
}

/// The logger's exclusively-owned write destination.
///
/// Callers reach this only through the logger's write lock.
#[derive(Debug)]
pub(crate) struct Sink {
    dest: Dest,
    state: SinkState,
    closed: bool,
}

/// Resolve a sink from an optional destination path.
///
/// `None` selects the console. Otherwise `\` separators are normalized to
/// `/`, missing parent directories are created (mode 0o777), and the file is
/// opened for append, created with mode 0o666 if absent. `buffer_size`
/// wraps the destination in a fixed-capacity buffer flushed on close.
pub(crate) fn resolve(path: Option<&str>, buffer_size: Option<usize>) -> Result<Sink> {
    let dest = match path {
        None => match buffer_size {
            Some(capacity) => {
                Dest::BufferedConsole(BufWriter::with_capacity(capacity, io::stdout()))
            }
            None => Dest::Console,
        },
        Some(raw) => {
            let file = open_log_file(raw)?;
            match buffer_size {
                Some(capacity) => Dest::BufferedFile(BufWriter::with_capacity(capacity, file)),
                None => Dest::File(file),
            }
        }
    };
    Ok(Sink {
        dest,
        state: SinkState::Primary,
        closed: false,
    })
}

fn open_log_file(raw: &str) -> Result<File> {
    let normalized = raw.trim().replace('\\', "/");
    let path = PathBuf::from(&normalized);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o777)
                .create(parent)
                .map_err(|source| LoggerError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o666)
        .open(&path)
        .map_err(|source| LoggerError::OpenFile { path, source })
}

impl Sink {
    /// Write raw bytes to whichever destination the current state selects.
    pub(crate) fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.state {
            SinkState::DegradedToConsole => io::stdout().write_all(bytes),
            SinkState::Primary => match &mut self.dest {
                Dest::Console => io::stdout().write_all(bytes),
                Dest::BufferedConsole(writer) => writer.write_all(bytes),
                Dest::File(file) => file.write_all(bytes),
                Dest::BufferedFile(writer) => writer.write_all(bytes),
            },
        }
    }

    /// Redirect all future writes to the console.
    pub(crate) fn degrade(&mut self) {
        self.state = SinkState::DegradedToConsole;
    }

    pub(crate) fn state(&self) -> SinkState {
        self.state
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flush any buffer, then surface close-time errors from the file.
    ///
    /// The two results are independent: a flush failure does not suppress
    /// the close result and vice versa. The original file is retained even
    /// in the degraded state, so buffered bytes still flush into it here.
    pub(crate) fn close(&mut self) -> (Result<()>, Result<()>) {
        let flushed = match &mut self.dest {
            Dest::BufferedConsole(writer) => writer.flush().map_err(LoggerError::Flush),
            Dest::BufferedFile(writer) => writer.flush().map_err(LoggerError::Flush),
            Dest::Console | Dest::File(_) => Ok(()),
        };
        // sync_all reports errors a plain drop would swallow
        let closed = match &self.dest {
            Dest::File(file) => file.sync_all().map_err(LoggerError::Close),
            Dest::BufferedFile(writer) => writer.get_ref().sync_all().map_err(LoggerError::Close),
            Dest::Console | Dest::BufferedConsole(_) => Ok(()),
        };
        self.closed = true;
        (flushed, closed)
    }
}
