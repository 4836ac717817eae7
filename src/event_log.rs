//! Append-only event log.
//!
//! Every decoded event is appended as one text line:
//!
//! ```text
//! <sequence_number> <unix_time_seconds> <peak_amplitude> <device_timestamp> <gap_since_previous>
//! ```
//!
//! The sequence number is the 1-based count of events appended by the writer instance.
//! Lines are buffered and pushed to stable storage by [`EventLogWriter::flush`], which
//! the scheduler calls at the end of every tick, so at most one tick of events can be
//! lost on abnormal termination. Any write or flush failure is fatal
//! ([`DaqError::LogWriteFailure`]).

use crate::error::{AppResult, DaqError};
use crate::event::Event;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Number of whitespace-separated fields in an event log line.
pub const LOG_FIELDS: usize = 5;

/// Byte sink behind an [`EventLogWriter`].
///
/// `sync` must push buffered data to stable storage.
pub trait LogSink: Write + Send {
    /// Flush and persist everything written so far.
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()
    }
}

impl LogSink for BufWriter<File> {
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()?;
        self.get_ref().sync_data()
    }
}

impl LogSink for Vec<u8> {}

/// Append-only writer for the event log. Owns the file handle.
pub struct EventLogWriter {
    path: PathBuf,
    sink: Option<Box<dyn LogSink>>,
    sequence: u64,
}

impl std::fmt::Debug for EventLogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogWriter")
            .field("path", &self.path)
            .field("open", &self.sink.is_some())
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl EventLogWriter {
    /// Create `output_dir` if needed and open a new dated log file inside it.
    ///
    /// The file is named `<prefix>_<YYYY-MM-DD_HH-MM-SS>.txt` after the local creation
    /// time. Fails fast if the directory cannot be created or the file opened.
    pub fn create_in(output_dir: &Path, prefix: &str) -> AppResult<Self> {
        std::fs::create_dir_all(output_dir).map_err(|source| DaqError::LogWriteFailure {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let file_name = format!(
            "{}_{}.txt",
            prefix,
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        Self::open(output_dir.join(file_name))
    }

    /// Open (or create) a log file at an explicit path in append mode.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| DaqError::LogWriteFailure {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "Event log opened");
        Ok(Self::with_sink(path, BufWriter::new(file)))
    }

    /// Build a writer over an arbitrary sink. `path` is only used in diagnostics.
    pub fn with_sink(path: impl Into<PathBuf>, sink: impl LogSink + 'static) -> Self {
        Self {
            path: path.into(),
            sink: Some(Box::new(sink)),
            sequence: 0,
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events appended by this writer.
    pub fn appended(&self) -> u64 {
        self.sequence
    }

    /// Whether the writer still holds its sink.
    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Append an event stamped with the current wall-clock time.
    pub fn append(&mut self, event: &Event) -> AppResult<u64> {
        let unix_seconds = chrono::Utc::now().timestamp().max(0) as u64;
        self.append_at(event, unix_seconds)
    }

    /// Append an event with an explicit unix timestamp. Returns its sequence number.
    pub fn append_at(&mut self, event: &Event, unix_seconds: u64) -> AppResult<u64> {
        let sequence = self.sequence + 1;
        let line = format_log_line(sequence, unix_seconds, event);
        let sink = self.sink.as_mut().ok_or_else(|| DaqError::LogWriteFailure {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "event log is closed"),
        })?;
        sink.write_all(line.as_bytes())
            .map_err(|source| DaqError::LogWriteFailure {
                path: self.path.clone(),
                source,
            })?;
        self.sequence = sequence;
        Ok(sequence)
    }

    /// Push buffered lines to stable storage.
    pub fn flush(&mut self) -> AppResult<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.sync().map_err(|source| DaqError::LogWriteFailure {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Flush and release the sink. Calling it again is a no-op.
    pub fn close(&mut self) -> AppResult<()> {
        if self.sink.is_none() {
            return Ok(());
        }
        self.flush()?;
        self.sink = None;
        tracing::info!(path = %self.path.display(), events = self.sequence, "Event log closed");
        Ok(())
    }
}

/// Format one log line, newline included.
pub fn format_log_line(sequence: u64, unix_seconds: u64, event: &Event) -> String {
    format!(
        "{} {} {} {} {}\n",
        sequence,
        unix_seconds,
        event.peak_amplitude,
        event.device_timestamp,
        event.gap_since_previous
    )
}

/// One parsed event log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    /// 1-based sequence number.
    pub sequence: u64,
    /// Wall-clock time the event was logged.
    pub unix_seconds: u64,
    /// The logged event.
    pub event: Event,
}

/// Parse one event log line.
pub fn parse_log_line(line: &str) -> AppResult<LogRecord> {
    let trimmed = line.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() != LOG_FIELDS {
        return Err(DaqError::malformed(
            trimmed,
            format!("expected {} log fields, found {}", LOG_FIELDS, fields.len()),
        ));
    }

    let mut values = [0u64; LOG_FIELDS];
    for (slot, field) in values.iter_mut().zip(&fields) {
        *slot = field
            .parse::<u64>()
            .map_err(|e| DaqError::malformed(trimmed, format!("field {:?}: {}", field, e)))?;
    }

    Ok(LogRecord {
        sequence: values[0],
        unix_seconds: values[1],
        event: Event::new(values[2], values[3], values[4]),
    })
}

/// Read every record of an event log file. Blank lines are skipped.
pub fn read_event_log(path: &Path) -> AppResult<Vec<LogRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_log_line(&line)?);
    }
    Ok(records)
}
