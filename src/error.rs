//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the acquisition engine.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different failure classes of the ingestion pipeline.
//!
//! ## Error Hierarchy
//!
//! - **`MalformedRecord`**: A raw record from the detector could not be decoded. The record
//!   is logged and skipped; the rest of the batch continues.
//! - **`SourceUnavailable`**: The detector link failed to deliver data. Transient: it is
//!   logged and the link is polled again on the next tick.
//! - **`LogWriteFailure`**: The event log could not be written or flushed. This is the only
//!   fatal class; the engine stops rather than silently losing events.
//! - **`InvalidConfiguration`**: A configuration value is out of bounds. At startup this
//!   aborts; at runtime the request is rejected and the previous value is kept.
//! - **`Config`** / **`Io`**: Wrapped errors from `figment` and `std::io`.
//!
//! An aggregator that cannot form any bin or window does not produce an error; it returns
//! an empty [`Histogram`](crate::histogram::Histogram).

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the acquisition engine.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A raw record did not decode into an event.
    #[error("Malformed record {record:?}: {reason}")]
    MalformedRecord {
        /// The offending record, newline-stripped.
        record: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Transient failure reading from the detector link.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The event log could not be written. Fatal.
    #[error("Event log write failed for '{}': {source}", path.display())]
    LogWriteFailure {
        /// Path of the event log file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration value is out of bounds.
    #[error("Configuration validation error: {0}")]
    InvalidConfiguration(String),

    /// The scheduler task is no longer running.
    #[error("Scheduler is not running")]
    SchedulerStopped,

    /// The scheduler task panicked or was cancelled.
    #[error("Scheduler task failed: {0}")]
    TaskFailed(String),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Generic I/O error (startup, link setup).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// Build a [`DaqError::MalformedRecord`].
    pub fn malformed(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error must stop the engine.
    ///
    /// Only durability failures on the event log escalate; per-record and per-tick
    /// failures are isolated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LogWriteFailure { .. })
    }
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        Self::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_log_write_failure_is_fatal() {
        let fatal = DaqError::LogWriteFailure {
            path: PathBuf::from("data/log.txt"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(fatal.is_fatal());
        assert!(fatal.to_string().contains("data/log.txt"));

        assert!(!DaqError::malformed("12 abc", "bad field").is_fatal());
        assert!(!DaqError::SourceUnavailable("unplugged".into()).is_fatal());
        assert!(!DaqError::InvalidConfiguration("gap_bins".into()).is_fatal());
    }

    #[test]
    fn malformed_message_includes_record() {
        let err = DaqError::malformed("12 abc", "expected 3 fields, found 2");
        let msg = err.to_string();
        assert!(msg.contains("\"12 abc\""));
        assert!(msg.contains("expected 3 fields"));
    }
}
