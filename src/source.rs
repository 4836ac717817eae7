//! Raw record sources.
//!
//! The scheduler never waits on the detector link. A [`RecordSource`] is polled: it
//! either hands over the next record already received, reports that nothing is
//! available right now, or reports that the link has ended.
//!
//! [`LineSource`] adapts any `AsyncRead` (serial stream, replay file, stdin, or a
//! `tokio::io::duplex` pipe in tests). A background task splits the byte stream on
//! `\n` and queues records in a bounded channel that `poll_record` drains with
//! `try_recv`.
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse_daq::source::{open_serial, LineSource, RecordSource, SourcePoll};
//!
//! let port = open_serial("/dev/ttyACM0", 9600)?;
//! let mut source = LineSource::spawn("detector", port, 1024);
//! while let SourcePoll::Record(line) = source.poll_record()? {
//!     println!("{line}");
//! }
//! ```

use crate::config::{SourceConfig, SourceKind};
use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

/// Result of one non-blocking poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll {
    /// A newline-stripped record.
    Record(String),
    /// Nothing available now; poll again later.
    Empty,
    /// The link has ended; no further records will arrive.
    Closed,
}

/// Abstract provider of newline-terminated text records.
#[async_trait]
pub trait RecordSource: Send {
    /// Take the next available record without waiting.
    ///
    /// A transient read failure is reported as [`DaqError::SourceUnavailable`]; the
    /// source can be polled again on a later tick. A record the source could not frame
    /// (longer than [`MAX_RECORD_BYTES`]) is reported as [`DaqError::MalformedRecord`]
    /// and the next poll continues with the following record.
    fn poll_record(&mut self) -> AppResult<SourcePoll>;

    /// Release the link. Further polls report [`SourcePoll::Closed`].
    async fn close(&mut self);

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;
}

/// Longest raw record accepted, newline excluded. Longer lines are reported as malformed.
pub const MAX_RECORD_BYTES: usize = 4096;

/// Pause before reading again after a transient link error.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Consecutive read errors after which the link is treated as gone.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 50;

/// Bytes of an oversized record kept for diagnostics.
const OVERSIZED_PREFIX_BYTES: usize = 64;

/// Line-splitting source over any async byte stream.
///
/// A read error is handed to the scheduler as [`DaqError::SourceUnavailable`] and the
/// reader keeps going after [`READ_RETRY_DELAY`]. The stream ends on EOF, on a
/// disconnect-class error, or after [`MAX_CONSECUTIVE_READ_ERRORS`] failures in a row.
pub struct LineSource {
    name: String,
    rx: mpsc::Receiver<AppResult<String>>,
    reader: Option<JoinHandle<()>>,
}

impl LineSource {
    /// Spawn the reader task for `reader`, buffering up to `capacity` records.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<R>(name: impl Into<String>, reader: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(read_records(name.clone(), reader, tx));
        Self {
            name,
            rx,
            reader: Some(task),
        }
    }
}

fn is_disconnect(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
    )
}

/// Accumulates one line, keeping at most [`MAX_RECORD_BYTES`] plus a trailing `\r`.
#[derive(Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    length: usize,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        let room = (MAX_RECORD_BYTES + 1).saturating_sub(self.bytes.len());
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
        self.length += chunk.len();
    }

    /// Finish the current line. `None` for a blank line.
    fn take(&mut self) -> Option<AppResult<String>> {
        let mut length = std::mem::take(&mut self.length);
        let mut bytes = std::mem::take(&mut self.bytes);
        if length == bytes.len() && bytes.last() == Some(&b'\r') {
            bytes.pop();
            length -= 1;
        }

        let record = String::from_utf8_lossy(&bytes);
        if length > MAX_RECORD_BYTES {
            let prefix: String = record.chars().take(OVERSIZED_PREFIX_BYTES).collect();
            return Some(Err(DaqError::malformed(
                prefix,
                format!("record of {} bytes exceeds {} bytes", length, MAX_RECORD_BYTES),
            )));
        }
        if record.trim().is_empty() {
            return None;
        }
        Some(Ok(record.into_owned()))
    }
}

async fn read_records<R>(name: String, reader: R, tx: mpsc::Sender<AppResult<String>>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = BufReader::new(reader);
    let mut line = LineBuffer::default();
    let mut failures = 0u32;
    loop {
        let (consumed, complete) = match reader.fill_buf().await {
            Ok([]) => {
                tracing::debug!(source = %name, "Source reached end of stream");
                if let Some(record) = line.take() {
                    let _ = tx.send(record).await;
                }
                break;
            }
            Ok(available) => {
                failures = 0;
                match available.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        line.extend(&available[..pos]);
                        (pos + 1, true)
                    }
                    None => {
                        line.extend(available);
                        (available.len(), false)
                    }
                }
            }
            Err(e) => {
                failures += 1;
                let give_up = is_disconnect(&e) || failures >= MAX_CONSECUTIVE_READ_ERRORS;
                let error = DaqError::SourceUnavailable(format!("{}: {}", name, e));
                if tx.send(Err(error)).await.is_err() || give_up {
                    tracing::debug!(source = %name, failures, "Source reader stopped after read errors");
                    break;
                }
                tokio::time::sleep(READ_RETRY_DELAY).await;
                continue;
            }
        };
        reader.consume(consumed);

        if complete {
            if let Some(record) = line.take() {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl RecordSource for LineSource {
    fn poll_record(&mut self) -> AppResult<SourcePoll> {
        match self.rx.try_recv() {
            Ok(Ok(record)) => Ok(SourcePoll::Record(record)),
            Ok(Err(e)) => Err(e),
            Err(TryRecvError::Empty) => Ok(SourcePoll::Empty),
            Err(TryRecvError::Disconnected) => Ok(SourcePoll::Closed),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
        if let Some(task) = self.reader.take() {
            // A serial read may never return on its own.
            task.abort();
            let _ = task.await;
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-process source fed through an mpsc channel.
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl RecordSource for ChannelSource {
    fn poll_record(&mut self) -> AppResult<SourcePoll> {
        match self.rx.try_recv() {
            Ok(record) => Ok(SourcePoll::Record(record)),
            Err(TryRecvError::Empty) => Ok(SourcePoll::Empty),
            Err(TryRecvError::Disconnected) => Ok(SourcePoll::Closed),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Open the detector serial port: 8 data bits, no parity, one stop bit, no flow control.
#[cfg(feature = "serial")]
pub fn open_serial(port: &str, baud_rate: u32) -> AppResult<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    tokio_serial::new(port, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| DaqError::SourceUnavailable(format!("failed to open {}: {}", port, e)))
}

/// Open the source described by `config`.
pub async fn open_source(config: &SourceConfig) -> AppResult<Box<dyn RecordSource>> {
    let capacity = config.channel_capacity;
    match config.kind {
        #[cfg(feature = "serial")]
        SourceKind::Serial => {
            let port = open_serial(&config.port, config.baud_rate)?;
            tracing::info!(port = %config.port, baud = config.baud_rate, "Serial link opened");
            Ok(Box::new(LineSource::spawn(config.port.clone(), port, capacity)))
        }
        #[cfg(not(feature = "serial"))]
        SourceKind::Serial => Err(DaqError::InvalidConfiguration(
            "serial support not enabled. Rebuild with --features serial".to_string(),
        )),
        SourceKind::File => {
            let path = config.path.as_ref().ok_or_else(|| {
                DaqError::InvalidConfiguration("source.path is required for a file source".into())
            })?;
            let file = tokio::fs::File::open(path).await?;
            tracing::info!(path = %path.display(), "Replaying raw records from file");
            Ok(Box::new(LineSource::spawn(
                path.display().to_string(),
                file,
                capacity,
            )))
        }
        SourceKind::Stdin => Ok(Box::new(LineSource::spawn(
            "stdin",
            tokio::io::stdin(),
            capacity,
        ))),
    }
}
