//! # Pulse DAQ Core Library
//!
//! This crate ingests the line-oriented event stream of a pulse detector (Geiger-style
//! counter) over a serial link, durably logs every event, and maintains live statistical
//! views over the most recent events: an inter-arrival gap histogram (exponential view),
//! a histogram of events per fixed time window (Poisson view) and a peak amplitude
//! histogram. The binary (`main.rs`) is a thin headless front-end; any presentation layer
//! consumes the published [`scheduler::AggregateSnapshot`]s.
//!
//! ## Crate Structure
//!
//! - **`event`**: The `Event` type and the stateless raw-record decoder.
//! - **`event_log`**: Append-only, numbered event log on disk, plus a reader for the format.
//! - **`store`**: Bounded FIFO retention of recent gaps, timestamps and amplitudes.
//! - **`histogram`**: The generic fixed-bin `Histogram` and its bin-edge strategies.
//! - **`aggregate`**: Gap, window-count and amplitude views computed from a store snapshot.
//! - **`source`**: Non-blocking record sources (serial port, replay file, stdin, channel).
//! - **`scheduler`**: The periodic `Idle`/`Processing` driver that owns all mutable state,
//!   applies configuration messages between passes and publishes snapshots.
//! - **`config`**: Figment-based configuration loading and validation.
//! - **`error`**: The `DaqError` enum shared by every component.
//! - **`tracing_setup`**: Structured logging initialisation.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ decode ──┬──▶ store ──▶ aggregate ──▶ watch<AggregateSnapshot> ──▶ presenter
//!                     └──▶ event log (flushed every tick)
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod event;
pub mod event_log;
pub mod histogram;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod tracing_setup;
