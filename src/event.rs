//! Detection events and the raw-record decoder.
//!
//! The detector reports one line per pulse with three whitespace-separated integer
//! fields:
//!
//! ```text
//! <peak_amplitude> <device_timestamp> <gap_since_previous>
//! ```
//!
//! Timestamps and gaps are in detector clock units (milliseconds for the reference
//! firmware). Decoding is a pure function of the record.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

/// Number of whitespace-separated fields in a raw detector record.
pub const RECORD_FIELDS: usize = 3;

/// One decoded detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Peak amplitude of the pulse (ADC counts).
    pub peak_amplitude: u64,
    /// Monotonic detector timestamp.
    pub device_timestamp: u64,
    /// Time since the previous pulse, same units as the timestamp.
    pub gap_since_previous: u64,
}

impl Event {
    /// Create an event from its three fields.
    pub fn new(peak_amplitude: u64, device_timestamp: u64, gap_since_previous: u64) -> Self {
        Self {
            peak_amplitude,
            device_timestamp,
            gap_since_previous,
        }
    }
}

/// Decode one newline-stripped raw record.
///
/// Fails with [`DaqError::MalformedRecord`] unless the record splits into exactly
/// [`RECORD_FIELDS`] non-negative integers. Never panics on garbage input.
pub fn decode_record(record: &str) -> AppResult<Event> {
    let trimmed = record.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() != RECORD_FIELDS {
        return Err(DaqError::malformed(
            trimmed,
            format!("expected {} fields, found {}", RECORD_FIELDS, fields.len()),
        ));
    }

    let mut values = [0u64; RECORD_FIELDS];
    for (slot, field) in values.iter_mut().zip(&fields) {
        *slot = field
            .parse::<u64>()
            .map_err(|e| DaqError::malformed(trimmed, format!("field {:?}: {}", field, e)))?;
    }

    Ok(Event::new(values[0], values[1], values[2]))
}
