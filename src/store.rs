//! Bounded in-memory retention of recent events.
//!
//! The store keeps three index-aligned FIFO sequences (gaps, timestamps, amplitudes).
//! Once `capacity` events are held, each push evicts the oldest entry of every sequence
//! first. Eviction is a safety valve for very high event rates, not the normal case.
//!
//! Aggregators never see the deques directly. [`BoundedEventStore::snapshot`] borrows the
//! store for the duration of one aggregation pass, so the borrow checker rules out pushes
//! while a pass is reading it.

use crate::error::{AppResult, DaqError};
use crate::event::Event;
use std::collections::VecDeque;

/// Default number of retained events.
pub const DEFAULT_CAPACITY: usize = 500_000;

/// FIFO store of the most recent events.
#[derive(Debug, Clone)]
pub struct BoundedEventStore {
    capacity: usize,
    gaps: VecDeque<u64>,
    timestamps: VecDeque<u64>,
    amplitudes: VecDeque<u64>,
    evicted: u64,
}

impl BoundedEventStore {
    /// Create an empty store holding at most `capacity` events.
    pub fn new(capacity: usize) -> AppResult<Self> {
        if capacity == 0 {
            return Err(DaqError::InvalidConfiguration(
                "store capacity must be at least 1".to_string(),
            ));
        }
        // Deques grow on demand up to `capacity`.
        let initial = capacity.min(4096);
        Ok(Self {
            capacity,
            gaps: VecDeque::with_capacity(initial),
            timestamps: VecDeque::with_capacity(initial),
            amplitudes: VecDeque::with_capacity(initial),
            evicted: 0,
        })
    }

    /// Append an event, evicting the oldest one first when full.
    pub fn push(&mut self, event: &Event) {
        if self.gaps.len() == self.capacity {
            self.gaps.pop_front();
            self.timestamps.pop_front();
            self.amplitudes.pop_front();
            self.evicted += 1;
        }
        self.gaps.push_back(event.gap_since_previous);
        self.timestamps.push_back(event.device_timestamp);
        self.amplitudes.push_back(event.peak_amplitude);
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Maximum number of retained events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the next push will evict.
    pub fn is_full(&self) -> bool {
        self.gaps.len() == self.capacity
    }

    /// Total events evicted since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Point-in-time view for one aggregation pass, oldest first.
    pub fn snapshot(&mut self) -> StoreSnapshot<'_> {
        StoreSnapshot {
            gaps: self.gaps.make_contiguous(),
            timestamps: self.timestamps.make_contiguous(),
            amplitudes: self.amplitudes.make_contiguous(),
        }
    }
}

/// Read-only, length-stable view of the store.
#[derive(Debug, Clone, Copy)]
pub struct StoreSnapshot<'a> {
    /// Inter-arrival gaps, oldest first.
    pub gaps: &'a [u64],
    /// Device timestamps, oldest first.
    pub timestamps: &'a [u64],
    /// Peak amplitudes, oldest first.
    pub amplitudes: &'a [u64],
}

impl StoreSnapshot<'_> {
    /// Number of events in the view.
    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(i: u64) -> Event {
        Event::new(700 + i, 1000 + 10 * i, i)
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(BoundedEventStore::new(0).is_err());
    }

    #[test]
    fn sequences_stay_aligned_below_capacity() {
        let mut store = BoundedEventStore::new(8).unwrap();
        for i in 0..5 {
            store.push(&event(i));
        }
        let snap = store.snapshot();
        assert_eq!(snap.len(), 5);
        assert_eq!(snap.gaps.len(), snap.timestamps.len());
        assert_eq!(snap.gaps.len(), snap.amplitudes.len());
        assert_eq!(snap.timestamps, &[1000, 1010, 1020, 1030, 1040]);
    }

    #[test]
    fn evicts_oldest_at_boundary() {
        let capacity = 4;
        let mut store = BoundedEventStore::new(capacity).unwrap();
        for i in 0..capacity as u64 {
            store.push(&event(i));
        }
        assert!(store.is_full());
        assert_eq!(store.evicted(), 0);

        // One past capacity drops exactly the first event.
        store.push(&event(4));
        assert_eq!(store.len(), capacity);
        assert_eq!(store.evicted(), 1);
        assert_eq!(store.snapshot().gaps, &[1, 2, 3, 4]);
    }

    #[test]
    fn keeps_most_recent_capacity_events_in_order() {
        let capacity = 100;
        let extra = 37;
        let mut store = BoundedEventStore::new(capacity).unwrap();
        for i in 0..(capacity + extra) as u64 {
            store.push(&event(i));
            assert!(store.len() <= capacity);
        }

        let snap = store.snapshot();
        let expected: Vec<u64> = (extra as u64..(capacity + extra) as u64).collect();
        assert_eq!(snap.gaps, expected.as_slice());
        let expected_ts: Vec<u64> = expected.iter().map(|i| 1000 + 10 * i).collect();
        assert_eq!(snap.timestamps, expected_ts.as_slice());
        let expected_amp: Vec<u64> = expected.iter().map(|i| 700 + i).collect();
        assert_eq!(snap.amplitudes, expected_amp.as_slice());
        assert_eq!(store.evicted(), extra as u64);
    }

    #[test]
    fn capacity_of_one_holds_latest() {
        let mut store = BoundedEventStore::new(1).unwrap();
        store.push(&event(1));
        store.push(&event(2));
        let snap = store.snapshot();
        assert_eq!(snap.gaps, &[2]);
        assert_eq!(snap.timestamps, &[1020]);
    }
}
