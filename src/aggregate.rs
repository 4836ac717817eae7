//! Statistical views over a store snapshot.
//!
//! Three views are recomputed from scratch on every tick, so each is a pure function
//! of the snapshot and the configuration:
//!
//! - **Gap view**: equal-width histogram of inter-arrival gaps (exponential view).
//! - **Window-count view**: events counted per fixed-width time window, then a
//!   histogram of those counts (Poisson view).
//! - **Amplitude view**: equal-width histogram of pulse peak amplitudes.
//!
//! # Window counting
//!
//! Windows are anchored at the oldest retained timestamp `t0`. With `tN` the newest,
//! there are `floor((tN - t0) / width)` complete windows `[t0 + k*w, t0 + (k+1)*w)`.
//! Timestamps in the trailing, necessarily incomplete window are discarded so the
//! distribution is not biased toward zero. Window boundaries move as the store evicts.

use crate::config::AggregationConfig;
use crate::histogram::{BinEdges, Histogram};
use crate::store::StoreSnapshot;
use serde::{Deserialize, Serialize};

/// Equal-width histogram of gaps over the configured gap range.
pub fn gap_histogram(gaps: &[u64], config: &AggregationConfig) -> Histogram {
    Histogram::build(config.gap_edges(), gaps.iter().copied())
}

/// Equal-width histogram of peak amplitudes over the configured amplitude range.
pub fn amplitude_histogram(amplitudes: &[u64], config: &AggregationConfig) -> Histogram {
    Histogram::build(config.amplitude_edges(), amplitudes.iter().copied())
}

/// Per-window event counts for one snapshot, stored sparsely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCounts {
    window_width: u64,
    num_windows: u64,
    /// `(window_index, count)` for windows holding at least one event, ascending.
    occupied: Vec<(u64, u64)>,
}

impl WindowCounts {
    /// Count timestamps per complete window.
    ///
    /// Zero complete windows (including an empty snapshot or a zero width) yields an
    /// empty result rather than an error.
    pub fn compute(timestamps: &[u64], window_width: u64) -> Self {
        let empty = Self {
            window_width,
            num_windows: 0,
            occupied: Vec::new(),
        };
        let (Some(&t0), Some(&tn)) = (timestamps.first(), timestamps.last()) else {
            return empty;
        };
        if window_width == 0 {
            return empty;
        }
        let num_windows = tn.saturating_sub(t0) / window_width;
        if num_windows == 0 {
            return empty;
        }

        let mut occupied: Vec<(u64, u64)> = Vec::new();
        let mut in_order = true;
        for &t in timestamps {
            // A timestamp older than t0 belongs to no window.
            let Some(offset) = t.checked_sub(t0) else {
                continue;
            };
            let idx = offset / window_width;
            if idx >= num_windows {
                continue;
            }
            match occupied.last_mut() {
                Some((last, count)) if *last == idx => *count += 1,
                Some((last, _)) => {
                    in_order &= *last < idx;
                    occupied.push((idx, 1));
                }
                None => occupied.push((idx, 1)),
            }
        }

        if !in_order {
            occupied.sort_unstable_by_key(|&(idx, _)| idx);
            let mut merged: Vec<(u64, u64)> = Vec::with_capacity(occupied.len());
            for (idx, count) in occupied {
                match merged.last_mut() {
                    Some((last, total)) if *last == idx => *total += count,
                    _ => merged.push((idx, count)),
                }
            }
            occupied = merged;
        }

        Self {
            window_width,
            num_windows,
            occupied,
        }
    }

    /// Width used to partition the snapshot.
    pub fn window_width(&self) -> u64 {
        self.window_width
    }

    /// Number of complete windows.
    pub fn num_windows(&self) -> u64 {
        self.num_windows
    }

    /// Events that landed in a complete window.
    pub fn counted_events(&self) -> u64 {
        self.occupied.iter().map(|&(_, count)| count).sum()
    }

    /// `(window_index, count)` for every window holding at least one event, ascending.
    ///
    /// Windows not listed are empty.
    pub fn occupied(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.occupied.iter().copied()
    }

    /// Histogram of window counts: bin `c` holds the number of windows with exactly
    /// `c` events. Edges are `0..=max_count + 1`.
    pub fn histogram(&self) -> Histogram {
        if self.num_windows == 0 {
            return Histogram::empty();
        }
        let max_count = self.occupied.iter().map(|&(_, c)| c).max().unwrap_or(0);
        let empty_windows = self.num_windows - self.occupied.len() as u64;
        let weighted = self
            .occupied
            .iter()
            .map(|&(_, count)| (count, 1))
            .chain(std::iter::once((0, empty_windows)));
        Histogram::build_weighted(
            BinEdges::UnitWidth {
                bins: max_count as usize + 1,
            },
            weighted,
        )
    }
}

/// Histogram of events-per-window counts for a timestamp snapshot.
pub fn window_count_histogram(timestamps: &[u64], window_width: u64) -> Histogram {
    WindowCounts::compute(timestamps, window_width).histogram()
}

/// Window width that yields `mean_count` events per window at the snapshot's rate.
///
/// `width = mean_count * (tN - t0) / n`, rounded, at least 1. `None` when the
/// snapshot spans no time or `mean_count` is not positive.
pub fn window_width_for_mean(timestamps: &[u64], mean_count: f64) -> Option<u64> {
    let (&t0, &tn) = (timestamps.first()?, timestamps.last()?);
    let span = tn.checked_sub(t0).filter(|&s| s > 0)?;
    if !mean_count.is_finite() || mean_count <= 0.0 {
        return None;
    }
    let width = mean_count * span as f64 / timestamps.len() as f64;
    Some((width.round() as u64).max(1))
}

/// Arithmetic mean of the snapshot's gaps.
pub fn mean_gap(gaps: &[u64]) -> Option<f64> {
    if gaps.is_empty() {
        return None;
    }
    let sum: u128 = gaps.iter().map(|&g| u128::from(g)).sum();
    Some(sum as f64 / gaps.len() as f64)
}

/// All views computed for one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    /// Gap view.
    pub gaps: Histogram,
    /// Window-count view.
    pub window_counts: Histogram,
    /// Amplitude view.
    pub amplitudes: Histogram,
    /// Complete windows used by the window-count view.
    pub windows: u64,
    /// Mean gap of the snapshot.
    pub mean_gap: Option<f64>,
}

/// Compute every view from one snapshot and configuration.
pub fn aggregate(snapshot: &StoreSnapshot<'_>, config: &AggregationConfig) -> Aggregates {
    let windows = WindowCounts::compute(snapshot.timestamps, config.window_width);
    Aggregates {
        gaps: gap_histogram(snapshot.gaps, config),
        window_counts: windows.histogram(),
        amplitudes: amplitude_histogram(snapshot.amplitudes, config),
        windows: windows.num_windows(),
        mean_gap: mean_gap(snapshot.gaps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::store::BoundedEventStore;

    fn dense(windows: &WindowCounts) -> Vec<u64> {
        let mut counts = vec![0u64; windows.num_windows() as usize];
        for (idx, count) in windows.occupied() {
            counts[idx as usize] = count;
        }
        counts
    }

    fn config() -> AggregationConfig {
        AggregationConfig {
            gap_min: 10,
            gap_max: 20,
            gap_bins: 5,
            window_width: 10,
            ..AggregationConfig::default()
        }
    }

    #[test]
    fn gap_histogram_boundaries() {
        let gaps = [9, 10, 11, 15, 19, 20, 25];
        let hist = gap_histogram(&gaps, &config());
        assert_eq!(hist.edges, vec![10.0, 12.0, 14.0, 16.0, 18.0, 20.0]);
        assert_eq!(hist.counts, vec![2, 0, 1, 0, 1]);
        // 9, 20 and 25 lie outside [10, 20)
        assert_eq!(hist.total(), 4);
    }

    #[test]
    fn window_counts_discard_trailing_partial_window() {
        let timestamps = [0, 5, 12, 100];
        let windows = WindowCounts::compute(&timestamps, 10);
        assert_eq!(windows.num_windows(), 10);
        assert_eq!(dense(&windows), vec![2, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(windows.counted_events(), 3);

        let hist = windows.histogram();
        assert_eq!(hist.edges, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(hist.counts, vec![8, 1, 1]);
        assert_eq!(hist.total(), 10);
    }

    #[test]
    fn no_complete_window_is_empty_result() {
        assert!(window_count_histogram(&[], 10).is_empty());
        assert!(window_count_histogram(&[42], 10).is_empty());
        assert!(window_count_histogram(&[0, 3, 9], 10).is_empty());
        assert!(window_count_histogram(&[0, 30], 0).is_empty());
    }

    #[test]
    fn exactly_one_window() {
        // span 10 -> one window [0, 10); 10 starts the incomplete second window
        let hist = window_count_histogram(&[0, 1, 2, 10], 10);
        assert_eq!(hist.counts, vec![0, 0, 0, 1]);
    }

    #[test]
    fn windows_anchor_at_oldest_timestamp() {
        let hist = window_count_histogram(&[1000, 1004, 1009, 1010, 1031], 10);
        // windows [1000,1010) [1010,1020) [1020,1030): counts 3, 1, 0
        assert_eq!(hist.counts, vec![1, 1, 0, 1]);
    }

    #[test]
    fn out_of_order_timestamps_are_merged() {
        let ordered = WindowCounts::compute(&[0, 3, 11, 15, 22, 40], 10);
        let shuffled = WindowCounts::compute(&[0, 15, 3, 22, 11, 40], 10);
        assert_eq!(dense(&ordered), dense(&shuffled));
        assert_eq!(ordered.histogram(), shuffled.histogram());
    }

    #[test]
    fn timestamps_before_anchor_are_ignored() {
        let windows = WindowCounts::compute(&[50, 10, 55, 70], 10);
        assert_eq!(dense(&windows), vec![2, 0]);
    }

    #[test]
    fn sparse_counting_handles_many_empty_windows() {
        let windows = WindowCounts::compute(&[0, 1, 5_000_000_001], 1);
        assert_eq!(windows.num_windows(), 5_000_000_001);
        assert_eq!(windows.occupied().collect::<Vec<_>>(), vec![(0, 1), (1, 1)]);
        let hist = windows.histogram();
        assert_eq!(hist.counts, vec![5_000_000_000 - 1, 2]);
    }

    #[test]
    fn width_for_mean_matches_rate() {
        // 11 events over 100 units -> 0.11 events/unit -> 1.5 / 0.11 = 13.6
        let timestamps: Vec<u64> = (0..=10).map(|i| i * 10).collect();
        assert_eq!(window_width_for_mean(&timestamps, 1.5), Some(14));
        assert_eq!(window_width_for_mean(&timestamps, 0.0), None);
        assert_eq!(window_width_for_mean(&[5, 5], 1.0), None);
        assert_eq!(window_width_for_mean(&[], 1.0), None);
        assert_eq!(window_width_for_mean(&[0, 1000], 0.0001), Some(1));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let mut store = BoundedEventStore::new(64).unwrap();
        let mut ts = 0;
        for i in 0..50u64 {
            let gap = (i * 7) % 23;
            ts += gap;
            store.push(&Event::new(700 + i % 100, ts, gap));
        }
        let cfg = config();
        let snapshot = store.snapshot();
        let first = aggregate(&snapshot, &cfg);
        let second = aggregate(&snapshot, &cfg);
        assert_eq!(first, second);
        assert_eq!(first.gaps.total(), snapshot.gaps.iter().filter(|g| (10..20).contains(*g)).count() as u64);
    }

    #[test]
    fn mean_gap_of_empty_is_none() {
        assert_eq!(mean_gap(&[]), None);
        assert_eq!(mean_gap(&[10, 20, 30]), Some(20.0));
    }
}
