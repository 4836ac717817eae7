//! Generic fixed-bin histogram.
//!
//! A histogram of `n` bins carries `n + 1` ascending edges and `n` counts. Bin `i`
//! covers the half-open interval `[edges[i], edges[i + 1])`; values outside
//! `[edges[0], edges[n])` are not counted. Edge generation is a [`BinEdges`] strategy:
//! equal-width bins over a configured range, or unit-width bins over `0..n` for
//! histograms whose domain is itself a count.

use serde::{Deserialize, Serialize};

/// Bin-edge generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinEdges {
    /// `bins` equal-width bins spanning `[min, max)`.
    EqualWidth {
        /// Inclusive lower bound.
        min: u64,
        /// Exclusive upper bound.
        max: u64,
        /// Number of bins.
        bins: usize,
    },
    /// Bins `[0,1), [1,2), ..., [bins-1, bins)`.
    UnitWidth {
        /// Number of bins.
        bins: usize,
    },
}

impl BinEdges {
    /// Number of bins produced, zero for a degenerate range.
    pub fn bin_count(&self) -> usize {
        match *self {
            BinEdges::EqualWidth { min, max, bins } if max > min => bins,
            BinEdges::EqualWidth { .. } => 0,
            BinEdges::UnitWidth { bins } => bins,
        }
    }

    /// The `bin_count() + 1` bin edges, or none for zero bins.
    pub fn edges(&self) -> Vec<f64> {
        let n = self.bin_count();
        if n == 0 {
            return Vec::new();
        }
        match *self {
            BinEdges::EqualWidth { min, max, .. } => {
                let width = (max - min) as f64 / n as f64;
                (0..=n)
                    .map(|i| if i == n { max as f64 } else { min as f64 + i as f64 * width })
                    .collect()
            }
            BinEdges::UnitWidth { .. } => (0..=n).map(|i| i as f64).collect(),
        }
    }

    /// Bin index of `value`, or `None` when it falls outside the edges.
    ///
    /// Equal-width binning is `floor((v - min) * bins / (max - min))` in integer
    /// arithmetic, so boundaries are exact.
    pub fn bin_index(&self, value: u64) -> Option<usize> {
        let n = self.bin_count();
        if n == 0 {
            return None;
        }
        match *self {
            BinEdges::EqualWidth { min, max, .. } => {
                if value < min || value >= max {
                    return None;
                }
                let offset = u128::from(value - min);
                let span = u128::from(max - min);
                Some((offset * n as u128 / span) as usize)
            }
            BinEdges::UnitWidth { .. } => {
                let idx = usize::try_from(value).ok()?;
                (idx < n).then_some(idx)
            }
        }
    }
}

/// Bin edges plus per-bin counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// `n + 1` ascending edges.
    pub edges: Vec<f64>,
    /// `n` counts.
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Histogram with no bins ("insufficient data").
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bin `values` according to `strategy`. Out-of-range values are skipped.
    pub fn build(strategy: BinEdges, values: impl IntoIterator<Item = u64>) -> Self {
        Self::build_weighted(strategy, values.into_iter().map(|value| (value, 1)))
    }

    /// Bin `(value, weight)` pairs, adding `weight` to the bin of `value`.
    pub fn build_weighted(
        strategy: BinEdges,
        values: impl IntoIterator<Item = (u64, u64)>,
    ) -> Self {
        let n = strategy.bin_count();
        if n == 0 {
            return Self::empty();
        }
        let mut counts = vec![0u64; n];
        for (value, weight) in values {
            if let Some(idx) = strategy.bin_index(value) {
                counts[idx] += weight;
            }
        }
        Self {
            edges: strategy.edges(),
            counts,
        }
    }

    /// Whether the histogram has no bins.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of bins.
    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Iterate `(lower_edge, upper_edge, count)` per bin.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64, u64)> + '_ {
        self.edges
            .windows(2)
            .zip(&self.counts)
            .map(|(edge, &count)| (edge[0], edge[1], count))
    }

    /// Index of the fullest bin (first one on ties).
    pub fn mode_bin(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(idx, _)| idx)
    }
}
