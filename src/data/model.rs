use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Observation – one measured benchmark configuration
// ---------------------------------------------------------------------------

/// A single measurement extracted from benchmark output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Number of worker threads used in the run (always ≥ 1).
    pub thread_count: u32,
    /// Number of hash bits sizing the partitioning scheme.
    pub hash_bits: u32,
    /// Measured metric (throughput, context switches, ...). Always finite.
    pub value: f64,
}

impl Observation {
    pub fn new(thread_count: u32, hash_bits: u32, value: f64) -> Self {
        Observation {
            thread_count,
            hash_bits,
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// SeriesSet – the aggregated data, one series per thread count
// ---------------------------------------------------------------------------

/// A series point: `(hash_bits, aggregated value)`.
pub type Point = (u32, f64);

/// Aggregated data keyed by thread count.
///
/// `BTreeMap` keeps thread counts ascending, which is also the legend order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    pub series: BTreeMap<u32, Vec<Point>>,
}

impl SeriesSet {
    /// Number of series (distinct thread counts).
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether there is nothing to plot.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Thread counts in ascending order.
    pub fn thread_counts(&self) -> impl Iterator<Item = u32> + '_ {
        self.series.keys().copied()
    }

    /// Iterate `(thread_count, points)` in ascending thread order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[Point])> {
        self.series.iter().map(|(t, pts)| (*t, pts.as_slice()))
    }

    /// Smallest and largest hash bits across all series.
    pub fn x_bounds(&self) -> Option<(u32, u32)> {
        let mut xs = self.series.values().flatten().map(|(x, _)| *x);
        let first = xs.next()?;
        Some(xs.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x))))
    }

    /// Smallest and largest value across all series.
    pub fn y_bounds(&self) -> Option<(f64, f64)> {
        let mut ys = self.series.values().flatten().map(|(_, y)| *y);
        let first = ys.next()?;
        Some(ys.fold((first, first), |(lo, hi), y| (lo.min(y), hi.max(y))))
    }
}
