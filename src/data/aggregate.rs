use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use super::model::{Observation, Point, SeriesSet};

// ---------------------------------------------------------------------------
// Aggregation strategy
// ---------------------------------------------------------------------------

/// How observations sharing a thread count are folded into a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Aggregation {
    /// Keep every raw value, ordered by `(hash_bits, value)`.
    Retain,
    /// Average values sharing `(thread_count, hash_bits)`.
    Mean,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Retain => write!(f, "retain"),
            Aggregation::Mean => write!(f, "mean"),
        }
    }
}

/// Group observations into one series per thread count.
///
/// Thread counts without observations are simply absent from the result.
pub fn aggregate(observations: &[Observation], mode: Aggregation) -> SeriesSet {
    match mode {
        Aggregation::Retain => retain(observations),
        Aggregation::Mean => mean(observations),
    }
}

fn retain(observations: &[Observation]) -> SeriesSet {
    let mut series: BTreeMap<u32, Vec<Point>> = BTreeMap::new();
    for obs in observations {
        series
            .entry(obs.thread_count)
            .or_default()
            .push((obs.hash_bits, obs.value));
    }

    for (threads, points) in series.iter_mut() {
        points.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
        let duplicates = points.windows(2).filter(|w| w[0].0 == w[1].0).count();
        if duplicates > 0 {
            warn!("threads={threads}: {duplicates} duplicate hash-bit point(s) kept as-is");
        }
    }

    SeriesSet { series }
}

fn mean(observations: &[Observation]) -> SeriesSet {
    // (sum, count) per (thread_count, hash_bits)
    let mut groups: BTreeMap<(u32, u32), (f64, usize)> = BTreeMap::new();
    for obs in observations {
        let acc = groups
            .entry((obs.thread_count, obs.hash_bits))
            .or_insert((0.0, 0));
        acc.0 += obs.value;
        acc.1 += 1;
    }

    // Keys iterate in (threads, bits) order, so each series comes out sorted.
    let mut series: BTreeMap<u32, Vec<Point>> = BTreeMap::new();
    for ((threads, bits), (sum, count)) in groups {
        series
            .entry(threads)
            .or_default()
            .push((bits, sum / count as f64));
    }

    SeriesSet { series }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn obs(t: u32, b: u32, v: f64) -> Observation {
        Observation::new(t, b, v)
    }

    #[test]
    fn mean_averages_duplicate_keys() {
        let input = [obs(2, 4, 10.0), obs(2, 4, 20.0), obs(2, 8, 30.0)];
        let set = aggregate(&input, Aggregation::Mean);
        assert_eq!(set.len(), 1);
        assert_eq!(set.series[&2], vec![(4, 15.0), (8, 30.0)]);
    }

    #[test]
    fn mean_series_are_strictly_increasing() {
        let input = [
            obs(4, 12, 1.0),
            obs(1, 3, 2.0),
            obs(4, 2, 3.0),
            obs(4, 12, 5.0),
            obs(1, 0, 4.0),
            obs(4, 7, 6.0),
        ];
        let set = aggregate(&input, Aggregation::Mean);
        for (_, points) in set.iter() {
            assert!(points.windows(2).all(|w| w[0].0 < w[1].0));
        }
        assert_eq!(set.series[&4], vec![(2, 3.0), (7, 6.0), (12, 3.0)]);
    }

    #[test]
    fn mean_of_many_duplicates_within_tolerance() {
        let values = [0.1, 0.2, 0.3, 0.7];
        let input: Vec<_> = values.iter().map(|&v| obs(16, 10, v)).collect();
        let set = aggregate(&input, Aggregation::Mean);
        let (_, got) = set.series[&16][0];
        assert!((got - 0.325).abs() < 1e-12);
    }

    #[test]
    fn thread_counts_match_input() {
        let input = [obs(1, 0, 1.0), obs(32, 5, 1.0), obs(8, 5, 1.0), obs(1, 9, 1.0)];
        let expected: BTreeSet<u32> = input.iter().map(|o| o.thread_count).collect();
        for mode in [Aggregation::Mean, Aggregation::Retain] {
            let set = aggregate(&input, mode);
            let got: BTreeSet<u32> = set.thread_counts().collect();
            assert_eq!(got, expected, "{mode}");
        }
    }

    #[test]
    fn retain_sorts_by_hash_bits_and_keeps_raw_values() {
        let input = [obs(2, 8, 30.0), obs(2, 4, 20.0), obs(2, 4, 10.0), obs(2, 0, 1.0)];
        let set = aggregate(&input, Aggregation::Retain);
        assert_eq!(set.series[&2], vec![(0, 1.0), (4, 10.0), (4, 20.0), (8, 30.0)]);
    }

    #[test]
    fn empty_input_gives_empty_set() {
        assert!(aggregate(&[], Aggregation::Mean).is_empty());
        assert!(aggregate(&[], Aggregation::Retain).is_empty());
    }
}
