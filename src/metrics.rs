//! Latency sample collection and percentile statistics.
//!
//! One collector lives for the duration of a single test run. It keeps the
//! raw millisecond samples so percentiles can use exact sorted-sample
//! semantics: p50 is the true statistical median, p90/p99 use nearest-rank
//! indexing with the index clamped to `n - 1` so every percentile is defined
//! even for a single sample. Zero samples produce an all-zero summary, which
//! is a reportable degenerate outcome rather than an error.

use serde::{Deserialize, Serialize};

/// Statistics derived from one test's latency samples, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub samples: usize,
}

/// Collects per-operation latency samples for a single test run.
///
/// Samples are ephemeral: the collector is consumed when the summary is
/// derived and nothing outlives the resulting [`LatencySummary`].
#[derive(Debug, Default)]
pub struct LatencyCollector {
    samples_ms: Vec<f64>,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one measured operation latency.
    pub fn record(&mut self, latency_ms: f64) {
        self.samples_ms.push(latency_ms);
    }

    pub fn len(&self) -> usize {
        self.samples_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples_ms.is_empty()
    }

    /// Consume the collector and derive the percentile summary.
    pub fn summarize(mut self) -> LatencySummary {
        if self.samples_ms.is_empty() {
            return LatencySummary::default();
        }

        self.samples_ms.sort_by(|a, b| a.total_cmp(b));
        let sorted = &self.samples_ms;
        let count = sorted.len();

        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;

        LatencySummary {
            p50_ms: median(sorted),
            p90_ms: percentile_clamped(sorted, 0.90),
            p99_ms: percentile_clamped(sorted, 0.99),
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            mean_ms: mean,
            std_dev_ms: variance.sqrt(),
            samples: count,
        }
    }
}

/// Median of an ascending-sorted, non-empty slice: middle value for odd
/// counts, average of the two middle values for even counts.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Nearest-rank percentile over an ascending-sorted, non-empty slice.
///
/// Index is `min(floor(n * quantile), n - 1)`; the clamp keeps the value
/// defined for every sample count.
fn percentile_clamped(sorted: &[f64], quantile: f64) -> f64 {
    let index = ((sorted.len() as f64 * quantile).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(samples: &[f64]) -> LatencySummary {
        let mut collector = LatencyCollector::new();
        for &sample in samples {
            collector.record(sample);
        }
        collector.summarize()
    }

    #[test]
    fn empty_collector_yields_all_zero_summary() {
        let summary = LatencyCollector::new().summarize();
        assert_eq!(summary, LatencySummary::default());
        assert_eq!(summary.p50_ms, 0.0);
        assert_eq!(summary.samples, 0);
    }

    #[test]
    fn single_sample_defines_every_percentile() {
        let summary = collect(&[7.3]);
        assert_eq!(summary.p50_ms, 7.3);
        assert_eq!(summary.p90_ms, 7.3);
        assert_eq!(summary.p99_ms, 7.3);
        assert_eq!(summary.min_ms, 7.3);
        assert_eq!(summary.max_ms, 7.3);
    }

    #[test]
    fn five_samples_match_nearest_rank_semantics() {
        // n = 5: p90 index = floor(4.5) = 4, p99 index = floor(4.95) = 4.
        let summary = collect(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(summary.p50_ms, 30.0);
        assert_eq!(summary.p90_ms, 50.0);
        assert_eq!(summary.p99_ms, 50.0);
    }

    #[test]
    fn even_count_median_averages_the_middles() {
        let summary = collect(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(summary.p50_ms, 2.5);
    }

    #[test]
    fn unsorted_input_is_sorted_before_ranking() {
        let summary = collect(&[50.0, 10.0, 40.0, 20.0, 30.0]);
        assert_eq!(summary.p50_ms, 30.0);
        assert_eq!(summary.min_ms, 10.0);
        assert_eq!(summary.max_ms, 50.0);
    }

    #[test]
    fn percentile_index_stays_in_bounds_for_all_small_counts() {
        for n in 1..=64 {
            let samples: Vec<f64> = (1..=n).map(|i| i as f64).collect();
            let summary = collect(&samples);
            // Every percentile must come from the sample set itself.
            assert!(samples.contains(&summary.p90_ms));
            assert!(samples.contains(&summary.p99_ms));
            assert!(summary.p90_ms <= samples[n - 1]);
            assert!(summary.p99_ms <= samples[n - 1]);
        }
    }

    #[test]
    fn mean_and_std_dev_are_population_statistics() {
        let summary = collect(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(summary.mean_ms, 5.0);
        assert!((summary.std_dev_ms - 2.0).abs() < 1e-9);
    }
}
