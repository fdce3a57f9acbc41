//! Cross-protocol comparison of benchmark results.
//!
//! The comparator is the only component aware of more than one protocol at
//! a time. It matches results by exact test name across the per-protocol
//! runs, determines a winner per metric, and produces a report the caller
//! can render or serialize. Comparison data is derived: it is recomputed
//! from the runs on every build and never persisted on its own.

use crate::cli::Protocol;
use crate::results::{BenchmarkResult, ProtocolRun};
use crate::utils::{format_latency_ms, format_rate, format_throughput_kbps};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-metric winning protocol for one matched test.
///
/// `None` means undetermined: no contender had a strictly positive value
/// for that metric (for example, latency percentiles when a protocol
/// collected no samples, or throughput on single-write tests).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricWinners {
    pub ops_per_second: Option<Protocol>,
    pub throughput_kbps: Option<Protocol>,
    pub latency_p50_ms: Option<Protocol>,
    pub latency_p90_ms: Option<Protocol>,
    pub latency_p99_ms: Option<Protocol>,
}

impl MetricWinners {
    fn select(contenders: &[(Protocol, BenchmarkResult)]) -> Self {
        Self {
            ops_per_second: highest(contenders, |r| r.ops_per_second),
            throughput_kbps: highest(contenders, |r| r.throughput_kbps),
            latency_p50_ms: lowest(contenders, |r| r.latency_p50_ms),
            latency_p90_ms: lowest(contenders, |r| r.latency_p90_ms),
            latency_p99_ms: lowest(contenders, |r| r.latency_p99_ms),
        }
    }
}

/// Maximum strictly-positive value wins.
fn highest(
    contenders: &[(Protocol, BenchmarkResult)],
    metric: fn(&BenchmarkResult) -> f64,
) -> Option<Protocol> {
    contenders
        .iter()
        .filter(|(_, result)| metric(result) > 0.0)
        .max_by(|a, b| metric(&a.1).total_cmp(&metric(&b.1)))
        .map(|(protocol, _)| *protocol)
}

/// Minimum strictly-positive value wins; zero means "no samples" and never
/// wins.
fn lowest(
    contenders: &[(Protocol, BenchmarkResult)],
    metric: fn(&BenchmarkResult) -> f64,
) -> Option<Protocol> {
    contenders
        .iter()
        .filter(|(_, result)| metric(result) > 0.0)
        .min_by(|a, b| metric(&a.1).total_cmp(&metric(&b.1)))
        .map(|(protocol, _)| *protocol)
}

/// All results sharing one test name, with the per-metric winners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub test_name: String,
    pub contenders: Vec<(Protocol, BenchmarkResult)>,
    pub winners: MetricWinners,
}

/// The full cross-protocol comparison for one benchmark session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub entries: Vec<ComparisonEntry>,
}

impl ComparisonReport {
    /// Build the comparison over the given per-protocol runs.
    ///
    /// Matching is by exact test name. Only names present in at least two
    /// runs produce an entry; fewer than two runs yield an empty report
    /// (a documented degenerate case, not an error). Entries keep the
    /// first-appearance order of test names across the runs; within one
    /// run, the first result carrying a name is the one compared.
    pub fn build(runs: &[ProtocolRun]) -> Self {
        if runs.len() < 2 {
            return Self { entries: Vec::new() };
        }

        let mut names: Vec<&str> = Vec::new();
        for run in runs {
            for result in &run.results {
                if !names.contains(&result.test_name.as_str()) {
                    names.push(&result.test_name);
                }
            }
        }

        let entries = names
            .into_iter()
            .filter_map(|name| {
                let contenders: Vec<(Protocol, BenchmarkResult)> = runs
                    .iter()
                    .filter_map(|run| {
                        run.results
                            .iter()
                            .find(|result| result.test_name == name)
                            .map(|result| (run.protocol, result.clone()))
                    })
                    .collect();
                if contenders.len() < 2 {
                    return None;
                }
                let winners = MetricWinners::select(&contenders);
                Some(ComparisonEntry {
                    test_name: name.to_string(),
                    contenders,
                    winners,
                })
            })
            .collect();

        Self { entries }
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn name(winner: Option<Protocol>) -> String {
            winner.map_or_else(|| "-".to_string(), |protocol| protocol.to_string())
        }

        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "CROSS-PROTOCOL COMPARISON")?;
        writeln!(f, "{}", "=".repeat(60))?;
        for entry in &self.entries {
            writeln!(f, "Test: {}", entry.test_name)?;
            for (protocol, result) in &entry.contenders {
                writeln!(
                    f,
                    "  {:<8} {:>14} | p50 {:>10} | p90 {:>10} | p99 {:>10} | {:>12}",
                    protocol.to_string(),
                    format_rate(result.ops_per_second),
                    format_latency_ms(result.latency_p50_ms),
                    format_latency_ms(result.latency_p90_ms),
                    format_latency_ms(result.latency_p99_ms),
                    format_throughput_kbps(result.throughput_kbps),
                )?;
            }
            let winners = &entry.winners;
            writeln!(
                f,
                "  winners: rate={}, p50={}, p90={}, p99={}, throughput={}",
                name(winners.ops_per_second),
                name(winners.latency_p50_ms),
                name(winners.latency_p90_ms),
                name(winners.latency_p99_ms),
                name(winners.throughput_kbps),
            )?;
        }
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::LatencyCollector;

    fn result(test_name: &str, ops: f64, p50: f64, throughput: f64) -> BenchmarkResult {
        let mut samples = LatencyCollector::new();
        let operations = if p50 > 0.0 {
            samples.record(p50);
            10
        } else {
            0
        };
        let mut result = BenchmarkResult::from_samples(test_name, operations, 1.0, samples, throughput);
        result.ops_per_second = ops;
        result
    }

    fn run(protocol: Protocol, results: Vec<BenchmarkResult>) -> ProtocolRun {
        ProtocolRun { protocol, results }
    }

    #[test]
    fn higher_rate_wins_operations_per_second() {
        let runs = vec![
            run(Protocol::WebApi, vec![result("t", 12.0, 5.0, 0.0)]),
            run(Protocol::OpcUa, vec![result("t", 8.5, 4.0, 0.0)]),
        ];
        let report = ComparisonReport::build(&runs);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].winners.ops_per_second, Some(Protocol::WebApi));
        assert_eq!(report.entries[0].winners.latency_p50_ms, Some(Protocol::OpcUa));
    }

    #[test]
    fn zero_latency_is_excluded_from_winner_selection() {
        // Protocol A collected no samples (all-zero latencies); B still wins
        // with a real measurement.
        let runs = vec![
            run(Protocol::WebApi, vec![result("t", 0.0, 0.0, 0.0)]),
            run(Protocol::S7, vec![result("t", 4.0, 3.2, 0.0)]),
        ];
        let report = ComparisonReport::build(&runs);
        assert_eq!(report.entries[0].winners.latency_p50_ms, Some(Protocol::S7));
        assert_eq!(report.entries[0].winners.ops_per_second, Some(Protocol::S7));
    }

    #[test]
    fn all_zero_metrics_leave_the_winner_undetermined() {
        let runs = vec![
            run(Protocol::WebApi, vec![result("t", 0.0, 0.0, 0.0)]),
            run(Protocol::S7, vec![result("t", 0.0, 0.0, 0.0)]),
        ];
        let report = ComparisonReport::build(&runs);
        assert_eq!(report.entries[0].winners, MetricWinners::default());
    }

    #[test]
    fn single_run_produces_no_entries() {
        let runs = vec![run(Protocol::WebApi, vec![result("t", 12.0, 5.0, 0.0)])];
        assert!(ComparisonReport::build(&runs).entries.is_empty());
        assert!(ComparisonReport::build(&[]).entries.is_empty());
    }

    #[test]
    fn unmatched_test_names_are_silently_excluded() {
        let runs = vec![
            run(
                Protocol::WebApi,
                vec![result("shared", 10.0, 5.0, 0.0), result("webapi_only", 3.0, 2.0, 0.0)],
            ),
            run(Protocol::OpcUa, vec![result("shared", 7.0, 4.0, 0.0)]),
        ];
        let report = ComparisonReport::build(&runs);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].test_name, "shared");
    }

    #[test]
    fn throughput_winner_comes_from_bulk_results() {
        let runs = vec![
            run(Protocol::WebApi, vec![result("bulk", 2.0, 50.0, 140.0)]),
            run(Protocol::S7, vec![result("bulk", 3.0, 30.0, 260.0)]),
        ];
        let report = ComparisonReport::build(&runs);
        assert_eq!(report.entries[0].winners.throughput_kbps, Some(Protocol::S7));
    }

    #[test]
    fn entries_keep_first_appearance_order() {
        let runs = vec![
            run(
                Protocol::WebApi,
                vec![result("a", 1.0, 1.0, 0.0), result("b", 1.0, 1.0, 0.0)],
            ),
            run(
                Protocol::OpcUa,
                vec![result("b", 1.0, 1.0, 0.0), result("a", 1.0, 1.0, 0.0)],
            ),
        ];
        let report = ComparisonReport::build(&runs);
        let names: Vec<&str> = report.entries.iter().map(|e| e.test_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
