//! Result records, persistence and report output.
//!
//! [`BenchmarkResult`] is the stable exchange format between the benchmark
//! engine and everything downstream: JSON export for external plot/report
//! tooling, the text report, and the cross-protocol comparator. Numbers
//! serialize as numbers and the timestamp as an ISO-8601 string, so the
//! record round-trips losslessly.

use crate::cli::Protocol;
use crate::comparison::ComparisonReport;
use crate::metrics::{LatencyCollector, LatencySummary};
use crate::utils::{format_latency_ms, format_rate, format_throughput_kbps};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

/// Immutable record describing one completed test run.
///
/// Created once per finished test call and never mutated afterwards; the
/// runner owns the result list and the comparator only reads it. When
/// `total_operations` is zero every latency and throughput field is zero,
/// a valid degenerate outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Identifier combining operation kind, data type and target rate.
    pub test_name: String,
    /// Operations that completed without error.
    pub total_operations: usize,
    /// Wall-clock span of the run, first scheduled operation to loop exit.
    pub duration_seconds: f64,
    pub ops_per_second: f64,
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    /// Only meaningful for bulk-data tests; 0 otherwise.
    #[serde(default)]
    pub throughput_kbps: f64,
    pub timestamp: DateTime<Utc>,
}

impl BenchmarkResult {
    /// Build a result from one test's collected samples. The timestamp is
    /// assigned here, at construction.
    pub fn from_samples(
        test_name: impl Into<String>,
        total_operations: usize,
        duration_seconds: f64,
        samples: LatencyCollector,
        throughput_kbps: f64,
    ) -> Self {
        Self::from_summary(
            test_name,
            total_operations,
            duration_seconds,
            samples.summarize(),
            throughput_kbps,
        )
    }

    /// Build a result from an already derived latency summary.
    pub fn from_summary(
        test_name: impl Into<String>,
        total_operations: usize,
        duration_seconds: f64,
        summary: LatencySummary,
        throughput_kbps: f64,
    ) -> Self {
        let ops_per_second = if total_operations == 0 || duration_seconds <= 0.0 {
            0.0
        } else {
            total_operations as f64 / duration_seconds
        };

        Self {
            test_name: test_name.into(),
            total_operations,
            duration_seconds,
            ops_per_second,
            latency_p50_ms: summary.p50_ms,
            latency_p90_ms: summary.p90_ms,
            latency_p99_ms: summary.p99_ms,
            throughput_kbps: if total_operations == 0 {
                0.0
            } else {
                throughput_kbps
            },
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "─".repeat(60))?;
        writeln!(f, "Results for {}", self.test_name)?;
        writeln!(f, "{}", "─".repeat(60))?;
        writeln!(f, "  Operations:   {}", self.total_operations)?;
        writeln!(f, "  Duration:     {:.2} s", self.duration_seconds)?;
        writeln!(f, "  Actual rate:  {}", format_rate(self.ops_per_second))?;
        writeln!(f, "  Latency p50:  {}", format_latency_ms(self.latency_p50_ms))?;
        writeln!(f, "  Latency p90:  {}", format_latency_ms(self.latency_p90_ms))?;
        writeln!(f, "  Latency p99:  {}", format_latency_ms(self.latency_p99_ms))?;
        if self.throughput_kbps > 0.0 {
            writeln!(
                f,
                "  Throughput:   {}",
                format_throughput_kbps(self.throughput_kbps)
            )?;
        }
        write!(f, "{}", "─".repeat(60))
    }
}

/// One protocol's ordered result list from a full scenario pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolRun {
    pub protocol: Protocol,
    pub results: Vec<BenchmarkResult>,
}

/// Host and version metadata exported next to the results, so runs stay
/// reproducible and comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
}

impl RunMetadata {
    pub fn collect() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            timestamp: Utc::now(),
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
        }
    }
}

/// Top-level structure of the JSON export.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsExport {
    pub metadata: RunMetadata,
    pub runs: Vec<ProtocolRun>,
}

/// Collects per-protocol runs and handles persistence and reporting.
#[derive(Default)]
pub struct ResultsManager {
    runs: Vec<ProtocolRun>,
}

impl ResultsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_run(&mut self, protocol: Protocol, results: Vec<BenchmarkResult>) {
        self.runs.push(ProtocolRun { protocol, results });
    }

    pub fn runs(&self) -> &[ProtocolRun] {
        &self.runs
    }

    /// Log a one-line-per-test summary for every protocol.
    pub fn log_summary(&self) {
        info!("{}", "=".repeat(60));
        info!("BENCHMARK SUMMARY");
        info!("{}", "=".repeat(60));
        for run in &self.runs {
            info!("{}:", run.protocol);
            for result in &run.results {
                info!(
                    "  {:<28} | rate {:>14} | p50 {:>10} | p99 {:>10}",
                    result.test_name,
                    format_rate(result.ops_per_second),
                    format_latency_ms(result.latency_p50_ms),
                    format_latency_ms(result.latency_p99_ms),
                );
            }
        }
    }

    /// Serialize all runs (plus run metadata) to a JSON file.
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let export = ResultsExport {
            metadata: RunMetadata::collect(),
            runs: self.runs.clone(),
        };
        let json = serde_json::to_string_pretty(&export)?;
        ensure_parent_dir(path)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write results to {}", path.display()))?;
        info!("results exported to {}", path.display());
        Ok(())
    }

    /// Write the human-readable report: per-protocol result blocks followed
    /// by the cross-protocol comparison.
    pub fn write_report(&self, path: &Path, comparison: &ComparisonReport) -> Result<()> {
        let mut report = String::new();
        let _ = writeln!(report, "PLC PROTOCOL BENCHMARK REPORT");
        let _ = writeln!(report, "{}", "=".repeat(60));
        let _ = writeln!(report);

        for run in &self.runs {
            let _ = writeln!(report, "Protocol: {}", run.protocol);
            for result in &run.results {
                let _ = writeln!(report, "{result}");
                let _ = writeln!(report, "  Timestamp:    {}", result.timestamp.to_rfc3339());
            }
            let _ = writeln!(report);
        }

        if comparison.entries.is_empty() {
            let _ = writeln!(
                report,
                "No cross-protocol comparison: results from at least two protocols are required."
            );
        } else {
            let _ = writeln!(report, "{comparison}");
        }

        ensure_parent_dir(path)?;
        fs::write(path, report)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!("report written to {}", path.display());
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}
