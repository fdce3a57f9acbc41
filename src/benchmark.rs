//! Benchmark execution engine.
//!
//! The runner drives timed scenarios against exactly one protocol adapter
//! and produces a [`BenchmarkResult`] per scenario. Two scenario shapes
//! exist:
//!
//! - **Rate-paced single operations** (`run_single_ops`): operations are
//!   issued on an absolute schedule. The next due time always advances by
//!   exactly `1 / target_rate`, independent of how long the previous
//!   operation took. A slow operation shortens or eliminates the wait
//!   before the next one but never shifts the schedule, so pacing never
//!   accumulates drift.
//! - **Bulk repetitions** (`run_bulk_writes`): a fixed generated payload is
//!   written back to back, with throughput derived from the serialized
//!   payload size and the count of successful repetitions.
//!
//! Failure isolation: a failed operation is logged and skipped. It adds no
//! latency sample, does not count toward `total_operations`, and is never
//! retried; the loop continues at the originally scheduled slots. Only
//! connection-level errors abort a run.
//!
//! Cancellation is cooperative. The [`CancelFlag`] is checked at the top of
//! every scheduling iteration; when set, the loop exits cleanly and
//! statistics are computed over whatever samples exist. Zero samples is a
//! valid outcome.

use crate::adapters::ProtocolAdapter;
use crate::metrics::LatencyCollector;
use crate::results::BenchmarkResult;
use crate::value::{bulk_payload, serialized_size, PlcValue};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared between the runner and the host
/// environment's interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scheduler lifecycle. A runner is `Running` only while inside a test
/// call; once a result has been built it returns to `Idle`, so the same
/// instance can execute further scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
    Stopped,
}

/// Which adapter operation a rate-paced scenario exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Write,
    Read,
}

impl OperationKind {
    fn label(self) -> &'static str {
        match self {
            OperationKind::Write => "write",
            OperationKind::Read => "read",
        }
    }
}

/// Value generation policy for single-write scenarios.
#[derive(Debug, Clone)]
pub enum ValuePolicy {
    /// Toggle between `true` and `false` on every step.
    AlternatingBool,
    /// Step through `0..bound`, wrapping at the bound.
    IncrementingInt { bound: i64 },
    /// Multiples of `scale`.
    IncrementingReal { scale: f64 },
}

impl ValuePolicy {
    /// Value for the `step`-th scheduled operation.
    pub fn value_for(&self, step: u64) -> PlcValue {
        match self {
            ValuePolicy::AlternatingBool => PlcValue::Bool(step % 2 == 0),
            ValuePolicy::IncrementingInt { bound } => {
                let step = step as i64;
                PlcValue::Int(if *bound > 0 { step % bound } else { step })
            }
            ValuePolicy::IncrementingReal { scale } => PlcValue::Real(step as f64 * scale),
        }
    }

    /// Data-type tag used in test identifiers.
    pub fn kind(&self) -> &'static str {
        match self {
            ValuePolicy::AlternatingBool => "bool",
            ValuePolicy::IncrementingInt { .. } => "int",
            ValuePolicy::IncrementingReal { .. } => "real",
        }
    }
}

/// Parameters for one rate-paced single-operation scenario.
#[derive(Debug, Clone)]
pub struct SingleOpSpec {
    pub kind: OperationKind,
    /// Target operation rate in operations per second; must be positive.
    pub target_rate: u32,
    pub duration: Duration,
    pub variable: String,
    pub policy: ValuePolicy,
}

impl SingleOpSpec {
    /// Test identifier combining operation kind, data type and target rate.
    pub fn test_name(&self) -> String {
        match self.kind {
            OperationKind::Write => format!(
                "single_write_{}_{}ops",
                self.policy.kind(),
                self.target_rate
            ),
            OperationKind::Read => format!("single_read_{}ops", self.target_rate),
        }
    }
}

/// Parameters for the bulk repetition scenario.
#[derive(Debug, Clone)]
pub struct BulkWriteSpec {
    pub repetitions: usize,
    pub element_count: usize,
}

impl BulkWriteSpec {
    pub fn test_name(&self) -> String {
        format!("bulk_write_{}_elements", self.element_count)
    }
}

/// Drives timed scenarios against one protocol adapter.
///
/// The runner takes exclusive ownership of a connected adapter; adapters
/// are not designed for concurrent use and the open connection belongs to
/// the runner until [`BenchmarkRunner::into_parts`] hands it back.
pub struct BenchmarkRunner {
    adapter: Box<dyn ProtocolAdapter>,
    results: Vec<BenchmarkResult>,
    state: RunnerState,
    cancel: CancelFlag,
}

impl BenchmarkRunner {
    pub fn new(adapter: Box<dyn ProtocolAdapter>, cancel: CancelFlag) -> Self {
        Self {
            adapter,
            results: Vec::new(),
            state: RunnerState::Idle,
            cancel,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Results of every scenario executed so far, in execution order.
    pub fn results(&self) -> &[BenchmarkResult] {
        &self.results
    }

    /// Release the adapter and hand back the accumulated results.
    pub fn into_parts(self) -> (Box<dyn ProtocolAdapter>, Vec<BenchmarkResult>) {
        (self.adapter, self.results)
    }

    /// Execute one rate-paced single-operation scenario.
    pub async fn run_single_ops(&mut self, spec: &SingleOpSpec) -> Result<BenchmarkResult> {
        anyhow::ensure!(spec.target_rate > 0, "target rate must be positive");
        let test_name = spec.test_name();
        info!(
            "starting {test_name}: {} ops/s for {:?} against {}",
            spec.target_rate, spec.duration, spec.variable
        );

        let interval = Duration::from_secs_f64(1.0 / f64::from(spec.target_rate));
        let mut latencies = LatencyCollector::new();
        let mut completed: usize = 0;
        let mut failed: usize = 0;
        let mut step: u64 = 0;

        self.state = RunnerState::Running;
        let started = Instant::now();
        // Absolute schedule: `due` advances by exactly one interval per
        // step. If an operation overruns the interval, the next iteration
        // proceeds immediately; the wait below is the only suspension point.
        let mut due = started;

        while started.elapsed() < spec.duration {
            if self.cancel.is_cancelled() {
                info!("{test_name}: cancelled, keeping partial samples");
                break;
            }

            let now = Instant::now();
            if now < due {
                tokio::time::sleep_until(due).await;
            }

            let outcome = match spec.kind {
                OperationKind::Write => {
                    let value = spec.policy.value_for(step);
                    self.adapter.write(&spec.variable, &value).await
                }
                OperationKind::Read => self.adapter.read(&spec.variable).await,
            };

            match outcome {
                Ok(response) => {
                    latencies.record(response.latency_ms);
                    completed += 1;
                }
                Err(error) if error.is_fatal() => {
                    self.state = RunnerState::Idle;
                    return Err(error.into());
                }
                Err(error) => {
                    failed += 1;
                    warn!("{test_name}: operation failed, sample skipped: {error:#}");
                }
            }

            step += 1;
            due += interval;
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.state = RunnerState::Stopped;
        if failed > 0 {
            warn!("{test_name}: {failed} operation(s) failed and were excluded");
        }

        let summary = latencies.summarize();
        debug!(
            "{test_name}: latency min/mean/max {:.2}/{:.2}/{:.2} ms, stddev {:.2} ms over {} samples",
            summary.min_ms, summary.mean_ms, summary.max_ms, summary.std_dev_ms, summary.samples
        );

        let result = BenchmarkResult::from_summary(test_name, completed, elapsed, summary, 0.0);
        info!("{result}");
        self.results.push(result.clone());
        self.state = RunnerState::Idle;
        Ok(result)
    }

    /// Execute the bulk repetition scenario.
    pub async fn run_bulk_writes(&mut self, spec: &BulkWriteSpec) -> Result<BenchmarkResult> {
        let test_name = spec.test_name();
        info!(
            "starting {test_name}: {} repetitions of {} elements",
            spec.repetitions, spec.element_count
        );

        let payload = bulk_payload(spec.element_count);
        // Serialized size is measured once and reused for every repetition.
        let payload_bytes = serialized_size(&payload)?;
        debug!("{test_name}: payload is {payload_bytes} bytes serialized");

        let mut latencies = LatencyCollector::new();
        let mut completed: usize = 0;

        self.state = RunnerState::Running;
        let started = Instant::now();

        for repetition in 1..=spec.repetitions {
            if self.cancel.is_cancelled() {
                info!("{test_name}: cancelled, keeping partial samples");
                break;
            }
            match self.adapter.write_bulk(&payload).await {
                Ok(response) => {
                    debug!(
                        "{test_name}: repetition {repetition}/{}: {:.2} ms",
                        spec.repetitions, response.latency_ms
                    );
                    latencies.record(response.latency_ms);
                    completed += 1;
                }
                Err(error) if error.is_fatal() => {
                    self.state = RunnerState::Idle;
                    return Err(error.into());
                }
                Err(error) => {
                    warn!("{test_name}: repetition {repetition} failed, skipped: {error:#}");
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.state = RunnerState::Stopped;

        let throughput_kbps = if completed == 0 || elapsed <= 0.0 {
            0.0
        } else {
            (payload_bytes * completed) as f64 / 1024.0 / elapsed
        };

        let summary = latencies.summarize();
        debug!(
            "{test_name}: latency min/mean/max {:.2}/{:.2}/{:.2} ms over {} repetitions",
            summary.min_ms, summary.mean_ms, summary.max_ms, summary.samples
        );

        let result =
            BenchmarkResult::from_summary(test_name, completed, elapsed, summary, throughput_kbps);
        info!("{result}");
        self.results.push(result.clone());
        self.state = RunnerState::Idle;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternating_bool_toggles_each_step() {
        let policy = ValuePolicy::AlternatingBool;
        assert_eq!(policy.value_for(0), PlcValue::Bool(true));
        assert_eq!(policy.value_for(1), PlcValue::Bool(false));
        assert_eq!(policy.value_for(2), PlcValue::Bool(true));
    }

    #[test]
    fn incrementing_int_wraps_at_the_bound() {
        let policy = ValuePolicy::IncrementingInt { bound: 3 };
        let values: Vec<PlcValue> = (0..5).map(|step| policy.value_for(step)).collect();
        assert_eq!(
            values,
            vec![
                PlcValue::Int(0),
                PlcValue::Int(1),
                PlcValue::Int(2),
                PlcValue::Int(0),
                PlcValue::Int(1),
            ]
        );
    }

    #[test]
    fn incrementing_real_scales_the_step() {
        let policy = ValuePolicy::IncrementingReal { scale: 1.5 };
        assert_eq!(policy.value_for(4), PlcValue::Real(6.0));
    }

    #[test]
    fn test_names_identify_kind_type_and_rate() {
        let spec = SingleOpSpec {
            kind: OperationKind::Write,
            target_rate: 10,
            duration: Duration::from_secs(10),
            variable: "v".to_string(),
            policy: ValuePolicy::AlternatingBool,
        };
        assert_eq!(spec.test_name(), "single_write_bool_10ops");

        let spec = SingleOpSpec {
            kind: OperationKind::Read,
            ..spec
        };
        assert_eq!(spec.test_name(), "single_read_10ops");

        let bulk = BulkWriteSpec {
            repetitions: 10,
            element_count: 1000,
        };
        assert_eq!(bulk.test_name(), "bulk_write_1000_elements");
    }

    #[test]
    fn cancel_flag_is_sticky_and_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
