//! # PLC Protocol Benchmark Suite
//!
//! Measures and compares the write performance (latency, achieved
//! throughput) of an industrial controller across three interchangeable
//! protocols: the HTTP JSON-RPC Web API, OPC UA, and the native S7
//! protocol.
//!
//! ## Architecture
//!
//! - `adapters`: the protocol capability contract and the three concrete
//!   adapters; everything above it is protocol-agnostic
//! - `benchmark`: the rate-paced scheduler and bulk benchmark engine
//! - `metrics`: latency sample collection and percentile statistics
//! - `results`: result records, JSON persistence and the text report
//! - `comparison`: the cross-protocol comparator and winner tables
//! - `cli`: command-line parsing and configuration
//! - `value`: the shared controller value model and duration-literal rule
//!
//! Benchmarks run strictly sequentially against the shared physical target:
//! one scenario at a time, one protocol at a time, so measurements do not
//! interfere with each other.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use plc_benchmark::{
//!     AdapterConfig, AdapterFactory, BenchmarkRunner, CancelFlag, Protocol, ProtocolAdapter,
//! };
//! use plc_benchmark::benchmark::{OperationKind, SingleOpSpec, ValuePolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AdapterConfig::default();
//!     let mut adapter = AdapterFactory::create(Protocol::WebApi, &config)?;
//!     adapter.connect().await?;
//!
//!     let mut runner = BenchmarkRunner::new(adapter, CancelFlag::new());
//!     let result = runner
//!         .run_single_ops(&SingleOpSpec {
//!             kind: OperationKind::Write,
//!             target_rate: 10,
//!             duration: Duration::from_secs(10),
//!             variable: plc_benchmark::defaults::SCALAR_VARIABLE.to_string(),
//!             policy: ValuePolicy::AlternatingBool,
//!         })
//!         .await?;
//!     println!("p50: {:.2} ms", result.latency_p50_ms);
//!
//!     let (mut adapter, _results) = runner.into_parts();
//!     adapter.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod benchmark;
pub mod cli;
pub mod comparison;
pub mod logging;
pub mod metrics;
pub mod results;
pub mod utils;
pub mod value;

pub use adapters::{AdapterConfig, AdapterError, AdapterFactory, AdapterResponse, ProtocolAdapter};
pub use benchmark::{BenchmarkRunner, BulkWriteSpec, CancelFlag, SingleOpSpec};
pub use cli::{Args, Protocol};
pub use comparison::ComparisonReport;
pub use metrics::{LatencyCollector, LatencySummary};
pub use results::{BenchmarkResult, ProtocolRun, ResultsManager};
pub use value::PlcValue;

/// Crate version, recorded in exported results for reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values shared between the CLI and the library.
pub mod defaults {
    /// Target rates for the single-operation scenarios, ops/second.
    pub const TARGET_RATES: [u32; 3] = [1, 5, 10];

    /// Repetitions of the bulk-write scenario.
    pub const BULK_REPETITIONS: usize = 10;

    /// Elements in the generated bulk payload. 1000 LTime values cover the
    /// controller's bulk array and give the batch a meaningful byte size.
    pub const BULK_ELEMENTS: usize = 1000;

    /// Scalar variable targeted by single-operation scenarios.
    pub const SCALAR_VARIABLE: &str = "\"PerformanceData\".ToServer.bool00";

    /// Array variable targeted by bulk writes.
    pub const BULK_VARIABLE: &str = "\"PerformanceData\".PlcData.BulkData";

    /// Default JSON results path.
    pub const OUTPUT_FILE: &str = "results/benchmark_results.json";

    /// Default text report path.
    pub const REPORT_FILE: &str = "results/benchmark_report.txt";

    pub const WEB_API_URL: &str = "https://192.168.10.61/api/jsonrpc";
    pub const OPC_UA_URL: &str = "opc.tcp://192.168.10.61:4840";
    pub const S7_HOST: &str = "192.168.10.61";
}
