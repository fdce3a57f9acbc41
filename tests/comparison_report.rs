//! End-to-end comparison and persistence tests: two protocols benchmarked
//! through the public runner API, compared, exported and re-read.

mod common;

use common::ScriptedAdapter;
use plc_benchmark::adapters::ProtocolAdapter;
use plc_benchmark::benchmark::{BenchmarkRunner, CancelFlag, OperationKind, SingleOpSpec, ValuePolicy};
use plc_benchmark::cli::Protocol;
use plc_benchmark::comparison::ComparisonReport;
use plc_benchmark::results::{BenchmarkResult, ResultsExport, ResultsManager};
use std::time::Duration;

fn spec() -> SingleOpSpec {
    SingleOpSpec {
        kind: OperationKind::Write,
        target_rate: 10,
        duration: Duration::from_secs(1),
        variable: "\"PerformanceData\".ToServer.bool00".to_string(),
        policy: ValuePolicy::AlternatingBool,
    }
}

async fn benchmark_one(
    protocol: Protocol,
    latency_ms: f64,
    failures: &[u64],
) -> anyhow::Result<Vec<BenchmarkResult>> {
    let (mut adapter, _log) = ScriptedAdapter::new(protocol);
    adapter.reported_latency_ms = Some(latency_ms);
    adapter.failures = failures.iter().copied().collect();
    adapter.connect().await?;

    let mut runner = BenchmarkRunner::new(Box::new(adapter), CancelFlag::new());
    runner.run_single_ops(&spec()).await?;

    let (mut adapter, results) = runner.into_parts();
    adapter.disconnect().await?;
    Ok(results)
}

#[tokio::test(start_paused = true)]
async fn matched_tests_pick_per_metric_winners() -> anyhow::Result<()> {
    // Web API: every operation succeeds, but each one is slow.
    let web_api = benchmark_one(Protocol::WebApi, 5.0, &[]).await?;
    // OPC UA: lower latency, two failed operations.
    let opc_ua = benchmark_one(Protocol::OpcUa, 3.0, &[2, 4]).await?;

    let mut manager = ResultsManager::new();
    manager.add_run(Protocol::WebApi, web_api);
    manager.add_run(Protocol::OpcUa, opc_ua);

    let report = ComparisonReport::build(manager.runs());
    assert_eq!(report.entries.len(), 1);

    let entry = &report.entries[0];
    assert_eq!(entry.test_name, "single_write_bool_10ops");
    assert_eq!(entry.contenders.len(), 2);
    // 11 completed operations beat 9.
    assert_eq!(entry.winners.ops_per_second, Some(Protocol::WebApi));
    // 3ms beats 5ms on every percentile.
    assert_eq!(entry.winners.latency_p50_ms, Some(Protocol::OpcUa));
    assert_eq!(entry.winners.latency_p90_ms, Some(Protocol::OpcUa));
    assert_eq!(entry.winners.latency_p99_ms, Some(Protocol::OpcUa));
    // Single-write tests carry no throughput.
    assert_eq!(entry.winners.throughput_kbps, None);

    let rendered = report.to_string();
    assert!(rendered.contains("single_write_bool_10ops"));
    assert!(rendered.contains("p50"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_single_protocol_produces_no_comparison() -> anyhow::Result<()> {
    let results = benchmark_one(Protocol::S7, 1.0, &[]).await?;

    let mut manager = ResultsManager::new();
    manager.add_run(Protocol::S7, results);

    let report = ComparisonReport::build(manager.runs());
    assert!(report.entries.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exported_results_round_trip_losslessly() -> anyhow::Result<()> {
    let web_api = benchmark_one(Protocol::WebApi, 5.0, &[]).await?;
    let s7 = benchmark_one(Protocol::S7, 2.0, &[]).await?;

    let mut manager = ResultsManager::new();
    manager.add_run(Protocol::WebApi, web_api.clone());
    manager.add_run(Protocol::S7, s7);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("results").join("benchmark_results.json");
    manager.export_json(&path)?;

    let restored: ResultsExport = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(restored.runs.len(), 2);
    assert_eq!(restored.runs[0].protocol, Protocol::WebApi);
    assert_eq!(restored.runs[0].results, web_api);
    assert!(restored.metadata.cpu_cores > 0);

    // The report file renders next to it without error.
    let report_path = dir.path().join("results").join("benchmark_report.txt");
    let comparison = ComparisonReport::build(manager.runs());
    manager.write_report(&report_path, &comparison)?;
    let report = std::fs::read_to_string(&report_path)?;
    assert!(report.contains("CROSS-PROTOCOL COMPARISON"));
    assert!(report.contains("single_write_bool_10ops"));
    Ok(())
}
