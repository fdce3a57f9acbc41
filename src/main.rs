//! Command-line entry point for the PLC protocol benchmark suite.
//!
//! Orchestration order: parse arguments, install logging and the Ctrl-C
//! cancellation hook, then benchmark each selected protocol strictly
//! sequentially; the controller and network path are shared, so parallel
//! runs would contaminate the latency measurements. Afterwards the collected
//! runs are summarized, compared across protocols, and persisted as JSON
//! plus a text report.
//!
//! A connection failure aborts the affected protocol's run with no results;
//! with `--continue-on-error` the remaining protocols still execute.
//! Ctrl-C is not an error: the current operation finishes, partial samples
//! are kept, and reports are still written.

use anyhow::Result;
use clap::Parser;
use plc_benchmark::{
    adapters::{AdapterConfig, AdapterFactory},
    benchmark::{BenchmarkRunner, BulkWriteSpec, CancelFlag, OperationKind, SingleOpSpec},
    cli::{Args, Protocol},
    comparison::ComparisonReport,
    logging,
    results::{BenchmarkResult, ResultsManager},
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(args.log_file.as_deref())?;

    info!("PLC Protocol Benchmark Suite v{}", plc_benchmark::VERSION);

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing the current operation and keeping partial results");
                cancel.cancel();
            }
        });
    }

    let adapter_config = AdapterConfig::from(&args);
    let protocols = Protocol::expand_all(args.protocols.clone());
    let mut manager = ResultsManager::new();

    for protocol in protocols {
        if cancel.is_cancelled() {
            break;
        }
        info!("benchmarking {protocol}");
        match run_protocol(&args, &adapter_config, protocol, &cancel).await {
            Ok(results) => manager.add_run(protocol, results),
            Err(err) => {
                error!("benchmark failed for {protocol}: {err:#}");
                if !args.continue_on_error {
                    return Err(err);
                }
            }
        }
    }

    manager.log_summary();

    let comparison = ComparisonReport::build(manager.runs());
    if comparison.entries.is_empty() {
        info!("comparison skipped: results from at least two protocols are required");
    } else {
        info!("{comparison}");
    }

    manager.export_json(&args.output_file)?;
    manager.write_report(&args.report_file, &comparison)?;

    info!("done");
    Ok(())
}

/// Run the full scenario set for one protocol and return its results.
///
/// The adapter is connected before the runner takes ownership and is
/// disconnected afterwards even when a scenario fails.
async fn run_protocol(
    args: &Args,
    config: &AdapterConfig,
    protocol: Protocol,
    cancel: &CancelFlag,
) -> Result<Vec<BenchmarkResult>> {
    let mut adapter = AdapterFactory::create(protocol, config)?;
    adapter.connect().await?;

    let mut runner = BenchmarkRunner::new(adapter, cancel.clone());
    let outcome = run_scenarios(args, &mut runner, cancel).await;

    let (mut adapter, results) = runner.into_parts();
    if let Err(err) = adapter.disconnect().await {
        warn!("disconnect failed for {protocol}: {err:#}");
    }

    outcome?;
    Ok(results)
}

async fn run_scenarios(
    args: &Args,
    runner: &mut BenchmarkRunner,
    cancel: &CancelFlag,
) -> Result<()> {
    for &rate in &args.rates {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let spec = SingleOpSpec {
            kind: OperationKind::Write,
            target_rate: rate,
            duration: args.duration,
            variable: args.variable.clone(),
            policy: args.value_policy.to_policy(),
        };
        runner.run_single_ops(&spec).await?;
    }

    if args.include_reads {
        for &rate in &args.rates {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let spec = SingleOpSpec {
                kind: OperationKind::Read,
                target_rate: rate,
                duration: args.duration,
                variable: args.variable.clone(),
                policy: args.value_policy.to_policy(),
            };
            runner.run_single_ops(&spec).await?;
        }
    }

    if !args.skip_bulk && !cancel.is_cancelled() {
        runner
            .run_bulk_writes(&BulkWriteSpec {
                repetitions: args.bulk_repetitions,
                element_count: args.bulk_elements,
            })
            .await?;
    }

    Ok(())
}
