//! Scripted in-memory adapter for scheduler and comparison tests.
#![allow(dead_code)]

use async_trait::async_trait;
use plc_benchmark::adapters::{AdapterError, AdapterResponse, ProtocolAdapter};
use plc_benchmark::cli::Protocol;
use plc_benchmark::value::PlcValue;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Everything the scripted adapter observed, for later assertions.
#[derive(Default)]
pub struct CallLog {
    /// Instant of every operation call, in call order.
    pub call_times: Vec<Instant>,
    pub writes: Vec<(String, PlcValue)>,
    pub reads: Vec<String>,
    pub bulk_batches: Vec<Vec<PlcValue>>,
    pub calls: u64,
}

/// In-memory [`ProtocolAdapter`] with scripted delays and failures.
///
/// Operation delays are simulated with `tokio::time::sleep`, so tests run
/// under `start_paused` virtual time and stay fully deterministic.
pub struct ScriptedAdapter {
    pub protocol: Protocol,
    /// Simulated transport time per call index (0-based); missing entries
    /// fall back to `default_delay`.
    pub delays: Vec<Duration>,
    pub default_delay: Duration,
    /// Fixed latency to report; defaults to the simulated delay.
    pub reported_latency_ms: Option<f64>,
    /// 1-based call numbers that fail with a protocol error.
    pub failures: HashSet<u64>,
    connected: bool,
    log: Arc<Mutex<CallLog>>,
}

impl ScriptedAdapter {
    pub fn new(protocol: Protocol) -> (Self, Arc<Mutex<CallLog>>) {
        let log = Arc::new(Mutex::new(CallLog::default()));
        (
            Self {
                protocol,
                delays: Vec::new(),
                default_delay: Duration::ZERO,
                reported_latency_ms: None,
                failures: HashSet::new(),
                connected: false,
                log: log.clone(),
            },
            log,
        )
    }

    /// Record the call, simulate its transport time, then either fail or
    /// report the scripted latency.
    async fn operate(&mut self) -> Result<f64, AdapterError> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        let call_number = {
            let mut log = self.log.lock().unwrap();
            log.calls += 1;
            log.call_times.push(Instant::now());
            log.calls
        };

        let delay = self
            .delays
            .get(call_number as usize - 1)
            .copied()
            .unwrap_or(self.default_delay);
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        if self.failures.contains(&call_number) {
            return Err(AdapterError::Protocol(anyhow::anyhow!(
                "scripted failure on call {call_number}"
            )));
        }
        Ok(self
            .reported_latency_ms
            .unwrap_or(delay.as_secs_f64() * 1000.0))
    }
}

#[async_trait]
impl ProtocolAdapter for ScriptedAdapter {
    async fn connect(&mut self) -> Result<(), AdapterError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.connected = false;
        Ok(())
    }

    async fn write(
        &mut self,
        variable: &str,
        value: &PlcValue,
    ) -> Result<AdapterResponse, AdapterError> {
        if self.connected {
            let mut log = self.log.lock().unwrap();
            log.writes.push((variable.to_string(), value.clone()));
        }
        let latency_ms = self.operate().await?;
        Ok(AdapterResponse {
            detail: json!({"success": true}),
            latency_ms,
        })
    }

    async fn read(&mut self, variable: &str) -> Result<AdapterResponse, AdapterError> {
        if self.connected {
            self.log.lock().unwrap().reads.push(variable.to_string());
        }
        let latency_ms = self.operate().await?;
        Ok(AdapterResponse {
            detail: json!({"success": true, "value": false}),
            latency_ms,
        })
    }

    async fn write_bulk(&mut self, values: &[PlcValue]) -> Result<AdapterResponse, AdapterError> {
        if self.connected {
            self.log.lock().unwrap().bulk_batches.push(values.to_vec());
        }
        let latency_ms = self.operate().await?;
        Ok(AdapterResponse {
            detail: json!({"success": true, "elements_written": values.len()}),
            latency_ms,
        })
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }
}

/// Offsets of every logged call relative to `start`, in milliseconds.
pub fn call_offsets_ms(log: &Arc<Mutex<CallLog>>, start: Instant) -> Vec<u128> {
    log.lock()
        .unwrap()
        .call_times
        .iter()
        .map(|instant| instant.duration_since(start).as_millis())
        .collect()
}
