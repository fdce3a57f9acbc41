//! Protocol adapter contract and shared session plumbing.
//!
//! Every protocol variant implements [`ProtocolAdapter`]: open a session,
//! perform timed single writes, reads and bulk writes, and release the
//! session again. The benchmark engine only ever sees the trait object, so
//! the scheduler and statistics stay agnostic of which protocol is being
//! exercised.
//!
//! Latency semantics are part of the contract: the `latency_ms` returned by
//! an operation covers the transport exchange only, never value generation
//! or scheduling overhead. For bulk writes it spans the entire batch,
//! however many transport calls an adapter needs internally.

use crate::cli::Protocol;
use crate::value::PlcValue;
use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod opc_ua;
pub mod s7;
pub mod web_api;

pub use opc_ua::OpcUaAdapter;
pub use s7::S7Adapter;
pub use web_api::WebApiAdapter;

/// Error taxonomy for adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Transport or authentication failure while establishing the session.
    /// Fatal: the benchmark run for this adapter aborts with no results.
    #[error("connection failed: {0}")]
    Connection(anyhow::Error),

    /// An operation was attempted before `connect` succeeded. Programmer
    /// error, fatal.
    #[error("adapter is not connected")]
    NotConnected,

    /// A single transport operation failed after the session was up. The
    /// scheduler skips the operation and keeps the run alive.
    #[error("protocol error: {0}")]
    Protocol(anyhow::Error),
}

impl AdapterError {
    /// Whether this error ends the benchmark run for the adapter.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AdapterError::Protocol(_))
    }
}

/// Response envelope of one adapter operation plus the wall-clock latency
/// measured strictly around the transport exchange.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub detail: serde_json::Value,
    pub latency_ms: f64,
}

/// Capability set implemented by each protocol variant.
///
/// Adapters own their session state exclusively (`Idle -> Connected ->
/// Idle`); they are not designed for concurrent use, and the runner that
/// holds the open connection is its sole user.
#[async_trait]
pub trait ProtocolAdapter: Send {
    /// Establish transport and authentication state. Called once before any
    /// other operation.
    async fn connect(&mut self) -> Result<(), AdapterError>;

    /// Release the session. Safe to call when never connected or already
    /// disconnected; that case is a no-op, not an error.
    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    /// Write one scalar value to `variable`.
    async fn write(&mut self, variable: &str, value: &PlcValue)
        -> Result<AdapterResponse, AdapterError>;

    /// Read one scalar value from `variable`.
    async fn read(&mut self, variable: &str) -> Result<AdapterResponse, AdapterError>;

    /// Write an ordered batch of values as one logical operation.
    ///
    /// Adapters may decompose the batch into several transport calls; either
    /// all elements are attempted or the call fails before any transport
    /// activity. The returned latency spans the whole batch.
    async fn write_bulk(&mut self, values: &[PlcValue]) -> Result<AdapterResponse, AdapterError>;

    /// Protocol variant implemented by this adapter.
    fn protocol(&self) -> Protocol;
}

/// Construction parameters for the concrete adapters.
///
/// Populated by the CLI/environment layer and passed opaquely into
/// [`AdapterFactory::create`]; the benchmark core never inspects it.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub web_api_url: String,
    pub web_api_user: String,
    pub web_api_password: String,
    pub web_api_accept_invalid_certs: bool,
    pub opc_ua_url: String,
    pub opc_ua_namespace: u16,
    pub s7_host: String,
    pub s7_port: u16,
    pub s7_rack: u16,
    pub s7_slot: u16,
    pub s7_db_number: u16,
    pub s7_scalar_offset: u32,
    pub s7_bulk_offset: u32,
    /// Array variable targeted by bulk writes (Web API and OPC UA).
    pub bulk_variable: String,
    pub request_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            web_api_url: crate::defaults::WEB_API_URL.to_string(),
            web_api_user: "benchmark".to_string(),
            web_api_password: String::new(),
            web_api_accept_invalid_certs: true,
            opc_ua_url: crate::defaults::OPC_UA_URL.to_string(),
            opc_ua_namespace: 3,
            s7_host: crate::defaults::S7_HOST.to_string(),
            s7_port: 102,
            s7_rack: 0,
            s7_slot: 1,
            s7_db_number: 7,
            s7_scalar_offset: 0,
            s7_bulk_offset: 136,
            bulk_variable: crate::defaults::BULK_VARIABLE.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Factory over the closed set of protocol variants.
pub struct AdapterFactory;

impl AdapterFactory {
    /// Create an adapter instance for `protocol`. The instance is idle;
    /// callers connect it before handing it to a runner.
    pub fn create(protocol: Protocol, config: &AdapterConfig) -> Result<Box<dyn ProtocolAdapter>> {
        match protocol {
            Protocol::WebApi => Ok(Box::new(WebApiAdapter::new(config)?)),
            Protocol::OpcUa => Ok(Box::new(OpcUaAdapter::new(config))),
            Protocol::S7 => Ok(Box::new(S7Adapter::new(config))),
            Protocol::All => Err(anyhow::anyhow!(
                "'all' must be expanded before adapter creation"
            )),
        }
    }
}

/// Milliseconds elapsed since `started`, for latency reporting.
pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_are_recoverable_the_rest_fatal() {
        assert!(AdapterError::Connection(anyhow::anyhow!("refused")).is_fatal());
        assert!(AdapterError::NotConnected.is_fatal());
        assert!(!AdapterError::Protocol(anyhow::anyhow!("bad status")).is_fatal());
    }

    #[test]
    fn factory_rejects_the_all_pseudo_variant() {
        let config = AdapterConfig::default();
        assert!(AdapterFactory::create(Protocol::All, &config).is_err());
    }

    #[test]
    fn factory_builds_each_concrete_variant() {
        let config = AdapterConfig::default();
        for protocol in [Protocol::WebApi, Protocol::OpcUa, Protocol::S7] {
            let adapter = AdapterFactory::create(protocol, &config).unwrap();
            assert_eq!(adapter.protocol(), protocol);
        }
    }

    #[test]
    fn default_config_matches_controller_layout() {
        let config = AdapterConfig::default();
        assert_eq!(config.s7_port, 102);
        assert_eq!(config.s7_rack, 0);
        assert_eq!(config.s7_slot, 1);
        assert_eq!(config.opc_ua_namespace, 3);
        assert!(config.web_api_accept_invalid_certs);
    }
}
