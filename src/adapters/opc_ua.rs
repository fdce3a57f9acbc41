//! OPC UA adapter.
//!
//! Wraps an OPC UA client session (anonymous identity, security policy
//! None, matching the controller's open endpoint). Variables are addressed
//! as string-identifier nodes in a configurable namespace, e.g.
//! `ns=3;s="PerformanceData".ToServer.bool00`.
//!
//! The underlying client exposes blocking service calls; they are bridged
//! with `tokio::task::block_in_place` so the timed exchange still blocks
//! the benchmark loop exactly like the other transports do.

use super::{elapsed_ms, AdapterConfig, AdapterError, AdapterResponse, ProtocolAdapter};
use crate::cli::Protocol;
use crate::value::PlcValue;
use anyhow::anyhow;
use async_trait::async_trait;
use opcua::client::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

type SharedSession = Arc<opcua::sync::RwLock<Session>>;

pub struct OpcUaAdapter {
    endpoint_url: String,
    namespace: u16,
    bulk_variable: String,
    // The client owns the connection machinery; it must outlive the session.
    client: Option<Client>,
    session: Option<SharedSession>,
}

impl OpcUaAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            endpoint_url: config.opc_ua_url.clone(),
            namespace: config.opc_ua_namespace,
            bulk_variable: config.bulk_variable.clone(),
            client: None,
            session: None,
        }
    }

    fn session(&self) -> Result<SharedSession, AdapterError> {
        self.session.clone().ok_or(AdapterError::NotConnected)
    }

    fn node(&self, variable: &str) -> NodeId {
        NodeId::new(self.namespace, variable.to_string())
    }

    /// Wire variant for a scalar. Integers and duration literals both map
    /// to Int64 (the LTime representation), so `LT#<n>ns` and the raw
    /// integer `n` produce identical payloads.
    fn variant(value: &PlcValue) -> Variant {
        if let Some(nanoseconds) = value.as_nanoseconds() {
            return Variant::Int64(nanoseconds);
        }
        match value {
            PlcValue::Bool(flag) => Variant::Boolean(*flag),
            PlcValue::Real(real) => Variant::Double(*real),
            PlcValue::Text(text) => Variant::String(UAString::from(text.as_str())),
            // Unreachable: integers resolve through as_nanoseconds above.
            PlcValue::Int(n) => Variant::Int64(*n),
        }
    }

    fn write_value(node: NodeId, value: &PlcValue) -> WriteValue {
        WriteValue {
            node_id: node,
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            value: DataValue::value_only(Self::variant(value)),
        }
    }

    /// Submit one Write-service call and verify every item was accepted.
    fn submit_write(
        session: &SharedSession,
        request: &[WriteValue],
    ) -> Result<(usize, f64), AdapterError> {
        let (outcome, latency_ms) = tokio::task::block_in_place(|| {
            let session = session.read();
            let started = Instant::now();
            let outcome = session.write(request);
            (outcome, elapsed_ms(started))
        });

        let results =
            outcome.map_err(|status| AdapterError::Protocol(anyhow!("write service failed: {status:?}")))?;
        let rejected = results.iter().filter(|code| !code.is_good()).count();
        if rejected > 0 {
            return Err(AdapterError::Protocol(anyhow!(
                "{rejected} of {} write items rejected",
                request.len()
            )));
        }
        Ok((results.len(), latency_ms))
    }
}

#[async_trait]
impl ProtocolAdapter for OpcUaAdapter {
    async fn connect(&mut self) -> Result<(), AdapterError> {
        let endpoint_url = self.endpoint_url.clone();
        let (client, session) = tokio::task::block_in_place(|| {
            let mut client = ClientBuilder::new()
                .application_name("plc-benchmark")
                .application_uri("urn:plc-benchmark")
                .product_uri("urn:plc-benchmark")
                .trust_server_certs(true)
                .create_sample_keypair(true)
                .session_retry_limit(1)
                .client()
                .ok_or_else(|| {
                    AdapterError::Connection(anyhow!("invalid OPC UA client configuration"))
                })?;

            let session = client
                .connect_to_endpoint(
                    (
                        endpoint_url.as_str(),
                        SecurityPolicy::None.to_str(),
                        MessageSecurityMode::None,
                        UserTokenPolicy::anonymous(),
                    ),
                    IdentityToken::Anonymous,
                )
                .map_err(|status| {
                    AdapterError::Connection(anyhow!("endpoint connect failed: {status:?}"))
                })?;
            Ok::<_, AdapterError>((client, session))
        })?;

        debug!("OPC UA session established at {}", self.endpoint_url);
        self.client = Some(client);
        self.session = Some(session);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        if let Some(session) = self.session.take() {
            tokio::task::block_in_place(|| {
                let session = session.read();
                session.disconnect();
            });
            debug!("OPC UA session closed");
        }
        self.client = None;
        Ok(())
    }

    async fn write(
        &mut self,
        variable: &str,
        value: &PlcValue,
    ) -> Result<AdapterResponse, AdapterError> {
        let session = self.session()?;
        let request = vec![Self::write_value(self.node(variable), value)];
        let (_, latency_ms) = Self::submit_write(&session, &request)?;
        Ok(AdapterResponse {
            detail: json!({"success": true, "node": variable}),
            latency_ms,
        })
    }

    async fn read(&mut self, variable: &str) -> Result<AdapterResponse, AdapterError> {
        let session = self.session()?;
        let nodes: Vec<ReadValueId> = vec![self.node(variable).into()];

        let (outcome, latency_ms) = tokio::task::block_in_place(|| {
            let session = session.read();
            let started = Instant::now();
            let outcome = session.read(&nodes, TimestampsToReturn::Neither, 0.0);
            (outcome, elapsed_ms(started))
        });

        let values = outcome
            .map_err(|status| AdapterError::Protocol(anyhow!("read service failed: {status:?}")))?;
        let value = values
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Protocol(anyhow!("empty read response")))?;

        Ok(AdapterResponse {
            detail: json!({
                "success": true,
                "node": variable,
                "value": format!("{:?}", value.value),
            }),
            latency_ms,
        })
    }

    async fn write_bulk(&mut self, values: &[PlcValue]) -> Result<AdapterResponse, AdapterError> {
        let session = self.session()?;
        // The whole batch goes out as a single Write-service call; the
        // service latency spans every element.
        let request: Vec<WriteValue> = values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                Self::write_value(self.node(&format!("{}[{index}]", self.bulk_variable)), value)
            })
            .collect();

        let (written, latency_ms) = Self::submit_write(&session, &request)?;
        Ok(AdapterResponse {
            detail: json!({"success": true, "elements_written": written}),
            latency_ms,
        })
    }

    fn protocol(&self) -> Protocol {
        Protocol::OpcUa
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_resolve_in_the_configured_namespace() {
        let adapter = OpcUaAdapter::new(&AdapterConfig::default());
        let node = adapter.node("\"PerformanceData\".ToServer.bool00");
        assert_eq!(node.to_string(), "ns=3;s=\"PerformanceData\".ToServer.bool00");
    }

    #[test]
    fn duration_literals_and_integers_share_a_variant() {
        let literal = PlcValue::Text("LT#5000000ns".to_string());
        let raw = PlcValue::Int(5_000_000);
        assert_eq!(OpcUaAdapter::variant(&literal), Variant::Int64(5_000_000));
        assert_eq!(OpcUaAdapter::variant(&literal), OpcUaAdapter::variant(&raw));
    }

    #[test]
    fn scalar_variants_match_value_kinds() {
        assert_eq!(
            OpcUaAdapter::variant(&PlcValue::Bool(true)),
            Variant::Boolean(true)
        );
        assert_eq!(
            OpcUaAdapter::variant(&PlcValue::Real(1.5)),
            Variant::Double(1.5)
        );
        assert_eq!(
            OpcUaAdapter::variant(&PlcValue::Text("plain".to_string())),
            Variant::String(UAString::from("plain"))
        );
    }

    #[tokio::test]
    async fn operations_before_connect_are_rejected() {
        let mut adapter = OpcUaAdapter::new(&AdapterConfig::default());
        let result = adapter.write("x", &PlcValue::Bool(true)).await;
        assert!(matches!(result, Err(AdapterError::NotConnected)));
    }
}
