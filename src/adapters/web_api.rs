//! HTTP JSON-RPC ("Web API") adapter.
//!
//! Speaks the controller's JSON-RPC 2.0 batch endpoint over HTTPS. A login
//! call yields a session token that authenticates subsequent
//! `PlcProgram.Write`/`PlcProgram.Read` requests through the `X-Auth-Token`
//! header. Controllers commonly present self-signed certificates, so
//! certificate validation is configurable.

use super::{elapsed_ms, AdapterConfig, AdapterError, AdapterResponse, ProtocolAdapter};
use crate::cli::Protocol;
use crate::value::{decode_duration_literal, PlcValue};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

pub struct WebApiAdapter {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    bulk_variable: String,
    token: Option<String>,
}

impl WebApiAdapter {
    pub fn new(config: &AdapterConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.web_api_accept_invalid_certs)
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.web_api_url.clone(),
            username: config.web_api_user.clone(),
            password: config.web_api_password.clone(),
            bulk_variable: config.bulk_variable.clone(),
            token: None,
        })
    }

    fn token(&self) -> Result<&str, AdapterError> {
        self.token.as_deref().ok_or(AdapterError::NotConnected)
    }

    /// JSON encoding for a value. Duration literals are normalized to their
    /// integer nanosecond payload so every adapter transfers the same
    /// number for equivalent inputs.
    fn encode(value: &PlcValue) -> Value {
        if let PlcValue::Text(text) = value {
            if let Some(nanoseconds) = decode_duration_literal(text) {
                return json!(nanoseconds);
            }
        }
        serde_json::to_value(value).unwrap_or(Value::Null)
    }

    /// POST one JSON-RPC batch and return the parsed body with the measured
    /// transport latency. The timer covers the request and the full
    /// response body; JSON parsing happens outside the timed window.
    async fn rpc(&self, payload: &Value, token: Option<&str>) -> Result<(Value, f64), AdapterError> {
        let mut request = self.client.post(&self.base_url).json(payload);
        if let Some(token) = token {
            request = request.header("X-Auth-Token", token);
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Protocol(e.into()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AdapterError::Protocol(e.into()))?;
        let latency_ms = elapsed_ms(started);

        if !status.is_success() {
            return Err(AdapterError::Protocol(anyhow!("HTTP status {status}")));
        }
        let body: Value =
            serde_json::from_slice(&body).map_err(|e| AdapterError::Protocol(e.into()))?;
        if let Some(error) = body.get(0).and_then(|entry| entry.get("error")) {
            return Err(AdapterError::Protocol(anyhow!("JSON-RPC error: {error}")));
        }
        Ok((body, latency_ms))
    }
}

#[async_trait]
impl ProtocolAdapter for WebApiAdapter {
    async fn connect(&mut self) -> Result<(), AdapterError> {
        let payload = json!([{
            "id": 0,
            "jsonrpc": "2.0",
            "method": "Api.Login",
            "params": {"user": self.username, "password": self.password},
        }]);

        // Login failures of any kind are connection failures here.
        let (body, _) = self.rpc(&payload, None).await.map_err(|error| match error {
            AdapterError::Protocol(inner) => AdapterError::Connection(inner),
            other => other,
        })?;

        let token = body
            .get(0)
            .and_then(|entry| entry.get("result"))
            .and_then(|result| result.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::Connection(anyhow!("login response carried no token")))?
            .to_string();

        debug!("Web API session established at {}", self.base_url);
        self.token = Some(token);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        let payload = json!([{
            "id": 0,
            "jsonrpc": "2.0",
            "method": "Api.Logout",
        }]);
        // Best effort: the token is dropped locally even if logout fails.
        if let Err(error) = self.rpc(&payload, Some(&token)).await {
            debug!("Web API logout failed: {error:#}");
        }
        Ok(())
    }

    async fn write(
        &mut self,
        variable: &str,
        value: &PlcValue,
    ) -> Result<AdapterResponse, AdapterError> {
        let token = self.token()?;
        let payload = json!([{
            "id": 1,
            "jsonrpc": "2.0",
            "method": "PlcProgram.Write",
            "params": {"var": variable, "value": Self::encode(value)},
        }]);
        let (detail, latency_ms) = self.rpc(&payload, Some(token)).await?;
        Ok(AdapterResponse { detail, latency_ms })
    }

    async fn read(&mut self, variable: &str) -> Result<AdapterResponse, AdapterError> {
        let token = self.token()?;
        let payload = json!([{
            "id": 1,
            "jsonrpc": "2.0",
            "method": "PlcProgram.Read",
            "params": {"var": variable},
        }]);
        let (detail, latency_ms) = self.rpc(&payload, Some(token)).await?;
        Ok(AdapterResponse { detail, latency_ms })
    }

    async fn write_bulk(&mut self, values: &[PlcValue]) -> Result<AdapterResponse, AdapterError> {
        let token = self.token()?;
        let encoded: Vec<Value> = values.iter().map(Self::encode).collect();
        let payload = json!([{
            "id": 1,
            "jsonrpc": "2.0",
            "method": "PlcProgram.Write",
            "params": {"var": self.bulk_variable, "value": encoded},
        }]);
        let (detail, latency_ms) = self.rpc(&payload, Some(token)).await?;
        Ok(AdapterResponse { detail, latency_ms })
    }

    fn protocol(&self) -> Protocol {
        Protocol::WebApi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_literals_encode_as_integer_payloads() {
        let literal = PlcValue::Text("LT#5000000ns".to_string());
        let raw = PlcValue::Int(5_000_000);
        assert_eq!(WebApiAdapter::encode(&literal), json!(5_000_000));
        assert_eq!(WebApiAdapter::encode(&literal), WebApiAdapter::encode(&raw));
    }

    #[test]
    fn scalars_encode_as_bare_json_values() {
        assert_eq!(WebApiAdapter::encode(&PlcValue::Bool(true)), json!(true));
        assert_eq!(WebApiAdapter::encode(&PlcValue::Int(42)), json!(42));
        assert_eq!(WebApiAdapter::encode(&PlcValue::Real(1.5)), json!(1.5));
        assert_eq!(
            WebApiAdapter::encode(&PlcValue::Text("plain".to_string())),
            json!("plain")
        );
    }

    #[tokio::test]
    async fn operations_before_connect_are_rejected() {
        let mut adapter = WebApiAdapter::new(&AdapterConfig::default()).unwrap();
        let result = adapter.write("x", &PlcValue::Bool(true)).await;
        assert!(matches!(result, Err(AdapterError::NotConnected)));

        let result = adapter.write_bulk(&[PlcValue::Int(1)]).await;
        assert!(matches!(result, Err(AdapterError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_without_session_is_a_no_op() {
        let mut adapter = WebApiAdapter::new(&AdapterConfig::default()).unwrap();
        assert!(adapter.disconnect().await.is_ok());
        assert!(adapter.disconnect().await.is_ok());
    }
}
