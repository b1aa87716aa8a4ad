//! JSON/REST client for regulatory, third-party, and internal systems.
//!
//! Stateless per call — no session to maintain. Failures normalise into
//! the same `ConnectorResponse` shape the SOAP connectors use, so the
//! router sees one contract.

use crate::connector::{ConnectorResponse, ResponseStatus};
use chrono::Utc;
use gateway_core::config::EndpointConfig;
use gateway_core::{GatewayError, GatewayResult};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub struct RestEndpointClient {
    system: String,
    config: EndpointConfig,
    client: reqwest::Client,
}

impl RestEndpointClient {
    pub fn new(system: impl Into<String>, config: EndpointConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GatewayError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            system: system.into(),
            config,
            client,
        })
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// POST `data` to `{base_url}/{operation}` and normalise the outcome.
    pub async fn execute(&self, operation: &str, data: &Value) -> ConnectorResponse {
        let started = Instant::now();
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            operation
        );
        tracing::debug!(system = %self.system, url = %url, "dispatching REST request");

        let mut request = self.client.post(&url).json(data);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let elapsed = started.elapsed().as_millis() as u64;
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::counter!("gateway.requests_failed").increment(1);
                let code = if e.is_timeout() {
                    "TIMEOUT"
                } else {
                    "TRANSPORT_ERROR"
                };
                return ConnectorResponse::failure(
                    code,
                    format!("request to {} failed: {e}", self.system),
                    elapsed,
                );
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let elapsed = started.elapsed().as_millis() as u64;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            metrics::counter!("gateway.requests_failed").increment(1);
            return ConnectorResponse::failure(
                "AUTH_FAILED",
                format!("{} rejected credentials", self.system),
                elapsed,
            );
        }
        if !status.is_success() {
            metrics::counter!("gateway.requests_failed").increment(1);
            let detail: String = body.chars().take(512).collect();
            return ConnectorResponse::failure(
                format!("HTTP_{}", status.as_u16()),
                detail,
                elapsed,
            );
        }

        let data = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| json!({ "raw": body }));
        metrics::counter!("gateway.requests_ok").increment(1);
        ConnectorResponse {
            status: ResponseStatus::Success,
            error_code: None,
            error_message: None,
            data: Some(data),
            warnings: Vec::new(),
            message_id: None,
            timestamp: Utc::now(),
            processing_time_ms: elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_endpoint_config() {
        let config: EndpointConfig = serde_json::from_value(json!({
            "base_url": "https://cersai.gov.example/api/",
            "api_key": "k-123"
        }))
        .unwrap();
        let client = RestEndpointClient::new("cersai", config).unwrap();
        assert_eq!(client.system(), "cersai");
    }
}
