//! Wire transport seam for SOAP connectors. Production uses HTTP POST;
//! tests script the seam directly.

use async_trait::async_trait;
use gateway_core::config::{ConnectorConfig, SoapVersion};
use gateway_core::{GatewayError, GatewayResult};
use std::time::Duration;

#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Deliver an envelope and return the raw response body.
    async fn send(&self, endpoint: &str, soap_action: &str, envelope: &str)
        -> GatewayResult<String>;
}

pub struct HttpSoapTransport {
    client: reqwest::Client,
    version: SoapVersion,
}

impl HttpSoapTransport {
    pub fn new(config: &ConnectorConfig) -> GatewayResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms));
        if !config.enable_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| GatewayError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            version: config.soap_version,
        })
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    async fn send(
        &self,
        endpoint: &str,
        soap_action: &str,
        envelope: &str,
    ) -> GatewayResult<String> {
        let request = match self.version {
            SoapVersion::V1_1 => self
                .client
                .post(endpoint)
                .header("Content-Type", "text/xml; charset=utf-8")
                .header("SOAPAction", format!("\"{soap_action}\"")),
            SoapVersion::V1_2 => self.client.post(endpoint).header(
                "Content-Type",
                format!("application/soap+xml; charset=utf-8; action=\"{soap_action}\""),
            ),
        };

        let response = request
            .body(envelope.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Connection(format!("request to {endpoint} timed out"))
                } else {
                    GatewayError::Connection(format!("request to {endpoint} failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Connection(format!("failed reading response body: {e}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::Unauthorized(format!(
                "external system rejected credentials (HTTP {status})"
            )));
        }
        // SOAP 1.1 faults commonly ride on HTTP 500; hand the body to the
        // envelope parser instead of failing on status alone.
        if !status.is_success() && status != reqwest::StatusCode::INTERNAL_SERVER_ERROR {
            return Err(GatewayError::Connection(format!(
                "unexpected HTTP {status} from {endpoint}"
            )));
        }
        Ok(body)
    }
}
