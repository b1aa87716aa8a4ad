//! Protocol connector contract and the per-connector session state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::GatewayResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller options carried on the wire alongside the request payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default)]
    pub async_processing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub validate_only: bool,
}

/// One request against an external system, expressed protocol-neutrally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorRequest {
    pub service: String,
    pub operation: String,
    /// Defaults to a generated value when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub data: Value,
    #[serde(default)]
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Error,
    Warning,
}

/// Normalized response shape — the single failure channel for callers.
/// Transport and parse failures become `status = Error`, never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
}

impl ConnectorResponse {
    pub fn success(data: Value, message_id: Option<String>, processing_time_ms: u64) -> Self {
        Self {
            status: ResponseStatus::Success,
            error_code: None,
            error_message: None,
            data: Some(data),
            warnings: Vec::new(),
            message_id,
            timestamp: Utc::now(),
            processing_time_ms,
        }
    }

    pub fn failure(
        code: impl Into<String>,
        message: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            status: ResponseStatus::Error,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            data: None,
            warnings: Vec::new(),
            message_id: None,
            timestamp: Utc::now(),
            processing_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != ResponseStatus::Error
    }
}

/// Authenticated session against one external system. Exactly one lives
/// inside each connector instance; writes happen on connect, disconnect,
/// and auth rejection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSession {
    session_token: Option<String>,
    pub is_connected: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ConnectionSession {
    pub fn establish(&mut self, token: String) {
        self.session_token = Some(token);
        self.is_connected = true;
        self.last_heartbeat = Some(Utc::now());
    }

    pub fn invalidate(&mut self) {
        self.session_token = None;
        self.is_connected = false;
    }

    pub fn token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn touch(&mut self) {
        self.last_heartbeat = Some(Utc::now());
    }

    /// Token rendering safe for logs: first four characters only.
    pub fn masked_token(&self) -> String {
        match &self.session_token {
            Some(token) => {
                let prefix: String = token.chars().take(4).collect();
                format!("{prefix}****")
            }
            None => "<none>".to_string(),
        }
    }
}

/// A session-oriented connector to one external system. Implementations
/// own their wire protocol end to end; `execute` never raises transport
/// errors, it reports them through the response status.
#[async_trait]
pub trait ProtocolConnector: Send + Sync {
    /// System identifier this connector serves (e.g. "flexcube").
    fn system(&self) -> &str;

    /// Authenticate and establish the session. On failure the connector
    /// stays disconnected and the caller is expected to retry.
    async fn connect(&self) -> GatewayResult<()>;

    /// Best-effort logout; the session is cleared regardless.
    async fn disconnect(&self);

    async fn execute(&self, request: ConnectorRequest) -> ConnectorResponse;

    fn is_connected(&self) -> bool;
}
