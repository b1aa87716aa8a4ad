use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of external system an integration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationType {
    BankingCore,
    Regulatory,
    ThirdParty,
    Internal,
}

impl IntegrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::BankingCore => "BANKING_CORE",
            IntegrationType::Regulatory => "REGULATORY",
            IntegrationType::ThirdParty => "THIRD_PARTY",
            IntegrationType::Internal => "INTERNAL",
        }
    }
}

/// Lifecycle status of a tracked integration. Transitions are monotonic:
/// `Processing` may move to `Completed` or `Failed`; terminal states never
/// change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationStatus {
    Processing,
    Completed,
    Failed,
}

impl IntegrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntegrationStatus::Completed | IntegrationStatus::Failed)
    }
}

/// Canonical request accepted from the (already authenticated) caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRequest {
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub system: String,
    pub operation: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Canonical response returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationResponse {
    pub integration_id: String,
    pub status: IntegrationStatus,
    pub data: Value,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// One tracked integration call, owned exclusively by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub system: String,
    pub operation: String,
    pub status: IntegrationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub request_data: Value,
    pub response_data: Option<Value>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

impl IntegrationInstance {
    /// A freshly accepted instance in `Processing` state.
    pub fn accepted(id: String, request: &IntegrationRequest) -> Self {
        Self {
            id,
            integration_type: request.integration_type,
            system: request.system.clone(),
            operation: request.operation.clone(),
            status: IntegrationStatus::Processing,
            started_at: Utc::now(),
            completed_at: None,
            request_data: request.data.clone(),
            response_data: None,
            error: None,
            processing_time_ms: None,
        }
    }
}
