//! The integration engine: accepts canonical requests, dispatches to the
//! right connector or endpoint, tracks the instance, and emits lifecycle
//! events.
//!
//! This is the single place errors are allowed to propagate to the
//! caller — always after the tracked instance has been marked `Failed`.

use crate::instance::InstanceStore;
use crate::registry::ConnectorRegistry;
use gateway_connectors::{ConnectorRequest, ConnectorResponse, RequestOptions};
use gateway_core::event_bus::{EventSink, GatewayEvent};
use gateway_core::types::{
    IntegrationInstance, IntegrationRequest, IntegrationResponse, IntegrationStatus,
    IntegrationType,
};
use gateway_core::{GatewayError, GatewayResult};
use gateway_transform::{TransformOptions, TransformationEngine};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub struct IntegrationEngine {
    registry: Arc<ConnectorRegistry>,
    instances: InstanceStore,
    events: Arc<dyn EventSink>,
    transformer: Option<Arc<TransformationEngine>>,
}

impl IntegrationEngine {
    pub fn new(registry: Arc<ConnectorRegistry>, events: Arc<dyn EventSink>) -> Self {
        Self {
            registry,
            instances: InstanceStore::new(),
            events,
            transformer: None,
        }
    }

    /// Attach a transformation engine so requests can opt into rule-based
    /// reshaping via `metadata.requestRuleId` / `metadata.responseRuleId`.
    pub fn with_transformer(mut self, transformer: Arc<TransformationEngine>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn instance(&self, id: &str) -> Option<IntegrationInstance> {
        self.instances.get(id)
    }

    pub fn instances(&self) -> Vec<IntegrationInstance> {
        self.instances.all()
    }

    pub fn evict_terminal_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> usize {
        self.instances.evict_terminal_before(cutoff)
    }

    /// Execute one canonical integration request.
    pub async fn execute(&self, request: IntegrationRequest) -> GatewayResult<IntegrationResponse> {
        let integration_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        self.instances
            .insert(IntegrationInstance::accepted(integration_id.clone(), &request));
        self.events.emit(GatewayEvent::IntegrationStarted {
            integration_id: integration_id.clone(),
            system: request.system.clone(),
            operation: request.operation.clone(),
        });
        metrics::counter!("gateway.integrations_started").increment(1);
        tracing::info!(
            integration_id = %integration_id,
            integration_type = request.integration_type.as_str(),
            system = %request.system,
            operation = %request.operation,
            "integration accepted"
        );

        let outcome = self.dispatch(&request).await;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(data) => {
                self.instances
                    .complete(&integration_id, data.clone(), processing_time_ms);
                self.events.emit(GatewayEvent::IntegrationCompleted {
                    integration_id: integration_id.clone(),
                    system: request.system.clone(),
                    processing_time_ms,
                });
                metrics::counter!("gateway.integrations_completed").increment(1);
                metrics::histogram!("gateway.integration_duration_ms")
                    .record(processing_time_ms as f64);
                Ok(IntegrationResponse {
                    integration_id,
                    status: IntegrationStatus::Completed,
                    data,
                    processing_time_ms,
                    timestamp: chrono::Utc::now(),
                })
            }
            Err(error) => {
                self.instances
                    .fail(&integration_id, &error.to_string(), processing_time_ms);
                self.events.emit(GatewayEvent::IntegrationFailed {
                    integration_id: integration_id.clone(),
                    system: request.system.clone(),
                    error: error.to_string(),
                });
                metrics::counter!("gateway.integrations_failed").increment(1);
                tracing::error!(
                    integration_id = %integration_id,
                    system = %request.system,
                    error = %error,
                    "integration failed"
                );
                Err(error)
            }
        }
    }

    async fn dispatch(&self, request: &IntegrationRequest) -> GatewayResult<Value> {
        let data = self.transform_request(request)?;

        let response = match request.integration_type {
            IntegrationType::BankingCore => {
                let connector = self.registry.connector(&request.system).ok_or_else(|| {
                    GatewayError::UnknownSystem {
                        integration_type: request.integration_type,
                        system: request.system.clone(),
                    }
                })?;
                let connector_request = ConnectorRequest {
                    service: service_for_operation(&request.operation),
                    operation: request.operation.clone(),
                    message_id: metadata_str(request, "messageId"),
                    data,
                    options: RequestOptions::default(),
                };
                connector.execute(connector_request).await
            }
            IntegrationType::Regulatory
            | IntegrationType::ThirdParty
            | IntegrationType::Internal => {
                let endpoint = self.registry.endpoint(&request.system).ok_or_else(|| {
                    GatewayError::UnknownSystem {
                        integration_type: request.integration_type,
                        system: request.system.clone(),
                    }
                })?;
                endpoint.execute(&request.operation, &data).await
            }
        };

        let payload = Self::unwrap_response(response)?;
        self.transform_response(request, payload)
    }

    /// A connector-level error response becomes the integration's error.
    fn unwrap_response(response: ConnectorResponse) -> GatewayResult<Value> {
        if response.is_success() {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            let code = response.error_code.unwrap_or_else(|| "UNKNOWN".to_string());
            let message = response
                .error_message
                .unwrap_or_else(|| "external system error".to_string());
            Err(GatewayError::Protocol(format!("[{code}] {message}")))
        }
    }

    fn transform_request(&self, request: &IntegrationRequest) -> GatewayResult<Value> {
        match metadata_str(request, "requestRuleId") {
            Some(rule_id) => self.run_rule(&rule_id, &request.data, request),
            None => Ok(request.data.clone()),
        }
    }

    fn transform_response(
        &self,
        request: &IntegrationRequest,
        payload: Value,
    ) -> GatewayResult<Value> {
        match metadata_str(request, "responseRuleId") {
            Some(rule_id) => self.run_rule(&rule_id, &payload, request),
            None => Ok(payload),
        }
    }

    fn run_rule(
        &self,
        rule_id: &str,
        data: &Value,
        request: &IntegrationRequest,
    ) -> GatewayResult<Value> {
        let transformer = self.transformer.as_ref().ok_or_else(|| {
            GatewayError::Config(format!(
                "rule '{rule_id}' requested but no transformation engine is attached"
            ))
        })?;
        let result = transformer.transform(
            rule_id,
            data,
            request.metadata.as_ref(),
            &TransformOptions::default(),
        );
        if result.success {
            Ok(result.data.unwrap_or(Value::Null))
        } else {
            let detail = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            Err(GatewayError::Transformation(detail))
        }
    }
}

/// The banking core groups operations into services by entity; derive the
/// service from the operation name.
fn service_for_operation(operation: &str) -> String {
    let service = if operation.contains("Customer") {
        "CustomerService"
    } else if operation.contains("Transaction") || operation.starts_with("Post") {
        "TransactionService"
    } else if operation.contains("Account") || operation.contains("Balance") {
        "AccountService"
    } else {
        "GatewayService"
    };
    service.to_string()
}

fn metadata_str(request: &IntegrationRequest, key: &str) -> Option<String> {
    request
        .metadata
        .as_ref()
        .and_then(|m| m.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_connectors::ProtocolConnector;
    use gateway_core::event_bus::{capture_sink, GatewayEventKind};
    use gateway_core::types::IntegrationType;
    use gateway_transform::{
        DataType, FieldMapping, FunctionRegistry, InMemoryRuleRepository, LookupStore,
        TransformationRule, TransformationType,
    };
    use serde_json::json;
    use std::sync::Mutex;

    enum StubBehaviour {
        Succeed(Value),
        Fail(&'static str, &'static str),
    }

    struct StubConnector {
        system: String,
        behaviour: StubBehaviour,
        received: Mutex<Vec<ConnectorRequest>>,
    }

    impl StubConnector {
        fn succeeding(system: &str, data: Value) -> Arc<Self> {
            Arc::new(Self {
                system: system.to_string(),
                behaviour: StubBehaviour::Succeed(data),
                received: Mutex::new(Vec::new()),
            })
        }

        fn failing(system: &str, code: &'static str, message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                system: system.to_string(),
                behaviour: StubBehaviour::Fail(code, message),
                received: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProtocolConnector for StubConnector {
        fn system(&self) -> &str {
            &self.system
        }

        async fn connect(&self) -> GatewayResult<()> {
            Ok(())
        }

        async fn disconnect(&self) {}

        async fn execute(&self, request: ConnectorRequest) -> ConnectorResponse {
            self.received.lock().unwrap().push(request);
            match &self.behaviour {
                StubBehaviour::Succeed(data) => {
                    ConnectorResponse::success(data.clone(), None, 1)
                }
                StubBehaviour::Fail(code, message) => {
                    ConnectorResponse::failure(*code, *message, 1)
                }
            }
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn banking_request(system: &str) -> IntegrationRequest {
        IntegrationRequest {
            integration_type: IntegrationType::BankingCore,
            system: system.to_string(),
            operation: "QueryAccount".to_string(),
            data: json!({ "accountNo": "001" }),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn successful_integration_completes_instance() {
        let registry = Arc::new(ConnectorRegistry::new());
        registry.register_connector(StubConnector::succeeding(
            "flexcube",
            json!({ "accountNo": "001", "balance": { "bookBalance": 10.0 } }),
        ));
        let events = capture_sink();
        let engine = IntegrationEngine::new(registry, events.clone());

        let response = engine.execute(banking_request("flexcube")).await.unwrap();
        assert_eq!(response.status, IntegrationStatus::Completed);
        assert_eq!(response.data["balance"]["bookBalance"], json!(10.0));

        let instance = engine.instance(&response.integration_id).unwrap();
        assert_eq!(instance.status, IntegrationStatus::Completed);
        assert!(instance.response_data.is_some());
        assert_eq!(events.count_kind(GatewayEventKind::IntegrationStarted), 1);
        assert_eq!(events.count_kind(GatewayEventKind::IntegrationCompleted), 1);
    }

    #[tokio::test]
    async fn connector_error_fails_instance_and_rethrows() {
        let registry = Arc::new(ConnectorRegistry::new());
        registry.register_connector(StubConnector::failing(
            "flexcube",
            "FC-2001",
            "Account not found",
        ));
        let events = capture_sink();
        let engine = IntegrationEngine::new(registry, events.clone());

        let error = engine
            .execute(banking_request("flexcube"))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("FC-2001"));

        let instances = engine.instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].status, IntegrationStatus::Failed);
        assert!(instances[0].error.as_ref().unwrap().contains("FC-2001"));
        assert_eq!(events.count_kind(GatewayEventKind::IntegrationFailed), 1);
    }

    #[tokio::test]
    async fn unknown_system_is_an_immediate_configuration_error() {
        let engine = IntegrationEngine::new(
            Arc::new(ConnectorRegistry::new()),
            gateway_core::event_bus::noop_sink(),
        );
        let error = engine.execute(banking_request("ghost")).await.unwrap_err();
        assert!(matches!(error, GatewayError::UnknownSystem { .. }));
    }

    #[tokio::test]
    async fn concurrent_integrations_are_independent() {
        let registry = Arc::new(ConnectorRegistry::new());
        registry.register_connector(StubConnector::succeeding("flexcube", json!({ "from": "a" })));
        registry.register_connector(StubConnector::succeeding("finacle", json!({ "from": "b" })));
        let engine = Arc::new(IntegrationEngine::new(
            registry,
            gateway_core::event_bus::noop_sink(),
        ));

        let (ra, rb) = tokio::join!(
            engine.execute(banking_request("flexcube")),
            engine.execute(banking_request("finacle"))
        );
        let ra = ra.unwrap();
        let rb = rb.unwrap();
        assert_ne!(ra.integration_id, rb.integration_id);
        assert_eq!(ra.data["from"], json!("a"));
        assert_eq!(rb.data["from"], json!("b"));
        assert_eq!(engine.instances().len(), 2);
    }

    #[tokio::test]
    async fn request_rule_reshapes_outbound_data() {
        let stub = StubConnector::succeeding("flexcube", json!({ "ok": true }));
        let registry = Arc::new(ConnectorRegistry::new());
        registry.register_connector(stub.clone());

        let rules = InMemoryRuleRepository::new();
        rules.upsert(TransformationRule {
            id: "canonical-to-fc".to_string(),
            source_format: "canonical".to_string(),
            target_format: "flexcube".to_string(),
            mappings: vec![FieldMapping {
                source_field: "accountNo".to_string(),
                target_field: "ACC_NO".to_string(),
                transformation_type: TransformationType::Direct,
                transformation_function: None,
                parameters: None,
                default_value: None,
                is_required: true,
                data_type: DataType::String,
                format: None,
            }],
            conditions: Vec::new(),
            validations: Vec::new(),
            is_active: true,
            version: 1,
        });
        let transformer = Arc::new(TransformationEngine::new(
            Arc::new(rules),
            Arc::new(LookupStore::new(100, 300)),
            Arc::new(FunctionRegistry::with_builtins()),
        ));
        let engine = IntegrationEngine::new(registry, gateway_core::event_bus::noop_sink())
            .with_transformer(transformer);

        let mut request = banking_request("flexcube");
        request.metadata = Some(json!({ "requestRuleId": "canonical-to-fc" }));
        engine.execute(request).await.unwrap();

        let received = stub.received.lock().unwrap();
        assert_eq!(received[0].data, json!({ "ACC_NO": "001" }));
        assert_eq!(received[0].service, "AccountService");
    }

    #[tokio::test]
    async fn rule_without_transformer_is_a_configuration_error() {
        let registry = Arc::new(ConnectorRegistry::new());
        registry.register_connector(StubConnector::succeeding("flexcube", json!({})));
        let engine = IntegrationEngine::new(registry, gateway_core::event_bus::noop_sink());

        let mut request = banking_request("flexcube");
        request.metadata = Some(json!({ "requestRuleId": "r" }));
        let error = engine.execute(request).await.unwrap_err();
        assert!(matches!(error, GatewayError::Config(_)));
    }

    #[test]
    fn service_derivation_by_operation() {
        assert_eq!(service_for_operation("QueryCustomer"), "CustomerService");
        assert_eq!(service_for_operation("QueryAccount"), "AccountService");
        assert_eq!(service_for_operation("GetAccountBalance"), "AccountService");
        assert_eq!(service_for_operation("PostTransaction"), "TransactionService");
        assert_eq!(service_for_operation("Ping"), "GatewayService");
    }
}
