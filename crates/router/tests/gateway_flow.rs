//! End-to-end flow: canonical request → integration engine → Flexcube
//! connector over a scripted SOAP transport → domain-mapped response.

use async_trait::async_trait;
use gateway_connectors::{FlexcubeConnector, ProtocolConnector, SoapTransport};
use gateway_core::config::ConnectorConfig;
use gateway_core::event_bus::{capture_sink, GatewayEventKind};
use gateway_core::types::{IntegrationRequest, IntegrationStatus, IntegrationType};
use gateway_core::{GatewayError, GatewayResult};
use gateway_router::{ConnectorRegistry, IntegrationEngine};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedTransport {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl SoapTransport for ScriptedTransport {
    async fn send(
        &self,
        _endpoint: &str,
        _soap_action: &str,
        _envelope: &str,
    ) -> GatewayResult<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::Connection("no scripted reply".to_string()))
    }
}

fn envelope(body: &str) -> String {
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:gw="urn:gw">
          <soapenv:Header>
            <gw:ResponseHeader><gw:MessageId>srv-1</gw:MessageId></gw:ResponseHeader>
          </soapenv:Header>
          <soapenv:Body>{body}</soapenv:Body>
        </soapenv:Envelope>"#
    )
}

fn connector_config() -> ConnectorConfig {
    serde_json::from_value(json!({
        "base_url": "https://flexcube.test/gateway",
        "username": "GWUSER",
        "password": "secret",
        "branch_code": "001",
        "source_code": "COMPLIANCE",
        "namespace": "urn:gw"
    }))
    .unwrap()
}

#[tokio::test]
async fn banking_core_query_account_end_to_end() {
    let transport = ScriptedTransport::new(vec![
        envelope("<gw:LoginResponse><SessionToken>FCS-e2e</SessionToken></gw:LoginResponse>"),
        envelope(
            "<gw:QueryAccountResponse>\
               <ACC_NO>0012345</ACC_NO>\
               <CUST_NO>C-9</CUST_NO>\
               <BOOK_BAL>15000.50</BOOK_BAL>\
               <AVL_BAL>14200.00</AVL_BAL>\
               <CCY>INR</CCY>\
             </gw:QueryAccountResponse>",
        ),
    ]);
    let events = capture_sink();

    let connector = Arc::new(FlexcubeConnector::new(
        "flexcube",
        connector_config(),
        transport,
        events.clone(),
    ));
    connector.connect().await.unwrap();

    let registry = Arc::new(ConnectorRegistry::new());
    registry.register_connector(connector);
    let engine = IntegrationEngine::new(registry, events.clone());

    let request: IntegrationRequest = serde_json::from_value(json!({
        "type": "BANKING_CORE",
        "system": "flexcube",
        "operation": "QueryAccount",
        "data": { "accountNo": "0012345" }
    }))
    .unwrap();

    let response = engine.execute(request).await.unwrap();
    assert_eq!(response.status, IntegrationStatus::Completed);

    // The mapped account carries a numeric book balance, not the wire's
    // string rendering.
    assert_eq!(response.data["accountNo"], json!("0012345"));
    assert!(response.data["balance"]["bookBalance"].is_number());
    assert_eq!(response.data["balance"]["bookBalance"], json!(15000.50));
    assert_eq!(response.data["balance"]["currency"], json!("INR"));

    let instance = engine.instance(&response.integration_id).unwrap();
    assert_eq!(instance.status, IntegrationStatus::Completed);
    assert_eq!(instance.system, "flexcube");
    assert_eq!(events.count_kind(GatewayEventKind::IntegrationCompleted), 1);
}

#[tokio::test]
async fn unknown_system_fails_fast() {
    let engine = IntegrationEngine::new(
        Arc::new(ConnectorRegistry::new()),
        gateway_core::event_bus::noop_sink(),
    );
    let request = IntegrationRequest {
        integration_type: IntegrationType::BankingCore,
        system: "no-such-core".to_string(),
        operation: "QueryAccount".to_string(),
        data: json!({}),
        metadata: None,
    };
    let error = engine.execute(request).await.unwrap_err();
    assert!(matches!(error, GatewayError::UnknownSystem { .. }));
}

#[tokio::test]
async fn soap_fault_surfaces_as_failed_integration() {
    let transport = ScriptedTransport::new(vec![
        envelope("<gw:LoginResponse><SessionToken>FCS-e2e</SessionToken></gw:LoginResponse>"),
        envelope(
            "<soapenv:Fault>\
               <faultcode>FC-2001</faultcode>\
               <faultstring>Account not found</faultstring>\
             </soapenv:Fault>",
        ),
    ]);
    let events = capture_sink();

    let connector = Arc::new(FlexcubeConnector::new(
        "flexcube",
        connector_config(),
        transport,
        events.clone(),
    ));
    connector.connect().await.unwrap();

    let registry = Arc::new(ConnectorRegistry::new());
    registry.register_connector(connector);
    let engine = IntegrationEngine::new(registry, events.clone());

    let request = IntegrationRequest {
        integration_type: IntegrationType::BankingCore,
        system: "flexcube".to_string(),
        operation: "QueryAccount".to_string(),
        data: json!({ "accountNo": "missing" }),
        metadata: None,
    };

    let error = engine.execute(request).await.unwrap_err();
    assert!(error.to_string().contains("FC-2001"));
    assert_eq!(events.count_kind(GatewayEventKind::IntegrationFailed), 1);

    let instances = engine.instances();
    assert_eq!(instances[0].status, IntegrationStatus::Failed);
}
