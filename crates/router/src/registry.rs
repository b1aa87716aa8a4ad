//! Registry for connectors and REST endpoints, keyed by system name.
//!
//! Constructed once at startup and injected wherever dispatch happens —
//! no ambient globals.

use dashmap::DashMap;
use gateway_connectors::{ProtocolConnector, RestEndpointClient};
use std::sync::Arc;

#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: DashMap<String, Arc<dyn ProtocolConnector>>,
    endpoints: DashMap<String, Arc<RestEndpointClient>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: DashMap::new(),
            endpoints: DashMap::new(),
        }
    }

    /// Register a banking-core connector under its system name.
    pub fn register_connector(&self, connector: Arc<dyn ProtocolConnector>) {
        tracing::info!(system = connector.system(), "connector registered");
        self.connectors
            .insert(connector.system().to_string(), connector);
    }

    pub fn connector(&self, system: &str) -> Option<Arc<dyn ProtocolConnector>> {
        self.connectors.get(system).map(|c| c.clone())
    }

    pub fn has_connector(&self, system: &str) -> bool {
        self.connectors.contains_key(system)
    }

    /// Register a REST endpoint client under its system name.
    pub fn register_endpoint(&self, endpoint: Arc<RestEndpointClient>) {
        tracing::info!(system = endpoint.system(), "endpoint registered");
        self.endpoints
            .insert(endpoint.system().to_string(), endpoint);
    }

    pub fn endpoint(&self, system: &str) -> Option<Arc<RestEndpointClient>> {
        self.endpoints.get(system).map(|e| e.clone())
    }

    pub fn connector_systems(&self) -> Vec<String> {
        self.connectors.iter().map(|e| e.key().clone()).collect()
    }

    /// Disconnect every registered connector, for process shutdown.
    pub async fn disconnect_all(&self) {
        let connectors: Vec<Arc<dyn ProtocolConnector>> =
            self.connectors.iter().map(|e| e.value().clone()).collect();
        for connector in connectors {
            connector.disconnect().await;
        }
    }
}
