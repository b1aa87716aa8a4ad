//! Gateway event sink — trait for emitting lifecycle events from any module.
//!
//! Connectors and the router accept an `Arc<dyn EventSink>` to surface
//! connection and integration lifecycle changes to whatever the embedding
//! process wires in (log shippers, alerting, dashboards).

use std::sync::{Arc, Mutex};

/// Lifecycle event emitted by connectors and the integration engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    IntegrationStarted {
        integration_id: String,
        system: String,
        operation: String,
    },
    IntegrationCompleted {
        integration_id: String,
        system: String,
        processing_time_ms: u64,
    },
    IntegrationFailed {
        integration_id: String,
        system: String,
        error: String,
    },
    Connected {
        system: String,
    },
    ConnectionFailed {
        system: String,
        error: String,
    },
    ConnectionLost {
        system: String,
    },
    AuthenticationFailed {
        system: String,
    },
    Disconnected {
        system: String,
    },
}

/// Discriminant used for counting events in tests and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventKind {
    IntegrationStarted,
    IntegrationCompleted,
    IntegrationFailed,
    Connected,
    ConnectionFailed,
    ConnectionLost,
    AuthenticationFailed,
    Disconnected,
}

impl GatewayEvent {
    pub fn kind(&self) -> GatewayEventKind {
        match self {
            GatewayEvent::IntegrationStarted { .. } => GatewayEventKind::IntegrationStarted,
            GatewayEvent::IntegrationCompleted { .. } => GatewayEventKind::IntegrationCompleted,
            GatewayEvent::IntegrationFailed { .. } => GatewayEventKind::IntegrationFailed,
            GatewayEvent::Connected { .. } => GatewayEventKind::Connected,
            GatewayEvent::ConnectionFailed { .. } => GatewayEventKind::ConnectionFailed,
            GatewayEvent::ConnectionLost { .. } => GatewayEventKind::ConnectionLost,
            GatewayEvent::AuthenticationFailed { .. } => GatewayEventKind::AuthenticationFailed,
            GatewayEvent::Disconnected { .. } => GatewayEventKind::Disconnected,
        }
    }

    /// The external system the event concerns.
    pub fn system(&self) -> &str {
        match self {
            GatewayEvent::IntegrationStarted { system, .. }
            | GatewayEvent::IntegrationCompleted { system, .. }
            | GatewayEvent::IntegrationFailed { system, .. }
            | GatewayEvent::Connected { system }
            | GatewayEvent::ConnectionFailed { system, .. }
            | GatewayEvent::ConnectionLost { system }
            | GatewayEvent::AuthenticationFailed { system }
            | GatewayEvent::Disconnected { system } => system,
        }
    }
}

/// Trait for emitting gateway lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GatewayEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: GatewayEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<GatewayEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().expect("event sink mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event sink mutex poisoned").len()
    }

    pub fn count_kind(&self, kind: GatewayEventKind) -> usize {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event sink mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: GatewayEvent) {
        self.events.lock().expect("event sink mutex poisoned").push(event);
    }
}

/// Convenience: create a no-op event sink.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
