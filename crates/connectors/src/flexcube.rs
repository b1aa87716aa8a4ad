//! Session-oriented SOAP connector for the Flexcube banking core — the
//! reference implementation of `ProtocolConnector`.
//!
//! One authenticated session per connector instance. A background
//! heartbeat task verifies liveness while connected; a failed heartbeat
//! flips the session to disconnected and emits `ConnectionLost` without
//! touching any other connector. Authentication rejections invalidate the
//! token; the connector never reconnects transparently.

use crate::connector::{
    ConnectionSession, ConnectorRequest, ConnectorResponse, ProtocolConnector, RequestOptions,
    ResponseStatus,
};
use crate::mapping::{map_account, map_customer, map_transaction};
use crate::soap::{build_envelope, parse_envelope, ParsedEnvelope, SoapHeaderBlock};
use crate::transport::{HttpSoapTransport, SoapTransport};
use async_trait::async_trait;
use chrono::Utc;
use gateway_core::config::ConnectorConfig;
use gateway_core::event_bus::{EventSink, GatewayEvent};
use gateway_core::{GatewayError, GatewayResult};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

const SESSION_SERVICE: &str = "SessionService";

pub struct FlexcubeConnector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    system: String,
    config: ConnectorConfig,
    transport: Arc<dyn SoapTransport>,
    session: RwLock<ConnectionSession>,
    events: Arc<dyn EventSink>,
    heartbeat_stop: Mutex<Option<watch::Sender<()>>>,
}

impl FlexcubeConnector {
    pub fn new(
        system: impl Into<String>,
        config: ConnectorConfig,
        transport: Arc<dyn SoapTransport>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                system: system.into(),
                config,
                transport,
                session: RwLock::new(ConnectionSession::default()),
                events,
                heartbeat_stop: Mutex::new(None),
            }),
        }
    }

    /// Production constructor wiring the HTTP transport from the config.
    pub fn with_http(
        system: impl Into<String>,
        config: ConnectorConfig,
        events: Arc<dyn EventSink>,
    ) -> GatewayResult<Self> {
        let transport = Arc::new(HttpSoapTransport::new(&config)?);
        Ok(Self::new(system, config, transport, events))
    }

    fn start_heartbeat(&self) {
        self.stop_heartbeat();
        let (tx, mut rx) = watch::channel(());
        *self.inner.heartbeat_stop.lock() = Some(tx);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let period = Duration::from_millis(inner.config.heartbeat_interval_ms);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the session was just
            // authenticated, so skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = ticker.tick() => {
                        if !inner.heartbeat_once().await {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn stop_heartbeat(&self) {
        if let Some(stop) = self.inner.heartbeat_stop.lock().take() {
            let _ = stop.send(());
        }
    }
}

impl ConnectorInner {
    async fn send_envelope(
        &self,
        service: &str,
        operation: &str,
        message_id: &str,
        data: &Value,
        session_token: Option<&str>,
        options: &RequestOptions,
    ) -> GatewayResult<ParsedEnvelope> {
        let header = SoapHeaderBlock {
            service: service.to_string(),
            operation: operation.to_string(),
            branch_code: self.config.branch_code.clone(),
            source_code: self.config.source_code.clone(),
            message_id: message_id.to_string(),
            timestamp: Utc::now(),
            session_token: session_token.map(str::to_string),
            options: options.clone(),
        };
        let envelope = build_envelope(
            self.config.soap_version,
            &self.config.namespace,
            &header,
            &format!("{operation}Request"),
            data,
        )?;
        let action = format!(
            "{}/{operation}",
            self.config.namespace.trim_end_matches('/')
        );
        let raw = self
            .transport
            .send(&self.config.base_url, &action, &envelope)
            .await?;
        parse_envelope(&raw)
    }

    /// One liveness probe. Returns false when the loop should stop.
    async fn heartbeat_once(&self) -> bool {
        let token = {
            let session = self.session.read();
            if !session.is_connected {
                return false;
            }
            session.token().map(str::to_string)
        };
        let Some(token) = token else {
            return false;
        };

        let message_id = Uuid::new_v4().to_string();
        let outcome = self
            .send_envelope(
                SESSION_SERVICE,
                "Heartbeat",
                &message_id,
                &json!({}),
                Some(&token),
                &RequestOptions::default(),
            )
            .await;

        match outcome {
            Ok(parsed) => match parsed.fault {
                None => {
                    self.session.write().touch();
                    metrics::counter!("gateway.heartbeats_ok").increment(1);
                    true
                }
                Some(fault) => {
                    self.connection_lost(
                        is_auth_fault(&fault.code),
                        &format!("{}: {}", fault.code, fault.message),
                    );
                    false
                }
            },
            Err(e) => {
                self.connection_lost(e.is_auth_failure(), &e.to_string());
                false
            }
        }
    }

    /// Heartbeat detected a dead or rejected session.
    fn connection_lost(&self, auth: bool, detail: &str) {
        self.session.write().invalidate();
        tracing::warn!(system = %self.system, error = %detail, "heartbeat failed, session lost");
        metrics::counter!("gateway.heartbeat_failures").increment(1);
        if auth {
            self.events.emit(GatewayEvent::AuthenticationFailed {
                system: self.system.clone(),
            });
        }
        self.events.emit(GatewayEvent::ConnectionLost {
            system: self.system.clone(),
        });
    }

    /// An in-flight request was rejected for authentication. The session
    /// token is gone; callers must `connect()` again.
    fn auth_rejected(&self, detail: &str) {
        self.session.write().invalidate();
        tracing::warn!(system = %self.system, error = %detail, "authentication rejected, session invalidated");
        self.events.emit(GatewayEvent::AuthenticationFailed {
            system: self.system.clone(),
        });
    }

    fn map_payload(&self, operation: &str, body: &Value) -> Value {
        if operation.contains("Customer") {
            serde_json::to_value(map_customer(body)).unwrap_or_else(|_| body.clone())
        } else if operation.contains("Transaction") || operation.starts_with("Post") {
            serde_json::to_value(map_transaction(body)).unwrap_or_else(|_| body.clone())
        } else if operation.contains("Account") || operation.contains("Balance") {
            serde_json::to_value(map_account(body)).unwrap_or_else(|_| body.clone())
        } else {
            body.clone()
        }
    }
}

fn is_auth_fault(code: &str) -> bool {
    let upper = code.to_uppercase();
    upper.contains("AUTH") || upper.contains("401") || upper.contains("SESSION")
}

fn extract_warnings(body: &Value) -> Vec<String> {
    match body.get("Warnings") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::Object(map)) => match map.get("Warning") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn extract_session_token(parsed: &ParsedEnvelope) -> Option<String> {
    parsed
        .body
        .get("SessionToken")
        .or_else(|| parsed.body.get("sessionToken"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| parsed.header.get("SessionToken").cloned())
}

#[async_trait]
impl ProtocolConnector for FlexcubeConnector {
    fn system(&self) -> &str {
        &self.inner.system
    }

    async fn connect(&self) -> GatewayResult<()> {
        self.stop_heartbeat();
        self.inner.session.write().invalidate();
        tracing::info!(system = %self.inner.system, url = %self.inner.config.base_url, "connecting");

        let message_id = Uuid::new_v4().to_string();
        let credentials = json!({
            "userId": self.inner.config.username,
            "password": self.inner.config.password,
            "branchCode": self.inner.config.branch_code,
            "sourceCode": self.inner.config.source_code,
        });

        let outcome = self
            .inner
            .send_envelope(
                SESSION_SERVICE,
                "Login",
                &message_id,
                &credentials,
                None,
                &RequestOptions::default(),
            )
            .await;

        let failed = |error: GatewayError, inner: &ConnectorInner| {
            inner.session.write().invalidate();
            inner.events.emit(GatewayEvent::ConnectionFailed {
                system: inner.system.clone(),
                error: error.to_string(),
            });
            metrics::counter!("gateway.connects_failed").increment(1);
            Err(error)
        };

        let parsed = match outcome {
            Ok(parsed) => parsed,
            Err(e) => return failed(e, &self.inner),
        };
        if let Some(fault) = parsed.fault {
            return failed(
                GatewayError::Connection(format!(
                    "login rejected: {} ({})",
                    fault.message, fault.code
                )),
                &self.inner,
            );
        }
        let Some(token) = extract_session_token(&parsed) else {
            return failed(
                GatewayError::Protocol("login response carried no session token".to_string()),
                &self.inner,
            );
        };

        {
            let mut session = self.inner.session.write();
            session.establish(token);
            tracing::info!(
                system = %self.inner.system,
                token = %session.masked_token(),
                "session established"
            );
        }
        metrics::counter!("gateway.connects_ok").increment(1);
        self.inner.events.emit(GatewayEvent::Connected {
            system: self.inner.system.clone(),
        });
        self.start_heartbeat();
        Ok(())
    }

    async fn disconnect(&self) {
        self.stop_heartbeat();
        let token = {
            let session = self.inner.session.read();
            session.token().map(str::to_string)
        };
        // Best-effort logout; a failure is logged, never surfaced.
        if let Some(token) = token {
            let outcome = self
                .inner
                .send_envelope(
                    SESSION_SERVICE,
                    "Logout",
                    &Uuid::new_v4().to_string(),
                    &json!({}),
                    Some(&token),
                    &RequestOptions::default(),
                )
                .await;
            if let Err(e) = outcome {
                tracing::debug!(system = %self.inner.system, error = %e, "logout failed, clearing session anyway");
            }
        }
        self.inner.session.write().invalidate();
        self.inner.events.emit(GatewayEvent::Disconnected {
            system: self.inner.system.clone(),
        });
        tracing::info!(system = %self.inner.system, "disconnected");
    }

    async fn execute(&self, request: ConnectorRequest) -> ConnectorResponse {
        let started = Instant::now();
        let elapsed_ms = |started: Instant| started.elapsed().as_millis() as u64;

        let token = {
            let session = self.inner.session.read();
            if session.is_connected {
                session.token().map(str::to_string)
            } else {
                None
            }
        };
        let Some(token) = token else {
            return ConnectorResponse::failure(
                "NOT_CONNECTED",
                "no active session; call connect() first",
                elapsed_ms(started),
            );
        };

        let message_id = request
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::debug!(
            system = %self.inner.system,
            service = %request.service,
            operation = %request.operation,
            message_id = %message_id,
            "dispatching request"
        );

        let outcome = self
            .inner
            .send_envelope(
                &request.service,
                &request.operation,
                &message_id,
                &request.data,
                Some(&token),
                &request.options,
            )
            .await;

        let parsed = match outcome {
            Ok(parsed) => parsed,
            Err(e) if e.is_auth_failure() => {
                self.inner.auth_rejected(&e.to_string());
                let mut response =
                    ConnectorResponse::failure("AUTH_FAILED", e.to_string(), elapsed_ms(started));
                response.message_id = Some(message_id);
                return response;
            }
            Err(e) => {
                metrics::counter!("gateway.requests_failed").increment(1);
                let mut response = ConnectorResponse::failure(
                    "TRANSPORT_ERROR",
                    e.to_string(),
                    elapsed_ms(started),
                );
                response.message_id = Some(message_id);
                return response;
            }
        };

        if let Some(fault) = parsed.fault {
            if is_auth_fault(&fault.code) {
                self.inner.auth_rejected(&fault.message);
            }
            metrics::counter!("gateway.requests_failed").increment(1);
            let mut response =
                ConnectorResponse::failure(fault.code, fault.message, elapsed_ms(started));
            response.message_id = parsed
                .header
                .get("MessageId")
                .cloned()
                .or(Some(message_id));
            return response;
        }

        let warnings = extract_warnings(&parsed.body);
        let data = self.inner.map_payload(&request.operation, &parsed.body);
        metrics::counter!("gateway.requests_ok").increment(1);

        ConnectorResponse {
            status: if warnings.is_empty() {
                ResponseStatus::Success
            } else {
                ResponseStatus::Warning
            },
            error_code: None,
            error_message: None,
            data: Some(data),
            warnings,
            message_id: parsed
                .header
                .get("MessageId")
                .cloned()
                .or(Some(message_id)),
            timestamp: Utc::now(),
            processing_time_ms: elapsed_ms(started),
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.session.read().is_connected
    }
}
