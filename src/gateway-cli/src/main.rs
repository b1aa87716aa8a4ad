//! Integration Gateway — operator CLI.
//!
//! Wires the full stack from configuration (connector registry,
//! transformation engine, integration engine), executes one canonical
//! request from a JSON file, prints the response, and disconnects.

use anyhow::Context;
use clap::Parser;
use gateway_connectors::{FlexcubeConnector, ProtocolConnector, RestEndpointClient};
use gateway_core::config::GatewayConfig;
use gateway_core::event_bus::noop_sink;
use gateway_core::types::IntegrationRequest;
use gateway_router::{ConnectorRegistry, IntegrationEngine};
use gateway_transform::{
    FunctionRegistry, InMemoryRuleRepository, LookupStore, TransformationEngine,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "integration-gateway")]
#[command(about = "Compliance platform integration gateway")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (environment variables override it)
    #[arg(long, env = "INTEGRATION_GATEWAY__CONFIG")]
    config: Option<String>,

    /// Path to a JSON file holding one canonical IntegrationRequest
    #[arg(long)]
    request: String,

    /// Skip connecting banking-core connectors (REST-only smoke runs)
    #[arg(long, default_value_t = false)]
    no_connect: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "integration_gateway=info,gateway_router=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Integration Gateway starting up");

    let config = match &cli.config {
        Some(path) => GatewayConfig::load_from(path)
            .with_context(|| format!("failed loading config from {path}"))?,
        None => GatewayConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            GatewayConfig::default()
        }),
    };

    let events = noop_sink();
    let registry = Arc::new(ConnectorRegistry::new());

    for (system, connector_config) in &config.connectors {
        let connector =
            FlexcubeConnector::with_http(system.clone(), connector_config.clone(), events.clone())
                .with_context(|| format!("failed building connector for {system}"))?;
        registry.register_connector(Arc::new(connector));
    }
    for (system, endpoint_config) in &config.endpoints {
        let endpoint = RestEndpointClient::new(system.clone(), endpoint_config.clone())
            .with_context(|| format!("failed building endpoint client for {system}"))?;
        registry.register_endpoint(Arc::new(endpoint));
    }

    let transformer = Arc::new(TransformationEngine::new(
        Arc::new(InMemoryRuleRepository::new()),
        Arc::new(LookupStore::new(
            config.transform.lookup_cache_max_entries,
            config.transform.lookup_cache_ttl_secs,
        )),
        Arc::new(FunctionRegistry::with_builtins()),
    ));
    let engine = IntegrationEngine::new(registry.clone(), events).with_transformer(transformer);

    let raw = std::fs::read_to_string(&cli.request)
        .with_context(|| format!("cannot read request file {}", cli.request))?;
    let request: IntegrationRequest =
        serde_json::from_str(&raw).context("request file is not a canonical IntegrationRequest")?;

    if !cli.no_connect {
        if let Some(connector) = registry.connector(&request.system) {
            connector
                .connect()
                .await
                .with_context(|| format!("failed connecting to {}", request.system))?;
        }
    }

    let outcome = engine.execute(request).await;
    registry.disconnect_all().await;

    match outcome {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("integration failed: {e}");
            std::process::exit(1);
        }
    }
}
