use serde::Deserialize;
use std::collections::HashMap;

/// Root gateway configuration. Loaded from environment variables
/// with the prefix `INTEGRATION_GATEWAY__` and TOML config files.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GatewayConfig {
    /// Session-oriented banking-core connectors, keyed by system name
    /// (e.g. "flexcube").
    #[serde(default)]
    pub connectors: HashMap<String, ConnectorConfig>,
    /// REST endpoints for regulatory/third-party/internal systems,
    /// keyed by system name (e.g. "cersai").
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,
    #[serde(default)]
    pub transform: TransformConfig,
}

/// SOAP protocol version spoken by a banking-core connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SoapVersion {
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
}

impl Default for SoapVersion {
    fn default() -> Self {
        SoapVersion::V1_1
    }
}

/// Per-system configuration for a session-oriented connector.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub branch_code: String,
    pub source_code: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_enable_ssl")]
    pub enable_ssl: bool,
    #[serde(default)]
    pub soap_version: SoapVersion,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

/// Per-system configuration for a REST endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Tuning for the transformation engine's lookup cache.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    #[serde(default = "default_lookup_cache_max_entries")]
    pub lookup_cache_max_entries: usize,
    #[serde(default = "default_lookup_cache_ttl_secs")]
    pub lookup_cache_ttl_secs: u64,
}

// Default functions
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_enable_ssl() -> bool {
    true
}
fn default_namespace() -> String {
    "http://integration.rbi-compliance.com/gateway".to_string()
}
fn default_heartbeat_interval_ms() -> u64 {
    45_000
}
fn default_lookup_cache_max_entries() -> usize {
    1000
}
fn default_lookup_cache_ttl_secs() -> u64 {
    300
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            lookup_cache_max_entries: default_lookup_cache_max_entries(),
            lookup_cache_ttl_secs: default_lookup_cache_ttl_secs(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("INTEGRATION_GATEWAY")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from a TOML file, with environment overrides.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("INTEGRATION_GATEWAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
