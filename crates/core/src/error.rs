use thiserror::Error;

use crate::types::IntegrationType;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication rejected: {0}")]
    Unauthorized(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transformation error: {0}")]
    Transformation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No {integration_type:?} system registered under '{system}'")]
    UnknownSystem {
        integration_type: IntegrationType,
        system: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Whether this failure invalidates the current session token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, GatewayError::Unauthorized(_))
    }
}
