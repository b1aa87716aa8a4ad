use serde::Serialize;
use thiserror::Error;

/// Failures raised while executing a transformation rule.
///
/// Configuration-class variants (missing rule/table/function, inactive
/// rule/table) are always fatal to the call. Field-class variants are fatal
/// only when the failing mapping is marked required.
#[derive(Error, Debug, Clone)]
pub enum TransformError {
    #[error("transformation rule '{0}' not found")]
    RuleNotFound(String),

    #[error("transformation rule '{0}' is inactive")]
    RuleInactive(String),

    #[error("unknown transformation function '{0}'")]
    UnknownFunction(String),

    #[error("lookup table '{0}' not found")]
    LookupTableNotFound(String),

    #[error("lookup table '{0}' is inactive")]
    LookupTableInactive(String),

    #[error("mapping '{source_field}' -> '{target_field}' failed: {reason}")]
    Mapping {
        source_field: String,
        target_field: String,
        reason: String,
    },

    #[error("cannot coerce '{source_field}' -> '{target_field}' to {data_type}: {reason}")]
    Coercion {
        source_field: String,
        target_field: String,
        data_type: String,
        reason: String,
    },
}

impl TransformError {
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::RuleNotFound(_) => "RULE_NOT_FOUND",
            TransformError::RuleInactive(_) => "RULE_INACTIVE",
            TransformError::UnknownFunction(_) => "UNKNOWN_FUNCTION",
            TransformError::LookupTableNotFound(_) => "LOOKUP_TABLE_NOT_FOUND",
            TransformError::LookupTableInactive(_) => "LOOKUP_TABLE_INACTIVE",
            TransformError::Mapping { .. } => "MAPPING_FAILED",
            TransformError::Coercion { .. } => "TYPE_COERCION_FAILED",
        }
    }

    /// Configuration-class errors abort the call regardless of which
    /// mapping tripped them.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TransformError::RuleNotFound(_)
                | TransformError::RuleInactive(_)
                | TransformError::UnknownFunction(_)
                | TransformError::LookupTableNotFound(_)
                | TransformError::LookupTableInactive(_)
        )
    }
}

/// One error or warning entry in a `TransformResult`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformIssue {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
}

impl TransformIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source_field: None,
            target_field: None,
        }
    }

    pub fn for_mapping(
        code: impl Into<String>,
        message: impl Into<String>,
        source_field: &str,
        target_field: &str,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source_field: Some(source_field.to_string()),
            target_field: Some(target_field.to_string()),
        }
    }
}

impl From<&TransformError> for TransformIssue {
    fn from(err: &TransformError) -> Self {
        let (source_field, target_field) = match err {
            TransformError::Mapping {
                source_field,
                target_field,
                ..
            }
            | TransformError::Coercion {
                source_field,
                target_field,
                ..
            } => (Some(source_field.clone()), Some(target_field.clone())),
            _ => (None, None),
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            source_field,
            target_field,
        }
    }
}
