//! Transformation rule documents as consumed from the external rule store.
//!
//! These are plain structured documents; the store's persistence technology
//! is irrelevant here. A rule referenced by an in-flight transform is held
//! behind an `Arc`, so admin updates only affect subsequent calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRule {
    pub id: String,
    pub source_format: String,
    pub target_format: String,
    pub mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub conditions: Vec<TransformationCondition>,
    #[serde(default)]
    pub validations: Vec<ValidationRule>,
    pub is_active: bool,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

/// One declarative source-path → target-path mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    pub transformation_type: TransformationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub is_required: bool,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationType {
    Direct,
    Function,
    Lookup,
    Conditional,
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
}

/// Gate deciding whether a rule runs at all. The condition list is
/// AND-composed; a single failing condition skips the whole rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    In,
    NotIn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    pub field: String,
    pub validation_type: ValidationType,
    #[serde(default)]
    pub parameters: Value,
    pub error_message: String,
    #[serde(default)]
    pub severity: ValidationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationType {
    Required,
    Format,
    Range,
    Length,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationSeverity {
    Error,
    Warning,
}

impl Default for ValidationSeverity {
    fn default() -> Self {
        ValidationSeverity::Error
    }
}

/// Key→value dictionary translating coded values during transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupTable {
    pub id: String,
    pub mappings: HashMap<String, Value>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Per-entry cache TTL in seconds; the store default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

fn default_true() -> bool {
    true
}
