//! The transformation engine: interprets one rule against one record.
//!
//! Pure given its stores — no network I/O, no suspension. Concurrency
//! safety comes from the shared read-mostly registries (DashMap) and the
//! `Arc` snapshot taken of the rule at the start of every call.

use crate::condition::{as_number, matches};
use crate::error::{TransformError, TransformIssue};
use crate::functions::{format_naive, parse_datetime, stringify, FunctionRegistry};
use crate::lookup::LookupStore;
use crate::path::{get_path, set_path};
use crate::repository::RuleRepository;
use crate::rule::{
    DataType, FieldMapping, LookupTable, TransformationCondition, TransformationRule,
    TransformationType,
};
use crate::validation::{run_validations, ValidationOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub validate_input: bool,
    pub validate_output: bool,
    pub include_metadata: bool,
    pub strict_mode: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            validate_input: true,
            validate_output: false,
            include_metadata: false,
            strict_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformMetadata {
    pub rule_id: String,
    pub rule_version: u32,
    pub duration_ms: u64,
    pub fields_mapped: usize,
    pub fields_skipped: usize,
    pub validations_passed: usize,
    pub validations_failed: usize,
}

#[derive(Debug)]
pub struct TransformResult {
    pub success: bool,
    pub data: Option<Value>,
    pub errors: Vec<TransformIssue>,
    pub warnings: Vec<TransformIssue>,
    pub metadata: Option<TransformMetadata>,
}

/// One `{condition, value}` arm of a CONDITIONAL mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionalCase {
    condition: TransformationCondition,
    value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Concat,
}

pub struct TransformationEngine {
    rules: Arc<dyn RuleRepository>,
    lookups: Arc<LookupStore>,
    functions: Arc<FunctionRegistry>,
}

impl TransformationEngine {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        lookups: Arc<LookupStore>,
        functions: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            rules,
            lookups,
            functions,
        }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn add_lookup_table(&self, table: LookupTable) {
        self.lookups.add_table(table);
    }

    pub fn update_lookup_table(&self, table: LookupTable) {
        self.lookups.update_table(table);
    }

    /// Execute `rule_id` against `source`. The optional `context` record
    /// participates in condition evaluation for fields the source lacks.
    pub fn transform(
        &self,
        rule_id: &str,
        source: &Value,
        context: Option<&Value>,
        options: &TransformOptions,
    ) -> TransformResult {
        let started = Instant::now();

        let rule = match self.rules.rule(rule_id) {
            Some(rule) => rule,
            None => {
                return Self::fatal(
                    TransformIssue::new(
                        "RULE_NOT_FOUND",
                        format!("transformation rule '{rule_id}' not found"),
                    ),
                )
            }
        };
        if !rule.is_active {
            return Self::fatal(TransformIssue::new(
                "RULE_INACTIVE",
                format!("transformation rule '{rule_id}' is inactive"),
            ));
        }

        let mut warnings: Vec<TransformIssue> = Vec::new();
        let mut validations_passed = 0;
        let mut validations_failed = 0;

        // Input validation short-circuits before any mapping runs.
        if options.validate_input {
            let outcome = run_validations(&rule.validations, source, &self.functions);
            validations_passed += outcome.passed;
            validations_failed += outcome.failed;
            if outcome.has_errors() {
                let mut result = Self::fatal_many(Self::failure_issues(&outcome));
                result.metadata = options.include_metadata.then(|| {
                    Self::metadata(&rule, started, 0, 0, validations_passed, validations_failed)
                });
                return result;
            }
            warnings.extend(Self::warning_issues(&outcome));
        }

        // Conditions gate the whole rule, never individual mappings.
        if !self.conditions_pass(&rule, source, context) {
            metrics::counter!("gateway.transform_condition_skips").increment(1);
            let mut result = Self::fatal(TransformIssue::new(
                "CONDITION_FAILED",
                format!("conditions for rule '{rule_id}' were not met"),
            ));
            result.metadata = options.include_metadata.then(|| {
                Self::metadata(&rule, started, 0, 0, validations_passed, validations_failed)
            });
            return result;
        }

        let mut output = Value::Object(Map::new());
        let mut fields_mapped = 0;
        let mut fields_skipped = 0;

        for mapping in &rule.mappings {
            match self.apply_mapping(mapping, source) {
                Ok(Some(value)) => {
                    set_path(&mut output, &mapping.target_field, value);
                    fields_mapped += 1;
                }
                Ok(None) => fields_skipped += 1,
                Err(err) if err.is_configuration() || mapping.is_required => {
                    tracing::error!(
                        rule = %rule.id,
                        source_field = %mapping.source_field,
                        target_field = %mapping.target_field,
                        error = %err,
                        "required mapping failed, aborting transform"
                    );
                    let mut issue = TransformIssue::from(&err);
                    if issue.source_field.is_none() {
                        issue.source_field = Some(mapping.source_field.clone());
                        issue.target_field = Some(mapping.target_field.clone());
                    }
                    let mut result = Self::fatal(issue);
                    result.metadata = options.include_metadata.then(|| {
                        Self::metadata(
                            &rule,
                            started,
                            fields_mapped,
                            fields_skipped,
                            validations_passed,
                            validations_failed,
                        )
                    });
                    return result;
                }
                Err(err) => {
                    tracing::warn!(
                        rule = %rule.id,
                        source_field = %mapping.source_field,
                        target_field = %mapping.target_field,
                        error = %err,
                        "optional mapping failed, field omitted"
                    );
                    let mut issue = TransformIssue::from(&err);
                    if issue.source_field.is_none() {
                        issue.source_field = Some(mapping.source_field.clone());
                        issue.target_field = Some(mapping.target_field.clone());
                    }
                    warnings.push(issue);
                    fields_skipped += 1;
                }
            }
        }

        let mut success = true;
        let mut errors: Vec<TransformIssue> = Vec::new();

        // Output validation: strict mode fails the call, otherwise the
        // failures degrade to warnings.
        if options.validate_output {
            let outcome = run_validations(&rule.validations, &output, &self.functions);
            validations_passed += outcome.passed;
            validations_failed += outcome.failed;
            if outcome.has_errors() && options.strict_mode {
                success = false;
                errors.extend(Self::failure_issues(&outcome));
            } else {
                warnings.extend(Self::failure_issues(&outcome));
            }
            warnings.extend(Self::warning_issues(&outcome));
        }

        metrics::counter!("gateway.transforms_executed").increment(1);

        TransformResult {
            success,
            data: success.then_some(output),
            errors,
            warnings,
            metadata: options.include_metadata.then(|| {
                Self::metadata(
                    &rule,
                    started,
                    fields_mapped,
                    fields_skipped,
                    validations_passed,
                    validations_failed,
                )
            }),
        }
    }

    fn conditions_pass(
        &self,
        rule: &TransformationRule,
        source: &Value,
        context: Option<&Value>,
    ) -> bool {
        rule.conditions.iter().all(|condition| {
            if get_path(source, &condition.field).is_some() {
                matches(source, condition)
            } else if let Some(ctx) = context.filter(|c| get_path(c, &condition.field).is_some()) {
                matches(ctx, condition)
            } else {
                matches(source, condition)
            }
        })
    }

    /// Apply one mapping. `Ok(None)` means the target field is omitted.
    fn apply_mapping(
        &self,
        mapping: &FieldMapping,
        source: &Value,
    ) -> Result<Option<Value>, TransformError> {
        let original = get_path(source, &mapping.source_field).cloned();

        let transformed = match mapping.transformation_type {
            TransformationType::Direct => original,
            TransformationType::Function => Some(self.apply_function(mapping, &original)?),
            TransformationType::Lookup => self.apply_lookup(mapping, original)?,
            TransformationType::Conditional => self.apply_conditional(mapping, source, original)?,
            TransformationType::Aggregate => self.apply_aggregate(mapping, source)?,
        };

        // Defaults fill in for null as well as absent values.
        let value = match transformed {
            None => mapping.default_value.clone(),
            Some(Value::Null) => mapping.default_value.clone().or(Some(Value::Null)),
            present => present,
        };

        match value {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(Value::Null)),
            Some(v) => Self::coerce(v, mapping).map(Some),
        }
    }

    fn apply_function(
        &self,
        mapping: &FieldMapping,
        original: &Option<Value>,
    ) -> Result<Value, TransformError> {
        let name = mapping.transformation_function.as_deref().ok_or_else(|| {
            TransformError::Mapping {
                source_field: mapping.source_field.clone(),
                target_field: mapping.target_field.clone(),
                reason: "FUNCTION mapping names no transformationFunction".to_string(),
            }
        })?;
        let parameters = Self::parameter_list(mapping);
        let input = original.clone().unwrap_or(Value::Null);
        self.functions
            .invoke(name, &input, &parameters)?
            .map_err(|reason| TransformError::Mapping {
                source_field: mapping.source_field.clone(),
                target_field: mapping.target_field.clone(),
                reason,
            })
    }

    fn apply_lookup(
        &self,
        mapping: &FieldMapping,
        original: Option<Value>,
    ) -> Result<Option<Value>, TransformError> {
        let table_id = mapping
            .parameters
            .as_ref()
            .and_then(|p| p.get("tableId"))
            .and_then(Value::as_str)
            .ok_or_else(|| TransformError::Mapping {
                source_field: mapping.source_field.clone(),
                target_field: mapping.target_field.clone(),
                reason: "LOOKUP mapping names no tableId".to_string(),
            })?;

        let Some(original) = original else {
            return Ok(None);
        };

        // Fallback order: table hit, then the mapping's configured
        // default, then the original value untouched.
        match self.lookups.resolve(table_id, &stringify(&original))? {
            Some(hit) => Ok(Some(hit)),
            None => Ok(Some(
                mapping
                    .parameters
                    .as_ref()
                    .and_then(|p| p.get("defaultValue"))
                    .cloned()
                    .unwrap_or(original),
            )),
        }
    }

    fn apply_conditional(
        &self,
        mapping: &FieldMapping,
        source: &Value,
        original: Option<Value>,
    ) -> Result<Option<Value>, TransformError> {
        let cases: Vec<ConditionalCase> = mapping
            .parameters
            .as_ref()
            .and_then(|p| p.get("cases"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| TransformError::Mapping {
                source_field: mapping.source_field.clone(),
                target_field: mapping.target_field.clone(),
                reason: format!("CONDITIONAL cases are malformed: {e}"),
            })?
            .unwrap_or_default();

        // Cases test the whole source record, not the mapped field.
        for case in &cases {
            if matches(source, &case.condition) {
                return Ok(Some(case.value.clone()));
            }
        }
        Ok(mapping
            .parameters
            .as_ref()
            .and_then(|p| p.get("defaultValue"))
            .cloned()
            .or(original))
    }

    fn apply_aggregate(
        &self,
        mapping: &FieldMapping,
        source: &Value,
    ) -> Result<Option<Value>, TransformError> {
        let mapping_err = |reason: String| TransformError::Mapping {
            source_field: mapping.source_field.clone(),
            target_field: mapping.target_field.clone(),
            reason,
        };

        let parameters = mapping
            .parameters
            .as_ref()
            .ok_or_else(|| mapping_err("AGGREGATE mapping has no parameters".to_string()))?;
        let op: AggregateOp = parameters
            .get("operation")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| mapping_err(format!("unknown aggregate operation: {e}")))?
            .ok_or_else(|| mapping_err("AGGREGATE mapping names no operation".to_string()))?;
        let fields: Vec<String> = parameters
            .get("fields")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| mapping_err(format!("aggregate fields are malformed: {e}")))?
            .unwrap_or_default();

        // Null and missing inputs are skipped, never counted or summed.
        let values: Vec<Value> = fields
            .iter()
            .filter_map(|f| get_path(source, f))
            .filter(|v| !v.is_null())
            .cloned()
            .collect();

        if op == AggregateOp::Count {
            return Ok(Some(json!(values.len())));
        }
        if op == AggregateOp::Concat {
            let separator = parameters
                .get("separator")
                .and_then(Value::as_str)
                .unwrap_or("");
            return Ok(Some(json!(values
                .iter()
                .map(stringify)
                .collect::<Vec<_>>()
                .join(separator))));
        }

        let numbers = values
            .iter()
            .map(|v| {
                as_number(v).ok_or_else(|| {
                    mapping_err(format!("aggregate input '{v}' is not numeric"))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let result = match op {
            AggregateOp::Sum => Some(numbers.iter().sum::<f64>()),
            AggregateOp::Avg => (!numbers.is_empty())
                .then(|| numbers.iter().sum::<f64>() / numbers.len() as f64),
            AggregateOp::Min => numbers.iter().copied().reduce(f64::min),
            AggregateOp::Max => numbers.iter().copied().reduce(f64::max),
            AggregateOp::Count | AggregateOp::Concat => unreachable!("handled above"),
        };
        match result {
            Some(n) => serde_json::Number::from_f64(n)
                .map(|n| Some(Value::Number(n)))
                .ok_or_else(|| mapping_err(format!("aggregate produced non-finite {n}"))),
            None => Ok(None),
        }
    }

    fn parameter_list(mapping: &FieldMapping) -> Vec<Value> {
        match &mapping.parameters {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Object(map)) => map
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn coerce(value: Value, mapping: &FieldMapping) -> Result<Value, TransformError> {
        let coercion_err = |reason: String| TransformError::Coercion {
            source_field: mapping.source_field.clone(),
            target_field: mapping.target_field.clone(),
            data_type: format!("{:?}", mapping.data_type),
            reason,
        };

        match mapping.data_type {
            DataType::String => Ok(Value::String(stringify(&value))),
            DataType::Number => {
                if value.is_number() {
                    Ok(value)
                } else {
                    as_number(&value)
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .ok_or_else(|| coercion_err(format!("'{value}' is not numeric")))
                }
            }
            DataType::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::Number(n) => Ok(json!(n.as_f64().unwrap_or(0.0) != 0.0)),
                Value::String(s) => match s.to_lowercase().as_str() {
                    "true" | "1" | "y" | "yes" => Ok(json!(true)),
                    "false" | "0" | "n" | "no" => Ok(json!(false)),
                    other => Err(coercion_err(format!("'{other}' is not a boolean"))),
                },
                other => Err(coercion_err(format!("'{other}' is not a boolean"))),
            },
            DataType::Date => {
                let raw = stringify(&value);
                let (dt, has_time) = parse_datetime(&raw).map_err(&coercion_err)?;
                Ok(json!(match &mapping.format {
                    Some(pattern) => format_naive(&dt, pattern).map_err(&coercion_err)?,
                    None if has_time => dt.and_utc().to_rfc3339(),
                    None => dt.date().format("%Y-%m-%d").to_string(),
                }))
            }
            DataType::Object => {
                if value.is_object() {
                    Ok(value)
                } else {
                    Err(coercion_err(format!("'{value}' is not an object")))
                }
            }
            DataType::Array => {
                if value.is_array() {
                    Ok(value)
                } else {
                    Ok(Value::Array(vec![value]))
                }
            }
        }
    }

    fn metadata(
        rule: &TransformationRule,
        started: Instant,
        fields_mapped: usize,
        fields_skipped: usize,
        validations_passed: usize,
        validations_failed: usize,
    ) -> TransformMetadata {
        TransformMetadata {
            rule_id: rule.id.clone(),
            rule_version: rule.version,
            duration_ms: started.elapsed().as_millis() as u64,
            fields_mapped,
            fields_skipped,
            validations_passed,
            validations_failed,
        }
    }

    fn failure_issues(outcome: &ValidationOutcome) -> Vec<TransformIssue> {
        outcome
            .failures
            .iter()
            .filter(|f| f.severity == crate::rule::ValidationSeverity::Error)
            .map(|f| TransformIssue {
                code: "VALIDATION_FAILED".to_string(),
                message: f.message.clone(),
                source_field: Some(f.field.clone()),
                target_field: None,
            })
            .collect()
    }

    fn warning_issues(outcome: &ValidationOutcome) -> Vec<TransformIssue> {
        outcome
            .failures
            .iter()
            .filter(|f| f.severity == crate::rule::ValidationSeverity::Warning)
            .map(|f| TransformIssue {
                code: "VALIDATION_WARNING".to_string(),
                message: f.message.clone(),
                source_field: Some(f.field.clone()),
                target_field: None,
            })
            .collect()
    }

    fn fatal(issue: TransformIssue) -> TransformResult {
        Self::fatal_many(vec![issue])
    }

    fn fatal_many(errors: Vec<TransformIssue>) -> TransformResult {
        TransformResult {
            success: false,
            data: None,
            errors,
            warnings: Vec::new(),
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRuleRepository;
    use crate::rule::{
        ConditionOperator, ValidationRule, ValidationSeverity, ValidationType,
    };
    use std::collections::HashMap;

    fn engine_with(rule: TransformationRule) -> TransformationEngine {
        let rules = InMemoryRuleRepository::new();
        rules.upsert(rule);
        TransformationEngine::new(
            Arc::new(rules),
            Arc::new(LookupStore::new(1000, 300)),
            Arc::new(FunctionRegistry::with_builtins()),
        )
    }

    fn direct(source: &str, target: &str) -> FieldMapping {
        FieldMapping {
            source_field: source.to_string(),
            target_field: target.to_string(),
            transformation_type: TransformationType::Direct,
            transformation_function: None,
            parameters: None,
            default_value: None,
            is_required: false,
            data_type: DataType::String,
            format: None,
        }
    }

    fn rule_with(mappings: Vec<FieldMapping>) -> TransformationRule {
        TransformationRule {
            id: "r1".to_string(),
            source_format: "canonical".to_string(),
            target_format: "wire".to_string(),
            mappings,
            conditions: Vec::new(),
            validations: Vec::new(),
            is_active: true,
            version: 1,
        }
    }

    #[test]
    fn missing_rule_is_fatal() {
        let engine = engine_with(rule_with(vec![]));
        let result = engine.transform("nope", &json!({}), None, &TransformOptions::default());
        assert!(!result.success);
        assert_eq!(result.errors[0].code, "RULE_NOT_FOUND");
    }

    #[test]
    fn inactive_rule_is_fatal() {
        let mut rule = rule_with(vec![]);
        rule.is_active = false;
        let engine = engine_with(rule);
        let result = engine.transform("r1", &json!({}), None, &TransformOptions::default());
        assert_eq!(result.errors[0].code, "RULE_INACTIVE");
    }

    #[test]
    fn all_direct_mappings_are_identity_on_mapped_fields() {
        let engine = engine_with(rule_with(vec![
            direct("customer.name", "customer.name"),
            direct("customer.branch", "customer.branch"),
        ]));
        let source = json!({ "customer": { "name": "Asha", "branch": "001" } });
        let result = engine.transform("r1", &source, None, &TransformOptions::default());
        assert!(result.success);
        assert_eq!(result.data.unwrap(), source);
    }

    #[test]
    fn required_mapping_failure_aborts_with_field_reference() {
        let mut failing = direct("amount", "out.amount");
        failing.transformation_type = TransformationType::Function;
        failing.transformation_function = Some("round".to_string());
        failing.is_required = true;

        let engine = engine_with(rule_with(vec![direct("ok", "ok"), failing]));
        let result = engine.transform(
            "r1",
            &json!({ "ok": "fine", "amount": "not-a-number" }),
            None,
            &TransformOptions::default(),
        );
        assert!(!result.success);
        assert!(result.data.is_none());
        let issue = &result.errors[0];
        assert_eq!(issue.source_field.as_deref(), Some("amount"));
        assert_eq!(issue.target_field.as_deref(), Some("out.amount"));
    }

    #[test]
    fn optional_mapping_failure_degrades_to_warning() {
        let mut failing = direct("amount", "out.amount");
        failing.transformation_type = TransformationType::Function;
        failing.transformation_function = Some("round".to_string());
        failing.is_required = false;

        let engine = engine_with(rule_with(vec![direct("ok", "ok"), failing]));
        let result = engine.transform(
            "r1",
            &json!({ "ok": "fine", "amount": "not-a-number" }),
            None,
            &TransformOptions::default(),
        );
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data, json!({ "ok": "fine" }));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].source_field.as_deref(), Some("amount"));
    }

    #[test]
    fn unknown_function_is_fatal_even_when_optional() {
        let mut failing = direct("x", "y");
        failing.transformation_type = TransformationType::Function;
        failing.transformation_function = Some("noSuchFunction".to_string());
        failing.is_required = false;

        let engine = engine_with(rule_with(vec![failing]));
        let result = engine.transform("r1", &json!({ "x": 1 }), None, &TransformOptions::default());
        assert!(!result.success);
        assert_eq!(result.errors[0].code, "UNKNOWN_FUNCTION");
    }

    #[test]
    fn lookup_fallback_precedence() {
        let mut lookup = direct("currency", "out.currency");
        lookup.transformation_type = TransformationType::Lookup;
        lookup.parameters = Some(json!({ "tableId": "ccy", "defaultValue": "000" }));

        let engine = engine_with(rule_with(vec![lookup]));
        engine.add_lookup_table(LookupTable {
            id: "ccy".to_string(),
            mappings: HashMap::from([("INR".to_string(), json!("356"))]),
            is_active: true,
            cache_enabled: true,
            ttl: None,
        });

        // Table hit wins.
        let hit = engine.transform(
            "r1",
            &json!({ "currency": "INR" }),
            None,
            &TransformOptions::default(),
        );
        assert_eq!(hit.data.unwrap(), json!({ "out": { "currency": "356" } }));

        // Miss falls back to the configured default.
        let miss = engine.transform(
            "r1",
            &json!({ "currency": "XYZ" }),
            None,
            &TransformOptions::default(),
        );
        assert_eq!(miss.data.unwrap(), json!({ "out": { "currency": "000" } }));
    }

    #[test]
    fn lookup_without_default_returns_original() {
        let mut lookup = direct("currency", "currency");
        lookup.transformation_type = TransformationType::Lookup;
        lookup.parameters = Some(json!({ "tableId": "ccy" }));

        let engine = engine_with(rule_with(vec![lookup]));
        engine.add_lookup_table(LookupTable {
            id: "ccy".to_string(),
            mappings: HashMap::new(),
            is_active: true,
            cache_enabled: false,
            ttl: None,
        });

        let result = engine.transform(
            "r1",
            &json!({ "currency": "XYZ" }),
            None,
            &TransformOptions::default(),
        );
        assert_eq!(result.data.unwrap(), json!({ "currency": "XYZ" }));
    }

    #[test]
    fn lookup_against_missing_table_is_fatal() {
        let mut lookup = direct("currency", "currency");
        lookup.transformation_type = TransformationType::Lookup;
        lookup.parameters = Some(json!({ "tableId": "ghost" }));
        lookup.is_required = false;

        let engine = engine_with(rule_with(vec![lookup]));
        let result = engine.transform(
            "r1",
            &json!({ "currency": "INR" }),
            None,
            &TransformOptions::default(),
        );
        // Configuration error, fatal despite the mapping being optional.
        assert!(!result.success);
        assert_eq!(result.errors[0].code, "LOOKUP_TABLE_NOT_FOUND");
    }

    #[test]
    fn failed_condition_skips_rule_without_partial_output() {
        let mut rule = rule_with(vec![direct("a", "a")]);
        rule.conditions = vec![TransformationCondition {
            field: "kind".to_string(),
            operator: ConditionOperator::Equals,
            value: json!("SAVINGS"),
            action: None,
        }];
        let engine = engine_with(rule);
        let result = engine.transform(
            "r1",
            &json!({ "a": 1, "kind": "CURRENT" }),
            None,
            &TransformOptions::default(),
        );
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.errors[0].code, "CONDITION_FAILED");
    }

    #[test]
    fn conditions_may_read_the_context_record() {
        let mut rule = rule_with(vec![direct("a", "a")]);
        rule.conditions = vec![TransformationCondition {
            field: "channel".to_string(),
            operator: ConditionOperator::Equals,
            value: json!("BRANCH"),
            action: None,
        }];
        let engine = engine_with(rule);
        let result = engine.transform(
            "r1",
            &json!({ "a": 1 }),
            Some(&json!({ "channel": "BRANCH" })),
            &TransformOptions::default(),
        );
        assert!(result.success);
    }

    #[test]
    fn aggregate_sum_skips_nulls() {
        let mut agg = direct("", "total");
        agg.transformation_type = TransformationType::Aggregate;
        agg.data_type = DataType::Number;
        agg.parameters = Some(json!({ "operation": "SUM", "fields": ["a", "b", "c"] }));

        let engine = engine_with(rule_with(vec![agg]));
        let result = engine.transform(
            "r1",
            &json!({ "a": 10, "b": null, "c": 5 }),
            None,
            &TransformOptions::default(),
        );
        assert_eq!(result.data.unwrap(), json!({ "total": 15.0 }));
    }

    #[test]
    fn aggregate_count_counts_non_null_only() {
        let mut agg = direct("", "present");
        agg.transformation_type = TransformationType::Aggregate;
        agg.data_type = DataType::Number;
        agg.parameters = Some(json!({ "operation": "COUNT", "fields": ["a", "b", "c", "d"] }));

        let engine = engine_with(rule_with(vec![agg]));
        let result = engine.transform(
            "r1",
            &json!({ "a": 1, "b": null, "c": "x" }),
            None,
            &TransformOptions::default(),
        );
        assert_eq!(result.data.unwrap(), json!({ "present": 2 }));
    }

    #[test]
    fn conditional_mapping_first_match_wins() {
        let mut cond = direct("riskScore", "riskBand");
        cond.transformation_type = TransformationType::Conditional;
        cond.parameters = Some(json!({
            "cases": [
                { "condition": { "field": "riskScore", "operator": "GREATER_THAN", "value": 75 }, "value": "HIGH" },
                { "condition": { "field": "riskScore", "operator": "GREATER_THAN", "value": 40 }, "value": "MEDIUM" }
            ],
            "defaultValue": "LOW"
        }));

        let engine = engine_with(rule_with(vec![cond.clone()]));
        let high = engine.transform("r1", &json!({ "riskScore": 90 }), None, &TransformOptions::default());
        assert_eq!(high.data.unwrap(), json!({ "riskBand": "HIGH" }));
        let medium = engine.transform("r1", &json!({ "riskScore": 50 }), None, &TransformOptions::default());
        assert_eq!(medium.data.unwrap(), json!({ "riskBand": "MEDIUM" }));
        let low = engine.transform("r1", &json!({ "riskScore": 10 }), None, &TransformOptions::default());
        assert_eq!(low.data.unwrap(), json!({ "riskBand": "LOW" }));
    }

    #[test]
    fn input_validation_short_circuits_before_mappings() {
        let mut rule = rule_with(vec![direct("a", "a")]);
        rule.validations = vec![ValidationRule {
            field: "mandatory".to_string(),
            validation_type: ValidationType::Required,
            parameters: Value::Null,
            error_message: "mandatory is missing".to_string(),
            severity: ValidationSeverity::Error,
        }];
        let engine = engine_with(rule);
        let result = engine.transform("r1", &json!({ "a": 1 }), None, &TransformOptions::default());
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.errors[0].code, "VALIDATION_FAILED");
    }

    #[test]
    fn output_validation_strict_vs_lenient() {
        let mut rule = rule_with(vec![direct("a", "b")]);
        rule.validations = vec![ValidationRule {
            field: "c".to_string(),
            validation_type: ValidationType::Required,
            parameters: Value::Null,
            error_message: "c is missing from output".to_string(),
            severity: ValidationSeverity::Error,
        }];
        let engine = engine_with(rule);
        let options = TransformOptions {
            validate_input: false,
            validate_output: true,
            include_metadata: false,
            strict_mode: false,
        };
        let lenient = engine.transform("r1", &json!({ "a": 1 }), None, &options);
        assert!(lenient.success);
        assert!(!lenient.warnings.is_empty());

        let strict = engine.transform(
            "r1",
            &json!({ "a": 1 }),
            None,
            &TransformOptions {
                strict_mode: true,
                ..options
            },
        );
        assert!(!strict.success);
        assert_eq!(strict.errors[0].code, "VALIDATION_FAILED");
    }

    #[test]
    fn metadata_counts_are_accurate() {
        let mut rule = rule_with(vec![direct("a", "a"), direct("missing", "m")]);
        rule.validations = vec![ValidationRule {
            field: "a".to_string(),
            validation_type: ValidationType::Required,
            parameters: Value::Null,
            error_message: "a is missing".to_string(),
            severity: ValidationSeverity::Error,
        }];
        let engine = engine_with(rule);
        let result = engine.transform(
            "r1",
            &json!({ "a": 1 }),
            None,
            &TransformOptions {
                include_metadata: true,
                ..TransformOptions::default()
            },
        );
        let metadata = result.metadata.unwrap();
        assert_eq!(metadata.fields_mapped, 1);
        assert_eq!(metadata.fields_skipped, 1);
        assert_eq!(metadata.validations_passed, 1);
        assert_eq!(metadata.validations_failed, 0);
        assert_eq!(metadata.rule_version, 1);
    }

    #[test]
    fn defaults_apply_to_absent_values() {
        let mut mapping = direct("missing", "filled");
        mapping.default_value = Some(json!("fallback"));
        let engine = engine_with(rule_with(vec![mapping]));
        let result = engine.transform("r1", &json!({}), None, &TransformOptions::default());
        assert_eq!(result.data.unwrap(), json!({ "filled": "fallback" }));
    }

    #[test]
    fn coercion_to_declared_types() {
        let mut number = direct("n", "n");
        number.data_type = DataType::Number;
        let mut boolean = direct("b", "b");
        boolean.data_type = DataType::Boolean;
        let mut date = direct("d", "d");
        date.data_type = DataType::Date;
        date.format = Some("%d/%m/%Y".to_string());
        let mut array = direct("s", "s");
        array.data_type = DataType::Array;

        let engine = engine_with(rule_with(vec![number, boolean, date, array]));
        let result = engine.transform(
            "r1",
            &json!({ "n": "42.5", "b": "Y", "d": "2026-03-01", "s": "lone" }),
            None,
            &TransformOptions::default(),
        );
        assert!(result.success);
        assert_eq!(
            result.data.unwrap(),
            json!({ "n": 42.5, "b": true, "d": "01/03/2026", "s": ["lone"] })
        );
    }

    #[test]
    fn rule_updates_only_affect_subsequent_calls() {
        let rules = Arc::new(InMemoryRuleRepository::new());
        rules.upsert(rule_with(vec![direct("a", "old")]));
        let engine = TransformationEngine::new(
            rules.clone(),
            Arc::new(LookupStore::new(10, 60)),
            Arc::new(FunctionRegistry::with_builtins()),
        );

        let before = engine.transform("r1", &json!({ "a": 1 }), None, &TransformOptions::default());
        assert_eq!(before.data.unwrap(), json!({ "old": "1" }));

        rules.upsert(rule_with(vec![direct("a", "new")]));
        let after = engine.transform("r1", &json!({ "a": 1 }), None, &TransformOptions::default());
        assert_eq!(after.data.unwrap(), json!({ "new": "1" }));
    }
}
