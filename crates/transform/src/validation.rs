//! Validation rule execution against source or produced records.

use crate::condition::as_number;
use crate::functions::FunctionRegistry;
use crate::path::get_path;
use crate::rule::{ValidationRule, ValidationSeverity, ValidationType};
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
    pub severity: ValidationSeverity,
}

/// Result of one validation pass, with accurate pass/fail counts.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub failures: Vec<ValidationFailure>,
    pub passed: usize,
    pub failed: usize,
}

impl ValidationOutcome {
    pub fn has_errors(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.severity == ValidationSeverity::Error)
    }
}

/// Run every rule against `data`. Rules other than REQUIRED are skipped
/// (counted as passed) when the field is absent; presence is REQUIRED's
/// job.
pub fn run_validations(
    rules: &[ValidationRule],
    data: &Value,
    functions: &FunctionRegistry,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    for rule in rules {
        match check(rule, data, functions) {
            Ok(()) => outcome.passed += 1,
            Err(message) => {
                outcome.failed += 1;
                outcome.failures.push(ValidationFailure {
                    field: rule.field.clone(),
                    message,
                    severity: rule.severity,
                });
            }
        }
    }
    outcome
}

fn check(rule: &ValidationRule, data: &Value, functions: &FunctionRegistry) -> Result<(), String> {
    let value = get_path(data, &rule.field);
    match rule.validation_type {
        ValidationType::Required => match value {
            Some(v) if !v.is_null() => Ok(()),
            _ => Err(rule.error_message.clone()),
        },
        ValidationType::Format => {
            let Some(value) = value.filter(|v| !v.is_null()) else {
                return Ok(());
            };
            let pattern = rule
                .parameters
                .get("pattern")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("format validation for '{}' has no pattern", rule.field))?;
            let regex = Regex::new(pattern)
                .map_err(|e| format!("invalid pattern for '{}': {e}", rule.field))?;
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if regex.is_match(&text) {
                Ok(())
            } else {
                Err(rule.error_message.clone())
            }
        }
        ValidationType::Range => {
            let Some(value) = value.filter(|v| !v.is_null()) else {
                return Ok(());
            };
            let n = as_number(value)
                .ok_or_else(|| format!("'{}' is not numeric", rule.field))?;
            let min = rule.parameters.get("min").and_then(as_number);
            let max = rule.parameters.get("max").and_then(as_number);
            if min.map(|m| n < m).unwrap_or(false) || max.map(|m| n > m).unwrap_or(false) {
                Err(rule.error_message.clone())
            } else {
                Ok(())
            }
        }
        ValidationType::Length => {
            let Some(value) = value.filter(|v| !v.is_null()) else {
                return Ok(());
            };
            let len = match value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                other => other.to_string().chars().count(),
            };
            let min = rule
                .parameters
                .get("min")
                .and_then(as_number)
                .map(|m| m as usize);
            let max = rule
                .parameters
                .get("max")
                .and_then(as_number)
                .map(|m| m as usize);
            if min.map(|m| len < m).unwrap_or(false) || max.map(|m| len > m).unwrap_or(false) {
                Err(rule.error_message.clone())
            } else {
                Ok(())
            }
        }
        ValidationType::Custom => {
            let name = rule
                .parameters
                .get("function")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("custom validation for '{}' names no function", rule.field))?;
            let args: Vec<Value> = rule
                .parameters
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let input = value.cloned().unwrap_or(Value::Null);
            let function = functions
                .get(name)
                .ok_or_else(|| format!("unknown validation function '{name}'"))?;
            match function(&input, &args) {
                Ok(Value::Bool(true)) => Ok(()),
                Ok(_) => Err(rule.error_message.clone()),
                Err(e) => Err(format!("{}: {e}", rule.error_message)),
            }
        }
    }
}
