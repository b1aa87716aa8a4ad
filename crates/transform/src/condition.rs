//! Condition evaluation for rule gates and CONDITIONAL mappings.

use crate::path::get_path;
use crate::rule::{ConditionOperator, TransformationCondition};
use serde_json::Value;

/// Evaluate a single condition against a record. A missing field fails
/// every operator except `NotEquals` and `NotIn`.
pub fn matches(record: &Value, condition: &TransformationCondition) -> bool {
    let field = get_path(record, &condition.field);
    match condition.operator {
        ConditionOperator::Equals => field.map(|v| loose_eq(v, &condition.value)).unwrap_or(false),
        ConditionOperator::NotEquals => {
            field.map(|v| !loose_eq(v, &condition.value)).unwrap_or(true)
        }
        ConditionOperator::Contains => field.map(|v| contains(v, &condition.value)).unwrap_or(false),
        ConditionOperator::StartsWith => field
            .and_then(Value::as_str)
            .zip(condition.value.as_str())
            .map(|(s, prefix)| s.starts_with(prefix))
            .unwrap_or(false),
        ConditionOperator::EndsWith => field
            .and_then(Value::as_str)
            .zip(condition.value.as_str())
            .map(|(s, suffix)| s.ends_with(suffix))
            .unwrap_or(false),
        ConditionOperator::GreaterThan => numeric_cmp(field, &condition.value)
            .map(|ord| ord == std::cmp::Ordering::Greater)
            .unwrap_or(false),
        ConditionOperator::LessThan => numeric_cmp(field, &condition.value)
            .map(|ord| ord == std::cmp::Ordering::Less)
            .unwrap_or(false),
        ConditionOperator::In => field
            .zip(condition.value.as_array())
            .map(|(v, set)| set.iter().any(|candidate| loose_eq(v, candidate)))
            .unwrap_or(false),
        ConditionOperator::NotIn => field
            .zip(condition.value.as_array())
            .map(|(v, set)| !set.iter().any(|candidate| loose_eq(v, candidate)))
            .unwrap_or(true),
    }
}

/// Evaluate an AND-composed condition list. An empty list always passes.
pub fn all_match(record: &Value, conditions: &[TransformationCondition]) -> bool {
    conditions.iter().all(|c| matches(record, c))
}

/// Equality tolerant of the wire's habit of sending numbers as strings.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle
            .as_str()
            .map(|n| s.contains(n))
            .unwrap_or_else(|| s.contains(&needle.to_string())),
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        _ => false,
    }
}

fn numeric_cmp(field: Option<&Value>, against: &Value) -> Option<std::cmp::Ordering> {
    let left = as_number(field?)?;
    let right = as_number(against)?;
    left.partial_cmp(&right)
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
