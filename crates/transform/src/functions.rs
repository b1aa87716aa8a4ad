//! Built-in transformation function catalogue and the runtime registry.
//!
//! Rule documents reference functions by name (`"maskAccountNumber"`).
//! Callers may register or unregister custom functions at runtime;
//! registering an existing name overwrites it silently.

use crate::condition::as_number;
use crate::error::TransformError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

/// A pure transformation function: `(value, parameters) -> value`.
pub type TransformFn = dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync;

pub struct FunctionRegistry {
    functions: DashMap<String, Arc<TransformFn>>,
}

impl FunctionRegistry {
    /// Empty registry with no functions at all (mostly for tests).
    pub fn empty() -> Self {
        Self {
            functions: DashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in catalogue.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register("toUpperCase", |v, _| Ok(json!(stringify(v).to_uppercase())));
        registry.register("toLowerCase", |v, _| Ok(json!(stringify(v).to_lowercase())));
        registry.register("trim", |v, _| Ok(json!(stringify(v).trim())));
        registry.register("substring", substring);
        registry.register("replace", replace);
        registry.register("padLeft", |v, p| pad(v, p, true));
        registry.register("padRight", |v, p| pad(v, p, false));
        registry.register("parseNumber", parse_number);
        registry.register("round", round);
        registry.register("abs", abs);
        registry.register("formatCurrency", format_currency);
        registry.register("formatDate", format_date);
        registry.register("addDays", add_days);
        registry.register("now", |_, _| Ok(json!(Utc::now().to_rfc3339())));
        registry.register("join", join);
        registry.register("split", split);
        registry.register("first", |v, _| first_last(v, true));
        registry.register("last", |v, _| first_last(v, false));
        registry.register("length", length);
        registry.register("ifNull", |v, p| {
            if v.is_null() {
                Ok(p.first().cloned().unwrap_or(Value::Null))
            } else {
                Ok(v.clone())
            }
        });
        registry.register("ifEmpty", |v, p| {
            let empty = v.is_null() || v.as_str().map(str::is_empty).unwrap_or(false);
            if empty {
                Ok(p.first().cloned().unwrap_or(Value::Null))
            } else {
                Ok(v.clone())
            }
        });
        registry.register("conditional", |v, p| {
            let pick = if truthy(v) { p.first() } else { p.get(1) };
            Ok(pick.cloned().unwrap_or(Value::Null))
        });
        registry.register("formatAccountNumber", format_account_number);
        registry.register("validateIFSC", validate_ifsc);
        registry.register("formatPAN", format_pan);
        registry.register("maskAccountNumber", mask_account_number);
        registry
    }

    /// Register a function by name, silently overwriting any existing one.
    pub fn register<F>(&self, name: &str, function: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    /// Remove a function by name; returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<TransformFn>> {
        self.functions.get(name).map(|f| f.clone())
    }

    /// Invoke a function. An unknown name is a configuration error; a
    /// failure inside the function is reported as a plain message for the
    /// caller to classify against the owning mapping.
    pub fn invoke(
        &self,
        name: &str,
        value: &Value,
        parameters: &[Value],
    ) -> Result<Result<Value, String>, TransformError> {
        let function = self
            .get(name)
            .ok_or_else(|| TransformError::UnknownFunction(name.to_string()))?;
        Ok(function(value, parameters))
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ─── String helpers ──────────────────────────────────────────────────

pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn number_value(n: f64) -> Result<Value, String> {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| format!("result {n} is not a finite number"))
}

fn usize_param(params: &[Value], index: usize) -> Option<usize> {
    params.get(index).and_then(as_number).map(|n| n as usize)
}

fn substring(value: &Value, params: &[Value]) -> Result<Value, String> {
    let chars: Vec<char> = stringify(value).chars().collect();
    let start = usize_param(params, 0).unwrap_or(0).min(chars.len());
    let end = usize_param(params, 1).unwrap_or(chars.len()).min(chars.len());
    let end = end.max(start);
    Ok(json!(chars[start..end].iter().collect::<String>()))
}

fn replace(value: &Value, params: &[Value]) -> Result<Value, String> {
    let from = params
        .first()
        .map(stringify)
        .ok_or("replace requires a search parameter")?;
    let to = params.get(1).map(stringify).unwrap_or_default();
    Ok(json!(stringify(value).replace(&from, &to)))
}

fn pad(value: &Value, params: &[Value], left: bool) -> Result<Value, String> {
    let width = usize_param(params, 0).ok_or("pad requires a target length")?;
    let pad_char = params
        .get(1)
        .map(stringify)
        .and_then(|s| s.chars().next())
        .unwrap_or(' ');
    let s = stringify(value);
    let current = s.chars().count();
    if current >= width {
        return Ok(json!(s));
    }
    let padding: String = std::iter::repeat(pad_char).take(width - current).collect();
    Ok(json!(if left {
        format!("{padding}{s}")
    } else {
        format!("{s}{padding}")
    }))
}

// ─── Numeric helpers ─────────────────────────────────────────────────

fn parse_number(value: &Value, _params: &[Value]) -> Result<Value, String> {
    if value.is_number() {
        return Ok(value.clone());
    }
    let cleaned = stringify(value).replace(',', "");
    let cleaned = cleaned.trim();
    cleaned
        .parse::<f64>()
        .map_err(|_| format!("cannot parse '{cleaned}' as a number"))
        .and_then(number_value)
}

fn round(value: &Value, params: &[Value]) -> Result<Value, String> {
    let n = as_number(value).ok_or("round requires a numeric value")?;
    let decimals = usize_param(params, 0).unwrap_or(0) as u32;
    let factor = 10f64.powi(decimals as i32);
    number_value((n * factor).round() / factor)
}

fn abs(value: &Value, _params: &[Value]) -> Result<Value, String> {
    let n = as_number(value).ok_or("abs requires a numeric value")?;
    number_value(n.abs())
}

fn format_currency(value: &Value, params: &[Value]) -> Result<Value, String> {
    let n = as_number(value).ok_or("formatCurrency requires a numeric value")?;
    let symbol = params.first().map(stringify).unwrap_or_else(|| "₹".to_string());
    let decimals = usize_param(params, 1).unwrap_or(2);
    Ok(json!(format!(
        "{symbol}{}",
        indian_grouped(n, decimals)
    )))
}

/// Indian digit grouping: the last three integer digits, then groups of
/// two ("12,34,567.00").
fn indian_grouped(n: f64, decimals: usize) -> String {
    let negative = n < 0.0;
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed, None),
    };
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    let len = digits.len();
    for (i, c) in digits.iter().enumerate() {
        grouped.push(*c);
        let remaining = len - i - 1;
        let boundary = remaining == 3 || (remaining > 3 && (remaining - 3) % 2 == 0);
        if boundary {
            grouped.push(',');
        }
    }
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

// ─── Date helpers ────────────────────────────────────────────────────

/// Accepted input shapes, in order: RFC 3339, `%Y-%m-%d %H:%M:%S`,
/// `%Y-%m-%d`.
pub(crate) fn parse_datetime(raw: &str) -> Result<(NaiveDateTime, bool), String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok((dt.naive_utc(), true));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok((dt, true));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok((
            d.and_hms_opt(0, 0, 0).expect("midnight is always valid"),
            false,
        ));
    }
    Err(format!("cannot parse '{raw}' as a date"))
}

/// Render with a caller-supplied strftime pattern without panicking on a
/// bad specifier (chrono reports those through `fmt::Error`).
pub(crate) fn format_naive(dt: &NaiveDateTime, pattern: &str) -> Result<String, String> {
    use std::fmt::Write as _;
    let mut out = String::new();
    write!(out, "{}", dt.format(pattern))
        .map_err(|_| format!("invalid date format '{pattern}'"))?;
    Ok(out)
}

fn format_date(value: &Value, params: &[Value]) -> Result<Value, String> {
    let raw = stringify(value);
    let (dt, _) = parse_datetime(&raw)?;
    let pattern = params
        .first()
        .map(stringify)
        .unwrap_or_else(|| "%Y-%m-%d".to_string());
    Ok(json!(format_naive(&dt, &pattern)?))
}

fn add_days(value: &Value, params: &[Value]) -> Result<Value, String> {
    let raw = stringify(value);
    let (dt, has_time) = parse_datetime(&raw)?;
    let days = params
        .first()
        .and_then(as_number)
        .ok_or("addDays requires a day count")? as i64;
    let shifted = dt + Duration::days(days);
    Ok(json!(if has_time {
        shifted.and_utc().to_rfc3339()
    } else {
        shifted.date().format("%Y-%m-%d").to_string()
    }))
}

// ─── Array helpers ───────────────────────────────────────────────────

fn join(value: &Value, params: &[Value]) -> Result<Value, String> {
    let items = value.as_array().ok_or("join requires an array value")?;
    let separator = params.first().map(stringify).unwrap_or_else(|| ",".to_string());
    Ok(json!(items
        .iter()
        .map(stringify)
        .collect::<Vec<_>>()
        .join(&separator)))
}

fn split(value: &Value, params: &[Value]) -> Result<Value, String> {
    let s = stringify(value);
    let separator = params.first().map(stringify).unwrap_or_else(|| ",".to_string());
    Ok(json!(s.split(&separator).collect::<Vec<_>>()))
}

fn first_last(value: &Value, first: bool) -> Result<Value, String> {
    let items = value.as_array().ok_or("first/last require an array value")?;
    let picked = if first { items.first() } else { items.last() };
    Ok(picked.cloned().unwrap_or(Value::Null))
}

fn length(value: &Value, _params: &[Value]) -> Result<Value, String> {
    match value {
        Value::Array(items) => Ok(json!(items.len())),
        Value::String(s) => Ok(json!(s.chars().count())),
        Value::Null => Ok(json!(0)),
        _ => Err("length requires a string or array value".to_string()),
    }
}

// ─── Domain helpers ──────────────────────────────────────────────────

fn ifsc_regex() -> &'static Regex {
    static IFSC: OnceLock<Regex> = OnceLock::new();
    IFSC.get_or_init(|| Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").expect("static pattern compiles"))
}

/// Account numbers render in groups of four digits ("1234 5678 90").
fn format_account_number(value: &Value, _params: &[Value]) -> Result<Value, String> {
    let digits: String = stringify(value).chars().filter(|c| !c.is_whitespace()).collect();
    let grouped = digits
        .chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(json!(grouped))
}

fn validate_ifsc(value: &Value, _params: &[Value]) -> Result<Value, String> {
    Ok(json!(ifsc_regex().is_match(&stringify(value))))
}

fn format_pan(value: &Value, _params: &[Value]) -> Result<Value, String> {
    let pan: String = stringify(value)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    Ok(json!(pan))
}

/// Reveal only the last N digits (default 4), masking the rest with `*`.
/// Inputs no longer than the visible count come back unchanged.
fn mask_account_number(value: &Value, params: &[Value]) -> Result<Value, String> {
    let s = stringify(value);
    let visible = usize_param(params, 0).unwrap_or(4);
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= visible {
        return Ok(json!(s));
    }
    let masked: String = std::iter::repeat('*')
        .take(chars.len() - visible)
        .chain(chars[chars.len() - visible..].iter().copied())
        .collect();
    Ok(json!(masked))
}
