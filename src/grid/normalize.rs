//! Result-value normalization.
//!
//! Executor rows may carry dates as native values or as SDK wrappers holding
//! a `.value` string; object identity is not stable across rows, so every
//! value must become a canonical string before Set-based deduplication or
//! key construction. NULL becomes the sentinel `(null)` so nulls participate
//! as a distinguished value instead of dropping out of limits.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Sentinel for NULL dimension values.
pub const NULL_SENTINEL: &str = "(null)";

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2})[T ](\d{2}:\d{2}:\d{2})(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?$",
    )
    .unwrap()
});

/// Canonical string for one dimension value.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => NULL_SENTINEL.to_string(),
        Value::String(s) => normalize_timestamp(s),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => format_number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::Bool(b) => b.to_string(),
        // SDK date wrapper: { "value": "2020-01-01T00:00:00" }.
        Value::Object(map) => match map.get("value") {
            Some(inner) => normalize_value(inner),
            None => value.to_string(),
        },
        Value::Array(_) => value.to_string(),
    }
}

/// Midnight timestamps collapse to their date; other timestamps keep a
/// canonical `YYYY-MM-DD HH:MM:SS` form. Non-timestamp strings pass through.
pub fn normalize_timestamp(s: &str) -> String {
    match TIMESTAMP_RE.captures(s) {
        Some(caps) => {
            let date = &caps[1];
            let time = &caps[2];
            if time == "00:00:00" {
                date.to_string()
            } else {
                format!("{date} {time}")
            }
        }
        None => s.to_string(),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
