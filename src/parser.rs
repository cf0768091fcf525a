//! Tolerant parsers for exported CSV cells and timestamps.
//!
//! Exporters write nested attributes as JSON, or as Python-style literals with
//! single quotes, `True`/`None` and `Decimal('42')` wrappers. Both are
//! accepted here.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

static DECIMAL_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Decimal\(\s*['"]?([0-9eE+\-.]+)['"]?\s*\)"#).expect("decimal literal pattern")
});
static PY_TRUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bTrue\b").expect("True pattern"));
static PY_FALSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bFalse\b").expect("False pattern"));
static PY_NONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bNone\b").expect("None pattern"));

/// Naive layouts tried in order after RFC 3339 and explicit-offset forms.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

/// Epoch values at or above this are taken as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A structured cell (`{...}` or `[...]`) that no parser accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedCell(pub String);

/// Returns true for the tokens exporters use for a missing value.
pub fn is_null_token(s: &str) -> bool {
    matches!(s, "" | "NaN" | "nan" | "None" | "null" | "NULL" | "NaT")
}

/// Converts a raw CSV cell into a JSON value.
///
/// Null tokens become [`Value::Null`], structured cells are parsed with
/// [`parse_structured`], and everything else is kept as a trimmed string.
///
/// # Errors
///
/// Returns [`MalformedCell`] carrying the raw text when a cell looks
/// structured but cannot be parsed.
pub fn parse_cell(raw: &str) -> Result<Value, MalformedCell> {
    let s = raw.trim();
    if is_null_token(s) {
        return Ok(Value::Null);
    }
    if s.starts_with('{') || s.starts_with('[') {
        return parse_structured(s).ok_or_else(|| MalformedCell(s.to_string()));
    }
    Ok(Value::String(s.to_string()))
}

/// Parses a JSON or Python-literal object/array.
pub fn parse_structured(s: &str) -> Option<Value> {
    let s = DECIMAL_LITERAL.replace_all(s.trim(), "$1");
    if let Ok(v) = serde_json::from_str::<Value>(&s) {
        return Some(v);
    }

    let normalized = s.replace('\'', "\"");
    let normalized = PY_TRUE.replace_all(&normalized, "true");
    let normalized = PY_FALSE.replace_all(&normalized, "false");
    let normalized = PY_NONE.replace_all(&normalized, "null");
    serde_json::from_str::<Value>(&normalized)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

/// Parses a timestamp cell into a UTC instant.
///
/// Naive date-times are interpreted at `offset`. Integer values are epoch
/// seconds, or epoch milliseconds when large enough.
pub fn parse_timestamp(value: &Value, offset: FixedOffset) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                from_epoch(i)
            } else {
                n.as_f64().and_then(from_epoch_f64)
            }
        }
        Value::String(s) => parse_timestamp_str(s, offset),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let s = DECIMAL_LITERAL.replace_all(raw.trim(), "$1");
    let s = s.trim();
    if is_null_token(s) {
        return None;
    }

    if let Ok(i) = s.parse::<i64>() {
        return from_epoch(i);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(s, fmt).ok()?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn from_epoch(i: i64) -> Option<DateTime<Utc>> {
    if i.abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(i)
    } else {
        DateTime::from_timestamp(i, 0)
    }
}

fn from_epoch_f64(x: f64) -> Option<DateTime<Utc>> {
    if !x.is_finite() {
        return None;
    }
    let millis = if x.abs() >= EPOCH_MILLIS_THRESHOLD as f64 {
        x.round()
    } else {
        (x * 1000.0).round()
    };
    DateTime::from_timestamp_millis(millis as i64)
}
