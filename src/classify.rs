//! Attribute classifier.
//!
//! An ordered-rule evaluator: for each configured attribute, candidate keys
//! are tried in order against a record's fields and the first non-null hit
//! is coerced according to the attribute type. Resolution is a pure function
//! of `(record, attribute)`.

use serde_json::{Map, Value};

use crate::config::{AttributeConfig, AttributeType};
use crate::record::Record;

/// Label used for values that are present but unusable, and for records
/// without a value when the attribute asks for an explicit bucket.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Outcome of resolving one attribute for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Label(String),
    Number(f64),
    /// A pre-bucketed range such as `{"Low": 23, "High": 31}`.
    Range { low: f64, high: f64 },
    NoValue,
    /// Numeric attribute whose value did not parse.
    Malformed,
    /// Numeric attribute outside its configured bounds.
    OutOfRange,
}

impl Resolution {
    fn unknown() -> Self {
        Resolution::Label(UNKNOWN_LABEL.to_string())
    }
}

/// Resolves `attr` for every record, preserving record order.
pub fn classify(records: &[Record], attr: &AttributeConfig) -> Vec<Resolution> {
    records.iter().map(|r| resolve(r, attr)).collect()
}

/// Resolves one attribute for one record.
pub fn resolve(record: &Record, attr: &AttributeConfig) -> Resolution {
    let located = locate(&record.fields, &attr.source_keys);
    let value = match (located, attr.value_key.as_deref()) {
        (Some(Value::Object(obj)), Some(value_key)) => {
            get_ignore_case(obj, value_key).or(located)
        }
        _ => located,
    };

    let resolution = match value {
        None | Some(Value::Null) => Resolution::NoValue,
        Some(v) => match attr.kind {
            AttributeType::Categorical => categorical(v, false),
            AttributeType::Code => categorical(v, true),
            AttributeType::Bool => boolean(v),
            AttributeType::Numeric => numeric(v, attr.min, attr.max),
        },
    };

    match resolution {
        Resolution::Label(label) => Resolution::Label(apply_alias(attr, label)),
        Resolution::NoValue if attr.include_unknown && attr.kind != AttributeType::Numeric => {
            Resolution::unknown()
        }
        other => other,
    }
}

/// First non-null value among `keys`, searched through nested objects and
/// arrays. Plain keys match at any depth; dotted keys are paths whose
/// segments may each sit at any depth below the previous one.
pub fn locate<'a>(fields: &'a Map<String, Value>, keys: &[String]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        if key.contains('.') {
            let segments: Vec<String> = key
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            path_in_map(fields, &segments)
        } else {
            key_in_map(fields, &key)
        }
    })
}

fn key_in_map<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    for (k, v) in map {
        if k.to_lowercase() == key && !v.is_null() {
            return Some(v);
        }
        if let Some(found) = key_in_value(v, key) {
            return Some(found);
        }
    }
    None
}

fn key_in_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => key_in_map(map, key),
        Value::Array(items) => items.iter().find_map(|v| key_in_value(v, key)),
        _ => None,
    }
}

fn path_in_map<'a>(map: &'a Map<String, Value>, segments: &[String]) -> Option<&'a Value> {
    let (head, rest) = segments.split_first()?;
    map.iter()
        .filter(|(k, _)| k.to_lowercase() == *head)
        .find_map(|(_, v)| path_in_value(v, rest))
        .or_else(|| map.values().find_map(|v| path_in_value(v, segments)))
}

fn path_in_value<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    if segments.is_empty() {
        return (!value.is_null()).then_some(value);
    }
    match value {
        Value::Object(map) => path_in_map(map, segments),
        Value::Array(items) => items.iter().find_map(|v| path_in_value(v, segments)),
        _ => None,
    }
}

fn get_ignore_case<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn apply_alias(attr: &AttributeConfig, label: String) -> String {
    attr.aliases
        .get(&label.to_lowercase())
        .cloned()
        .unwrap_or(label)
}

fn integral_label(x: f64) -> Option<String> {
    (x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15).then(|| format!("{}", x as i64))
}

fn categorical(value: &Value, integer_code: bool) -> Resolution {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Resolution::NoValue;
            }
            match s.parse::<f64>().ok().and_then(integral_label) {
                Some(label) => Resolution::Label(label),
                None if integer_code => Resolution::unknown(),
                None => Resolution::Label(s.to_string()),
            }
        }
        Value::Number(n) => match n.as_f64().and_then(integral_label) {
            Some(label) => Resolution::Label(label),
            None if integer_code => Resolution::unknown(),
            None => Resolution::Label(n.to_string()),
        },
        Value::Bool(b) if !integer_code => Resolution::Label(b.to_string()),
        Value::Null => Resolution::NoValue,
        _ => Resolution::unknown(),
    }
}

fn boolean(value: &Value) -> Resolution {
    let b = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|x| x != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" => return Resolution::NoValue,
            "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
            "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
            _ => None,
        },
        Value::Null => return Resolution::NoValue,
        _ => None,
    };
    match b {
        Some(b) => Resolution::Label(b.to_string()),
        None => Resolution::unknown(),
    }
}

fn numeric(value: &Value, min: Option<f64>, max: Option<f64>) -> Resolution {
    let within = |x: f64| min.is_none_or(|m| x >= m) && max.is_none_or(|m| x <= m);

    match value {
        Value::Object(obj) => {
            let low = get_ignore_case(obj, "low").and_then(as_number);
            let high = get_ignore_case(obj, "high").and_then(as_number);
            let (low, high) = match (low, high) {
                (Some(l), Some(h)) => (l, h),
                (Some(l), None) => (l, l),
                (None, Some(h)) => (h, h),
                (None, None) => return Resolution::Malformed,
            };
            if low > high {
                Resolution::Malformed
            } else if !within(low) || !within(high) {
                Resolution::OutOfRange
            } else {
                Resolution::Range { low, high }
            }
        }
        Value::String(s) if s.trim().is_empty() => Resolution::NoValue,
        other => match as_number(other) {
            Some(x) if within(x) => Resolution::Number(x),
            Some(_) => Resolution::OutOfRange,
            None => Resolution::Malformed,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let x = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    x.is_finite().then_some(x)
}
