//! Tolerant reader for summary documents.
//!
//! Renderers consume summaries from older and newer producers without
//! version negotiation, so field names are resolved through fallbacks:
//!
//! | Concept        | Accepted field names                                     |
//! |----------------|----------------------------------------------------------|
//! | count          | `count`, `freq`                                          |
//! | category       | `value`, `four_types`, `label`, `gender`, `age_bucket`, `key` |
//! | wrapper        | `summary`, `result`                                      |
//! | nested table   | `dynamodb_json.*`, `four_types.distribution`             |
//!
//! The per-integer age curve is always checked before age buckets.

use serde_json::Value;

const WRAPPERS: &[&str] = &["summary", "result"];
const LABEL_FIELDS: &[&str] = &["value", "four_types", "label", "gender", "age_bucket", "key"];
const COUNT_FIELDS: &[&str] = &["count", "freq"];

const FOUR_TYPES_PATHS: &[&[&str]] = &[
    &["four_types_distribution"],
    &["four_types", "distribution"],
    &["distributions", "four_types", "entries"],
];
const GENDER_PATHS: &[&[&str]] = &[
    &["gender_distribution"],
    &["dynamodb_json", "gender_distribution"],
    &["distributions", "gender", "entries"],
];
const AGE_CURVE_PATHS: &[&[&str]] = &[
    &["age_distribution_curve"],
    &["dynamodb_json", "age_distribution_curve"],
];
const AGE_BUCKET_PATHS: &[&[&str]] = &[&["age_buckets"], &["dynamodb_json", "age_buckets"]];
const CONTINUITY_PATHS: &[&[&str]] = &[&["time_continuity"]];
const SCHEMA_PATHS: &[&[&str]] = &[&["schema_version"]];

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCount {
    pub label: String,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgeView {
    PerAge { labels: Vec<String>, data: Vec<f64> },
    Buckets(Vec<CategoryCount>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContinuityView {
    pub available: bool,
    pub observed_points: Option<u64>,
    pub expected_points_est: Option<u64>,
    pub missing_points_total_est: Option<u64>,
    pub inferred_step: Option<u64>,
}

/// What a renderer needs from a summary, whatever its producer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryView {
    pub schema_version: Option<u64>,
    pub four_types: Vec<CategoryCount>,
    pub gender: Vec<CategoryCount>,
    pub age: Option<AgeView>,
    pub continuity: Option<ContinuityView>,
}

impl SummaryView {
    pub fn from_value(root: &Value) -> Self {
        let age = find(root, AGE_CURVE_PATHS)
            .and_then(age_curve)
            .or_else(|| {
                find(root, AGE_BUCKET_PATHS)
                    .map(entries)
                    .filter(|b| !b.is_empty())
                    .map(AgeView::Buckets)
            });

        SummaryView {
            schema_version: find(root, SCHEMA_PATHS).and_then(Value::as_u64),
            four_types: find(root, FOUR_TYPES_PATHS).map(entries).unwrap_or_default(),
            gender: find(root, GENDER_PATHS).map(entries).unwrap_or_default(),
            age,
            continuity: find(root, CONTINUITY_PATHS).map(continuity),
        }
    }

    /// Plain listing for terminal output.
    pub fn to_text(&self) -> String {
        let mut out = Vec::new();
        if let Some(v) = self.schema_version {
            out.push(format!("schema v{v}"));
        }

        if let Some(tc) = &self.continuity {
            out.push("time_continuity:".to_string());
            if tc.available {
                out.push(format!("  inferred_step: {}", opt(tc.inferred_step)));
                out.push(format!("  observed_points: {}", opt(tc.observed_points)));
                out.push(format!("  expected_points_est: {}", opt(tc.expected_points_est)));
                out.push(format!(
                    "  missing_points_total_est: {}",
                    opt(tc.missing_points_total_est)
                ));
            } else {
                out.push("  unavailable".to_string());
            }
        }

        for (title, rows) in [("four_types", &self.four_types), ("gender", &self.gender)] {
            out.push(format!("{title}:"));
            for c in rows {
                out.push(format!("  {}: {}", c.label, c.count));
            }
        }

        match &self.age {
            Some(AgeView::PerAge { labels, data }) => {
                out.push("age (per year):".to_string());
                for (label, count) in labels.iter().zip(data) {
                    out.push(format!("  {label}: {count}"));
                }
            }
            Some(AgeView::Buckets(buckets)) => {
                out.push("age (buckets):".to_string());
                for b in buckets {
                    out.push(format!("  {}: {}", b.label, b.count));
                }
            }
            None => out.push("age: none".to_string()),
        }

        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}

fn opt(v: Option<u64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn containers(root: &Value) -> impl Iterator<Item = &Value> {
    std::iter::once(root).chain(
        WRAPPERS
            .iter()
            .filter_map(move |w| root.get(*w))
            .filter(|v| v.is_object()),
    )
}

fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .filter(|v| !v.is_null())
}

fn find<'a>(root: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    containers(root).find_map(|c| paths.iter().find_map(|p| get_path(c, p)))
}

fn label_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

/// Category/count pairs from an array of entries or a label → count mapping.
fn entries(v: &Value) -> Vec<CategoryCount> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let label = LABEL_FIELDS
                    .iter()
                    .find_map(|f| item.get(*f))
                    .map(label_text)?;
                let count = COUNT_FIELDS
                    .iter()
                    .find_map(|f| item.get(*f).and_then(number))?;
                Some(CategoryCount { label, count })
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(label, count)| {
                number(count).map(|count| CategoryCount {
                    label: label.clone(),
                    count,
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn age_curve(v: &Value) -> Option<AgeView> {
    let labels: Vec<String> = v.get("labels")?.as_array()?.iter().map(label_text).collect();
    let data: Vec<f64> = v
        .get("data")?
        .as_array()?
        .iter()
        .map(|d| number(d).unwrap_or(0.0))
        .collect();
    if labels.is_empty() || labels.len() != data.len() {
        return None;
    }
    Some(AgeView::PerAge { labels, data })
}

fn continuity(v: &Value) -> ContinuityView {
    let field = |names: &[&str]| names.iter().find_map(|n| v.get(*n).and_then(Value::as_u64));
    let expected = field(&["expected_points_est"]);
    ContinuityView {
        available: v
            .get("available")
            .and_then(Value::as_bool)
            .unwrap_or(expected.is_some()),
        observed_points: field(&["observed_points", "rows"]),
        expected_points_est: expected,
        missing_points_total_est: field(&["missing_points_total_est"]),
        inferred_step: field(&["inferred_step", "expected_step_seconds"]),
    }
}
