//! Attribute configuration.
//!
//! Loaded from a JSON file on disk:
//! ```json
//! {
//!   "attributes": [
//!     {"name": "glasses", "keys": ["Eyeglasses"], "type": "bool", "value_key": "Value"},
//!     {"name": "age", "source_keys": ["age", "AgeRange"], "type": "numeric", "min": 0, "max": 120}
//!   ],
//!   "expected_step_seconds": 10
//! }
//! ```
//! The built-in `four_types`, `gender` and `age` attributes are always
//! present; an entry with the same name replaces the built-in one.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};

pub const FOUR_TYPES: &str = "four_types";
pub const GENDER: &str = "gender";
pub const AGE: &str = "age";

/// Gaps longer than this multiple of the median gap are treated as outages.
pub const DEFAULT_OUTLIER_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    #[serde(alias = "category", alias = "string")]
    Categorical,
    /// Integer-coded categorical; non-integer values become `unknown`.
    Code,
    Bool,
    #[serde(alias = "number")]
    Numeric,
}

/// How to extract one named attribute from a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    /// Candidate keys, tried in order. Dotted keys are paths.
    #[serde(alias = "keys")]
    pub source_keys: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: AttributeType,
    /// Leaf to take when the located value is an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_key: Option<String>,
    /// Case-insensitive raw value to canonical label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
    /// Count records with no value under an explicit `unknown` label.
    #[serde(default)]
    pub include_unknown: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl AttributeConfig {
    pub fn new(name: &str, kind: AttributeType, source_keys: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            source_keys: source_keys.iter().map(|k| k.to_string()).collect(),
            kind,
            value_key: None,
            aliases: BTreeMap::new(),
            include_unknown: false,
            min: None,
            max: None,
        }
    }

    pub fn with_value_key(mut self, value_key: &str) -> Self {
        self.value_key = Some(value_key.to_string());
        self
    }

    pub fn with_alias(mut self, raw: &str, label: &str) -> Self {
        self.aliases.insert(raw.to_lowercase(), label.to_string());
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

fn builtin_attributes() -> Vec<AttributeConfig> {
    let gender = [
        ("m", "Male"),
        ("male", "Male"),
        ("man", "Male"),
        ("男性", "Male"),
        ("f", "Female"),
        ("female", "Female"),
        ("woman", "Female"),
        ("女性", "Female"),
    ]
    .iter()
    .fold(
        AttributeConfig::new(
            GENDER,
            AttributeType::Categorical,
            &["gender", "sex", "性別", "性别"],
        )
        .with_value_key("Value"),
        |attr, (raw, label)| attr.with_alias(raw, label),
    );

    vec![
        AttributeConfig::new(FOUR_TYPES, AttributeType::Code, &["four_types"]),
        gender,
        AttributeConfig::new(
            AGE,
            AttributeType::Numeric,
            &["age", "age_years", "AgeRange", "age_range", "年齢"],
        )
        .with_value_key("Value")
        .with_bounds(0.0, 120.0),
    ]
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    attributes: Vec<AttributeConfig>,
    expected_step_seconds: Option<u64>,
    outlier_factor: Option<f64>,
}

/// Resolved configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    /// Built-ins first (possibly overridden), then extras in file order.
    pub attributes: Vec<AttributeConfig>,
    pub expected_step_seconds: Option<u64>,
    pub outlier_factor: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            attributes: builtin_attributes(),
            expected_step_seconds: None,
            outlier_factor: DEFAULT_OUTLIER_FACTOR,
        }
    }
}

impl AnalysisConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(content)
            .map_err(|e| AnalysisError::Config(format!("invalid JSON: {e}")))?;

        let mut seen = HashSet::new();
        let mut attributes = builtin_attributes();
        for mut attr in file.attributes {
            validate(&attr)?;
            if !seen.insert(attr.name.clone()) {
                return Err(AnalysisError::Config(format!(
                    "attribute '{}' is declared twice",
                    attr.name
                )));
            }
            attr.aliases = attr
                .aliases
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect();

            match attributes.iter_mut().find(|a| a.name == attr.name) {
                Some(existing) => {
                    debug!(name = %attr.name, "Built-in attribute overridden");
                    *existing = attr;
                }
                None => attributes.push(attr),
            }
        }

        if file.expected_step_seconds == Some(0) {
            return Err(AnalysisError::Config(
                "expected_step_seconds must be positive".to_string(),
            ));
        }
        let outlier_factor = file.outlier_factor.unwrap_or(DEFAULT_OUTLIER_FACTOR);
        if !outlier_factor.is_finite() || outlier_factor <= 1.0 {
            return Err(AnalysisError::Config(format!(
                "outlier_factor must be greater than 1, got {outlier_factor}"
            )));
        }

        Ok(Self {
            attributes,
            expected_step_seconds: file.expected_step_seconds,
            outlier_factor,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeConfig> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

fn validate(attr: &AttributeConfig) -> Result<()> {
    if attr.name.trim().is_empty() {
        return Err(AnalysisError::Config("attribute name is empty".to_string()));
    }
    if attr.source_keys.iter().all(|k| k.trim().is_empty()) {
        return Err(AnalysisError::Config(format!(
            "attribute '{}' has no source keys",
            attr.name
        )));
    }
    if let (Some(min), Some(max)) = (attr.min, attr.max) {
        if min > max {
            return Err(AnalysisError::Config(format!(
                "attribute '{}' has min {min} > max {max}",
                attr.name
            )));
        }
    }
    Ok(())
}
