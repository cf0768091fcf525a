use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Which export a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Narrow time-series samples (one row per sampling instant).
    TimeSeries,
    /// Wide key-value items (one row per detection event).
    KeyValue,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::TimeSeries => "timeseries",
            SourceKind::KeyValue => "keyvalue",
        }
    }
}

/// Canonical record shared by every source adapter.
///
/// `fields` holds every non-timestamp column of the source row, with
/// structured cells already expanded. Named attributes (four-type code,
/// gender, age, configured extras) are resolved from it by the classifier.
#[derive(Debug, Clone)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub source: SourceKind,
    pub id: Option<String>,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(timestamp: DateTime<Utc>, source: SourceKind, fields: Map<String, Value>) -> Self {
        Record {
            timestamp,
            source,
            id: None,
            fields,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(Value::is_null)
    }
}
