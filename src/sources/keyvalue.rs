use serde_json::{Map, Value};

use super::{SourceAdapter, first_text};
use crate::record::SourceKind;

/// Wide key-value export: one row per stored item. Nested attributes arrive
/// either as a structured `data` cell or as dotted column names left by a
/// flattening exporter (`data.Gender.Value`).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyValueSource;

impl SourceAdapter for KeyValueSource {
    fn kind(&self) -> SourceKind {
        SourceKind::KeyValue
    }

    fn timestamp_columns(&self) -> &'static [&'static str] {
        &["time", "timestamp", "inserted_time"]
    }

    fn record_id(&self, cells: &Map<String, Value>) -> Option<String> {
        if let Some(id) = first_text(cells, &["id", "record_id"]) {
            return Some(id);
        }
        let user = first_text(cells, &["user_id"])?;
        let inserted = first_text(cells, &["inserted_time"])?;
        Some(format!("{user}#{inserted}"))
    }

    fn shape_fields(&self, cells: Map<String, Value>) -> Map<String, Value> {
        unflatten(cells)
    }
}

/// Re-nests dotted keys into objects. A key whose path collides with a
/// non-object value is kept flat.
fn unflatten(cells: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    let mut dotted = Vec::new();

    for (key, value) in cells {
        if key.contains('.') {
            dotted.push((key, value));
        } else {
            out.insert(key, value);
        }
    }

    for (key, value) in dotted {
        let segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
        if !insert_path(&mut out, &segments, value.clone()) {
            out.insert(key, value);
        }
    }

    out
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) -> bool {
    match segments {
        [] => false,
        [last] => {
            if map.contains_key(*last) {
                return false;
            }
            map.insert((*last).to_string(), value);
            true
        }
        [head, rest @ ..] => {
            let entry = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if entry.is_null() {
                *entry = Value::Object(Map::new());
            }
            match entry {
                Value::Object(child) => insert_path(child, rest, value),
                _ => false,
            }
        }
    }
}
