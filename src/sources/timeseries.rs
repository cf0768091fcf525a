use serde_json::{Map, Value};

use super::{SourceAdapter, first_text};
use crate::record::SourceKind;

/// Columns the exporter derives from `time`; they carry no information of
/// their own.
const DERIVED_TIME_COLUMNS: &[&str] = &["day", "hour", "minutes"];

/// Narrow time-series export: one row per sample, flat columns
/// (`time`, `four_types`, `stress`, `attention`, `user_id`, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeSeriesSource;

impl SourceAdapter for TimeSeriesSource {
    fn kind(&self) -> SourceKind {
        SourceKind::TimeSeries
    }

    fn timestamp_columns(&self) -> &'static [&'static str] {
        &["time", "timestamp"]
    }

    fn record_id(&self, cells: &Map<String, Value>) -> Option<String> {
        first_text(cells, &["id", "record_id"])
    }

    fn shape_fields(&self, mut cells: Map<String, Value>) -> Map<String, Value> {
        cells.retain(|k, _| {
            !DERIVED_TIME_COLUMNS
                .iter()
                .any(|d| k.eq_ignore_ascii_case(d))
        });
        cells
    }
}
