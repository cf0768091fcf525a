//! Source adapters.
//!
//! Every export format is read into the same canonical [`Record`] shape.
//! [`normalize`] owns the CSV reading, timestamp extraction and tallying;
//! a [`SourceAdapter`] only decides which columns carry the timestamp, how
//! the remaining cells become record fields, and what identifies a row.

mod keyvalue;
mod timeseries;

pub use keyvalue::KeyValueSource;
pub use timeseries::TimeSeriesSource;

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use flate2::read::GzDecoder;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::parser::{MalformedCell, parse_cell, parse_timestamp};
use crate::record::{Record, SourceKind};

/// Options shared by every adapter during normalization.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Offset applied to timestamps written without a zone.
    pub utc_offset: FixedOffset,
}

impl NormalizeOptions {
    pub fn from_offset_hours(hours: i32) -> Result<Self> {
        let utc_offset = FixedOffset::east_opt(hours * 3600).ok_or_else(|| {
            AnalysisError::Config(format!("UTC offset {hours}h is out of range"))
        })?;
        Ok(Self { utc_offset })
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
        }
    }
}

/// Adapter for one export schema.
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Candidate timestamp columns in priority order. The first one holding a
    /// parseable value wins, per row.
    fn timestamp_columns(&self) -> &'static [&'static str];

    /// Identifier of a row, computed from all of its cells.
    fn record_id(&self, cells: &Map<String, Value>) -> Option<String>;

    /// Turns the non-timestamp cells into record fields.
    fn shape_fields(&self, cells: Map<String, Value>) -> Map<String, Value>;
}

/// Ingest counters for one source file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestTally {
    pub source: SourceKind,
    pub path: String,
    pub rows_read: usize,
    pub records: usize,
    pub skipped_no_timestamp: usize,
    pub skipped_empty: usize,
    pub malformed_cells: usize,
    pub duplicate_identifier_rows: usize,
    pub timestamp_column_found: bool,
}

impl IngestTally {
    fn new(source: SourceKind, path: &Path) -> Self {
        Self {
            source,
            path: path.display().to_string(),
            rows_read: 0,
            records: 0,
            skipped_no_timestamp: 0,
            skipped_empty: 0,
            malformed_cells: 0,
            duplicate_identifier_rows: 0,
            timestamp_column_found: false,
        }
    }
}

/// Records produced from one source, with their ingest counters.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub records: Vec<Record>,
    pub tally: IngestTally,
}

/// Reads `path` (plain or gzip-compressed CSV) through `adapter`.
///
/// Rows without a parseable timestamp and rows with no other values are
/// skipped and counted; malformed structured cells are kept as raw strings
/// and counted. Only I/O failures end the read.
#[tracing::instrument(skip(adapter, opts), fields(source = adapter.kind().as_str(), path = %path.display()))]
pub fn normalize<A: SourceAdapter + ?Sized>(
    adapter: &A,
    path: &Path,
    opts: &NormalizeOptions,
) -> Result<NormalizedBatch> {
    let reader = open_reader(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = String::from_utf8_lossy(h);
            let h = h.trim();
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.to_string()
        })
        .collect();

    let ts_columns: Vec<&str> = adapter
        .timestamp_columns()
        .iter()
        .copied()
        .filter(|c| headers.iter().any(|h| h.eq_ignore_ascii_case(c)))
        .collect();

    let mut tally = IngestTally::new(adapter.kind(), path);
    tally.timestamp_column_found = !ts_columns.is_empty();
    if ts_columns.is_empty() {
        warn!(
            expected = ?adapter.timestamp_columns(),
            "No timestamp column found; every row will be skipped"
        );
    }

    let mut records = Vec::new();
    let mut seen_ids = HashSet::new();

    for result in rdr.byte_records() {
        let row = result?;
        tally.rows_read += 1;

        let mut cells = Map::new();
        for (header, raw) in headers.iter().zip(row.iter()) {
            let text = String::from_utf8_lossy(raw);
            let value = match parse_cell(&text) {
                Ok(v) => v,
                Err(MalformedCell(raw)) => {
                    tally.malformed_cells += 1;
                    Value::String(raw)
                }
            };
            cells.insert(header.clone(), value);
        }

        let timestamp = ts_columns.iter().find_map(|col| {
            cells
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(col))
                .and_then(|(_, v)| parse_timestamp(v, opts.utc_offset))
        });
        let Some(timestamp) = timestamp else {
            tally.skipped_no_timestamp += 1;
            debug!(line = row.position().map(|p| p.line()), "Row skipped: no parseable timestamp");
            continue;
        };

        let id = adapter.record_id(&cells);
        cells.retain(|k, _| !ts_columns.iter().any(|c| k.eq_ignore_ascii_case(c)));

        let record = Record::new(timestamp, adapter.kind(), adapter.shape_fields(cells)).with_id(id);
        if record.is_empty() {
            tally.skipped_empty += 1;
            continue;
        }

        if let Some(id) = &record.id {
            if !seen_ids.insert(id.clone()) {
                tally.duplicate_identifier_rows += 1;
            }
        }

        records.push(record);
    }

    tally.records = records.len();
    info!(
        rows_read = tally.rows_read,
        records = tally.records,
        skipped_no_timestamp = tally.skipped_no_timestamp,
        skipped_empty = tally.skipped_empty,
        malformed_cells = tally.malformed_cells,
        "Source normalized"
    );

    Ok(NormalizedBatch { records, tally })
}

fn open_reader(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path).map_err(|e| AnalysisError::InputUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// First non-null cell among `columns`, rendered as text.
pub(crate) fn first_text(cells: &Map<String, Value>, columns: &[&str]) -> Option<String> {
    columns.iter().find_map(|col| {
        cells
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(col))
            .and_then(|(_, v)| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_normalize_skips_rows_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "a_timestream.csv",
            "time,four_types\n2025-09-11 10:00:00,1\nnot-a-time,2\n,3\n2025-09-11 10:00:10,4\n",
        );

        let batch = normalize(&TimeSeriesSource, &path, &NormalizeOptions::default()).unwrap();

        assert_eq!(batch.tally.rows_read, 4);
        assert_eq!(batch.tally.records, 2);
        assert_eq!(batch.tally.skipped_no_timestamp, 2);
        assert!(batch.tally.timestamp_column_found);
    }

    #[test]
    fn test_normalize_drops_rows_with_no_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "a_timestream.csv",
            "time,four_types,stress\n2025-09-11 10:00:00,,\n2025-09-11 10:00:10,,0.5\n",
        );

        let batch = normalize(&TimeSeriesSource, &path, &NormalizeOptions::default()).unwrap();

        assert_eq!(batch.tally.skipped_empty, 1);
        assert_eq!(batch.records.len(), 1);
        assert!(batch.records[0].fields["four_types"].is_null());
    }

    #[test]
    fn test_normalize_strips_bom_and_reads_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a_timestream.csv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all("\u{feff}time,four_types\n2025-09-11 10:00:00,3\n".as_bytes())
            .unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let batch = normalize(&TimeSeriesSource, &path, &NormalizeOptions::default()).unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].fields["four_types"], "3");
    }

    #[test]
    fn test_normalize_counts_malformed_cells_but_keeps_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "a_dynamodb.csv",
            "time,data\n2025-09-11 10:00:00,\"{oops\"\n",
        );

        let batch = normalize(&KeyValueSource, &path, &NormalizeOptions::default()).unwrap();

        assert_eq!(batch.tally.malformed_cells, 1);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].fields["data"], "{oops");
    }

    #[test]
    fn test_normalize_counts_duplicate_identifiers_without_removing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "a_dynamodb.csv",
            "id,time,event\nx,2025-09-11 10:00:00,enter\nx,2025-09-11 10:00:00,enter\n",
        );

        let batch = normalize(&KeyValueSource, &path, &NormalizeOptions::default()).unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.tally.duplicate_identifier_rows, 1);
    }

    #[test]
    fn test_normalize_missing_file_is_unreadable() {
        let result = normalize(
            &TimeSeriesSource,
            Path::new("/nonexistent/a_timestream.csv"),
            &NormalizeOptions::default(),
        );
        assert!(matches!(result, Err(AnalysisError::InputUnreadable { .. })));
    }

    #[test]
    fn test_offset_hours_out_of_range() {
        assert!(NormalizeOptions::from_offset_hours(30).is_err());
        assert!(NormalizeOptions::from_offset_hours(-5).is_ok());
    }

    // Helper functions for tests
    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}
