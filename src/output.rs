//! Output persistence for an analysis run.
//!
//! Every file is staged in a temporary file next to its destination and
//! renamed into place, so a reader never sees a partially written summary.

use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::summary::SummaryDocument;

pub const OUTPUT_DIR_NAME: &str = "analysis_outputs";
pub const SUMMARY_FILE: &str = "analysis_summary.json";
pub const REPORT_FILE: &str = "analysis_report.txt";
pub const GAPS_CSV: &str = "time_gaps.csv";
pub const FOUR_TYPES_CSV: &str = "four_types_distribution.csv";
pub const GENDER_CSV: &str = "gender_distribution.csv";
pub const AGE_CSV: &str = "age_distribution.csv";

/// Where the files of one run ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPaths {
    pub summary: PathBuf,
    pub report: PathBuf,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub csv: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct AgeRow {
    age: u32,
    count: u64,
}

/// A file written to a temporary sibling and not yet renamed into place.
///
/// Dropping it without [`Staged::commit`] removes the temporary file.
pub struct Staged {
    tmp: NamedTempFile,
    path: PathBuf,
}

impl Staged {
    pub fn commit(self) -> Result<PathBuf> {
        let Staged { tmp, path } = self;
        tmp.persist(&path).map_err(|e| AnalysisError::Output {
            path: path.clone(),
            reason: e.error.to_string(),
        })?;
        debug!(path = %path.display(), "File written");
        Ok(path)
    }
}

/// Writes `bytes` to a temporary file in the directory of `path`.
pub fn stage(path: &Path, bytes: &[u8]) -> Result<Staged> {
    let output_err = |e: &dyn Display| AnalysisError::Output {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| output_err(&e))?;
    tmp.write_all(bytes).map_err(|e| output_err(&e))?;
    tmp.as_file().sync_all().map_err(|e| output_err(&e))?;

    Ok(Staged {
        tmp,
        path: path.to_path_buf(),
    })
}

/// Writes `bytes` to `path` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    stage(path, bytes)?.commit().map(|_| ())
}

/// Serializes `rows` as CSV. `header` is written on its own when there
/// are no rows, so an empty table still names its columns.
pub fn to_csv<T: Serialize>(header: &[&str], rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AnalysisError::Io(e.into_error()))
}

/// Writes the summary JSON and the text report, plus the CSV exports when
/// `emit_csv` is set.
///
/// Every file is staged before any is renamed. The summary is renamed last,
/// so a failed run leaves the previous summary in place.
#[tracing::instrument(skip(doc, report), fields(dir = %dir.display()))]
pub fn write_outputs(
    dir: &Path,
    doc: &SummaryDocument,
    report: &str,
    emit_csv: bool,
) -> Result<OutputPaths> {
    std::fs::create_dir_all(dir).map_err(|e| AnalysisError::Output {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let summary = stage(&dir.join(SUMMARY_FILE), &serde_json::to_vec_pretty(doc)?)?;
    let report = stage(&dir.join(REPORT_FILE), report.as_bytes())?;
    let csv_files = if emit_csv { stage_csv_exports(dir, doc)? } else { Vec::new() };

    let mut csv = Vec::with_capacity(csv_files.len());
    for file in csv_files {
        csv.push(file.commit()?);
    }
    let report = report.commit()?;
    let summary = summary.commit()?;

    info!(
        summary = %summary.display(),
        report = %report.display(),
        csv_files = csv.len(),
        "Outputs written"
    );

    Ok(OutputPaths {
        summary,
        report,
        csv,
    })
}

const GAP_HEADER: &[&str] = &["prev_time", "next_time", "gap_seconds", "missing_points_est"];
const DISTRIBUTION_HEADER: &[&str] = &["value", "count", "percent"];
const GENDER_HEADER: &[&str] = &["gender", "count", "percent"];

/// One CSV per summary table. Rows mirror the summary entries exactly.
pub fn stage_csv_exports(dir: &Path, doc: &SummaryDocument) -> Result<Vec<Staged>> {
    let mut staged = vec![
        stage(&dir.join(GAPS_CSV), &to_csv(GAP_HEADER, &doc.time_continuity.gaps)?)?,
        stage(
            &dir.join(FOUR_TYPES_CSV),
            &to_csv(DISTRIBUTION_HEADER, &doc.four_types_distribution)?,
        )?,
        stage(
            &dir.join(GENDER_CSV),
            &to_csv(GENDER_HEADER, &doc.gender_distribution)?,
        )?,
    ];

    if let Some(curve) = &doc.age_distribution_curve {
        let rows: Vec<AgeRow> = curve
            .labels
            .iter()
            .zip(&curve.data)
            .map(|(&age, &count)| AgeRow { age, count })
            .collect();
        staged.push(stage(&dir.join(AGE_CSV), &to_csv(&["age", "count"], &rows)?)?);
    } else if let Some(buckets) = &doc.age_buckets {
        staged.push(stage(
            &dir.join(AGE_CSV),
            &to_csv(&["label", "low", "high", "count"], buckets)?,
        )?);
    }

    Ok(staged)
}
