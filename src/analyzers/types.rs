//! Data types produced by the aggregation and continuity stages.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AttributeType;

/// One category and its count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionEntry {
    pub value: String,
    pub count: u64,
    /// Share of the table total, two decimals.
    pub percent: f64,
}

/// Count-by-label table for one attribute.
///
/// `total` equals the sum of the counts, which is the number of records that
/// resolved to a label for this attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionTable {
    pub attribute: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
    pub total: u64,
    pub entries: Vec<DistributionEntry>,
}

impl DistributionTable {
    pub fn count(&self, label: &str) -> u64 {
        self.entries
            .iter()
            .find(|e| e.value == label)
            .map_or(0, |e| e.count)
    }
}

/// Summary statistics for a numeric attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub non_null: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
}

/// Age frequency table in exactly one of its two forms.
#[derive(Debug, Clone, PartialEq)]
pub enum AgeCurve {
    /// One `(age, count)` pair per observed integer age, ascending.
    PerAge(Vec<(u32, u64)>),
    /// Pre-bucketed ranges, ordered by `(low, high)`.
    Bucketed(Vec<AgeBucket>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeBucket {
    pub label: String,
    pub low: u32,
    pub high: u32,
    pub count: u64,
}

/// Per-attribute counters for values that did not make it into a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldIssues {
    pub no_value: u64,
    pub unknown: u64,
    pub malformed: u64,
    pub out_of_range: u64,
    /// Range-only records left out of a per-integer age curve.
    pub range_only: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityStatus {
    Ok,
    /// Fewer than two distinct timestamps.
    InsufficientData,
    /// Timestamps exist but no positive gap to infer a step from.
    StepUndetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    Override,
    Config,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub seconds: i64,
}

/// A pair of consecutive timestamps further apart than the step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub prev_time: DateTime<Utc>,
    pub next_time: DateTime<Utc>,
    pub gap_seconds: i64,
    pub missing_points_est: u64,
}

/// Expected vs. observed sampling density over the observed span.
///
/// `missing_points_total_est` is always
/// `expected_points_est.saturating_sub(observed_points)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuityReport {
    pub status: ContinuityStatus,
    pub available: bool,
    pub observed_points: u64,
    pub expected_points_est: u64,
    pub missing_points_total_est: u64,
    /// Seconds between samples.
    pub inferred_step: Option<u64>,
    pub step_source: Option<StepSource>,
    pub span: Option<Span>,
    pub gap_count: usize,
    pub continuity_ratio_est: Option<f64>,
    pub discarded_outlier_gaps: usize,
    pub gaps: Vec<Gap>,
}
