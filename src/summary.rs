//! The versioned summary document.
//!
//! A [`SummaryDocument`] is built once per run from the aggregation and
//! continuity outputs and is never modified afterwards. The text report and
//! the CSV exports are projections of it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzers::aggregate::Aggregates;
use crate::analyzers::types::{
    AgeBucket, AgeCurve, ContinuityReport, ContinuityStatus, DistributionEntry, DistributionTable,
    FieldIssues, NumericStats,
};
use crate::config::{AGE, AnalysisConfig, FOUR_TYPES, GENDER};
use crate::record::SourceKind;
use crate::sources::IngestTally;

pub const SCHEMA_VERSION: u8 = 2;
pub const ALGORITHM_VERSION: u8 = 1;

/// Which sources feed the continuity estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuitySource {
    #[default]
    All,
    TimeSeries,
    KeyValue,
}

impl ContinuitySource {
    pub fn includes(&self, source: SourceKind) -> bool {
        match self {
            ContinuitySource::All => true,
            ContinuitySource::TimeSeries => source == SourceKind::TimeSeries,
            ContinuitySource::KeyValue => source == SourceKind::KeyValue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub generated_by: String,
    pub input_folder: Option<String>,
    pub timeseries_csv: Option<String>,
    pub keyvalue_csv: Option<String>,
    pub config_path: Option<String>,
    pub config: AnalysisConfig,
    pub step_override_seconds: Option<u64>,
    pub utc_offset_hours: i32,
    pub continuity_source: ContinuitySource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub records_total: usize,
    pub sources: Vec<IngestTally>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenderEntry {
    pub gender: String,
    pub count: u64,
    pub percent: f64,
}

/// Per-integer age curve in chart form: `labels[i]` is an age, `data[i]` its count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeDistributionCurve {
    pub labels: Vec<u32>,
    pub data: Vec<u64>,
}

/// Explicit markers for anything that makes the summary less than complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryWarning {
    SourceMissing {
        source: SourceKind,
    },
    RowsSkipped {
        source: SourceKind,
        no_timestamp: usize,
        empty: usize,
    },
    MalformedCells {
        source: SourceKind,
        count: usize,
    },
    ContinuityUnavailable {
        status: ContinuityStatus,
    },
    NoAgeData,
    FieldIssues {
        attribute: String,
        malformed: u64,
        out_of_range: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDocument {
    pub schema_version: u8,
    pub algorithm_version: u8,
    pub generated_at: DateTime<Utc>,
    pub provenance: Provenance,
    pub ingest: IngestSummary,
    pub four_types_distribution: Vec<DistributionEntry>,
    pub gender_distribution: Vec<GenderEntry>,
    pub distributions: BTreeMap<String, DistributionTable>,
    pub numeric_attributes: BTreeMap<String, NumericStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_distribution_curve: Option<AgeDistributionCurve>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_buckets: Option<Vec<AgeBucket>>,
    pub age_stats: Option<NumericStats>,
    pub time_continuity: ContinuityReport,
    pub field_issues: BTreeMap<String, FieldIssues>,
    pub warnings: Vec<SummaryWarning>,
}

impl SummaryDocument {
    /// Assembles the document. `sources` holds one tally per source that was
    /// actually read.
    pub fn build(
        provenance: Provenance,
        sources: Vec<IngestTally>,
        aggregates: Aggregates,
        continuity: ContinuityReport,
    ) -> Self {
        let warnings = collect_warnings(&sources, &aggregates, &continuity);
        let records_total = sources.iter().map(|t| t.records).sum();

        let four_types_distribution = aggregates
            .table(FOUR_TYPES)
            .map(|t| t.entries.clone())
            .unwrap_or_default();
        let gender_distribution = aggregates
            .table(GENDER)
            .map(|t| {
                t.entries
                    .iter()
                    .map(|e| GenderEntry {
                        gender: e.value.clone(),
                        count: e.count,
                        percent: e.percent,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let age_stats = aggregates.numeric_stats(AGE).cloned();
        let (age_distribution_curve, age_buckets) = match aggregates.age_curve {
            Some(AgeCurve::PerAge(points)) => {
                let (labels, data) = points.into_iter().unzip();
                (Some(AgeDistributionCurve { labels, data }), None)
            }
            Some(AgeCurve::Bucketed(buckets)) => (None, Some(buckets)),
            None => (None, None),
        };

        let numeric_attributes = aggregates.numeric.into_iter().collect();
        let distributions = aggregates
            .tables
            .into_iter()
            .map(|t| (t.attribute.clone(), t))
            .collect();

        SummaryDocument {
            schema_version: SCHEMA_VERSION,
            algorithm_version: ALGORITHM_VERSION,
            generated_at: Utc::now(),
            provenance,
            ingest: IngestSummary {
                records_total,
                sources,
            },
            four_types_distribution,
            gender_distribution,
            distributions,
            numeric_attributes,
            age_distribution_curve,
            age_buckets,
            age_stats,
            time_continuity: continuity,
            field_issues: aggregates.issues,
            warnings,
        }
    }
}

fn collect_warnings(
    sources: &[IngestTally],
    aggregates: &Aggregates,
    continuity: &ContinuityReport,
) -> Vec<SummaryWarning> {
    let mut warnings = Vec::new();

    for kind in [SourceKind::TimeSeries, SourceKind::KeyValue] {
        if !sources.iter().any(|t| t.source == kind) {
            warnings.push(SummaryWarning::SourceMissing { source: kind });
        }
    }
    for tally in sources {
        if tally.skipped_no_timestamp > 0 || tally.skipped_empty > 0 {
            warnings.push(SummaryWarning::RowsSkipped {
                source: tally.source,
                no_timestamp: tally.skipped_no_timestamp,
                empty: tally.skipped_empty,
            });
        }
        if tally.malformed_cells > 0 {
            warnings.push(SummaryWarning::MalformedCells {
                source: tally.source,
                count: tally.malformed_cells,
            });
        }
    }
    if !continuity.available {
        warnings.push(SummaryWarning::ContinuityUnavailable {
            status: continuity.status,
        });
    }
    if aggregates.age_curve.is_none() {
        warnings.push(SummaryWarning::NoAgeData);
    }
    for (attribute, issues) in &aggregates.issues {
        if issues.malformed > 0 || issues.out_of_range > 0 {
            warnings.push(SummaryWarning::FieldIssues {
                attribute: attribute.clone(),
                malformed: issues.malformed,
                out_of_range: issues.out_of_range,
            });
        }
    }

    warnings
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analyzers::aggregate::aggregate;
    use crate::analyzers::continuity::{ContinuityOptions, estimate};
    use crate::record::Record;
    use chrono::{Duration, TimeZone};
    use serde_json::{Value, json};

    #[test]
    fn test_build_flat_fields_and_versions() {
        let doc = sample_document();

        assert_eq!(doc.schema_version, SCHEMA_VERSION);
        assert_eq!(doc.ingest.records_total, 4);
        assert_eq!(doc.four_types_distribution.len(), 2);
        assert_eq!(doc.gender_distribution[0].gender, "Female");
        assert!(doc.distributions.contains_key(FOUR_TYPES));
        assert!(doc.distributions.contains_key(GENDER));
        assert_eq!(doc.age_stats.as_ref().map(|s| s.non_null), Some(2));
    }

    #[test]
    fn test_bucketed_ages_keep_age_stats() {
        let start = Utc.with_ymd_and_hms(2025, 9, 11, 1, 0, 0).unwrap();
        let records: Vec<Record> = [(20, 28), (30, 38)]
            .into_iter()
            .enumerate()
            .map(|(i, (low, high))| {
                let Value::Object(map) = json!({"AgeRange": {"Low": low, "High": high}}) else {
                    panic!("fields must be an object");
                };
                Record::new(start + Duration::seconds(i as i64), SourceKind::KeyValue, map)
            })
            .collect();
        let config = AnalysisConfig::default();
        let aggregates = aggregate(&records, &config);
        let continuity = estimate(
            records.iter().map(|r| r.timestamp),
            &ContinuityOptions::default(),
        );
        let provenance = sample_document().provenance;

        let doc = SummaryDocument::build(provenance, Vec::new(), aggregates, continuity);

        assert!(doc.age_distribution_curve.is_none());
        assert_eq!(doc.age_buckets.as_ref().map(Vec::len), Some(2));
        let stats = doc.age_stats.unwrap();
        assert_eq!(stats.non_null, 2);
        assert_eq!(stats.mean, 29.0);
    }

    #[test]
    fn test_exactly_one_age_representation_serialized() {
        let doc = sample_document();
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json.get("age_distribution_curve").is_some());
        assert!(json.get("age_buckets").is_none());
        assert_eq!(json["age_distribution_curve"]["labels"], json!([25, 40]));
        assert_eq!(json["age_distribution_curve"]["data"], json!([1, 1]));
    }

    #[test]
    fn test_continuity_keys_serialized() {
        let json = serde_json::to_value(sample_document()).unwrap();
        let tc = &json["time_continuity"];

        for key in [
            "observed_points",
            "expected_points_est",
            "missing_points_total_est",
            "inferred_step",
            "span",
        ] {
            assert!(tc.get(key).is_some(), "missing {key}");
        }
        assert_eq!(tc["inferred_step"], 10);
    }

    #[test]
    fn test_warnings_flag_missing_source_and_age_issues() {
        let doc = sample_document();

        assert!(doc.warnings.contains(&SummaryWarning::SourceMissing {
            source: SourceKind::KeyValue
        }));
        assert!(doc.warnings.contains(&SummaryWarning::FieldIssues {
            attribute: AGE.to_string(),
            malformed: 1,
            out_of_range: 0,
        }));
        assert!(!doc.warnings.contains(&SummaryWarning::NoAgeData));
    }

    // Helper functions for tests
    pub(crate) fn sample_document() -> SummaryDocument {
        let start = Utc.with_ymd_and_hms(2025, 9, 11, 1, 0, 0).unwrap();
        let rows = [
            json!({"four_types": "1", "gender": "F", "age": "25"}),
            json!({"four_types": "2", "gender": "M", "age": "40"}),
            json!({"four_types": "2", "age": "N/A"}),
            json!({"gender": "female"}),
        ];
        let records: Vec<Record> = rows
            .into_iter()
            .enumerate()
            .map(|(i, fields)| {
                let Value::Object(map) = fields else {
                    panic!("fields must be an object");
                };
                Record::new(
                    start + Duration::seconds(10 * i as i64),
                    SourceKind::TimeSeries,
                    map,
                )
            })
            .collect();

        let config = AnalysisConfig::default();
        let aggregates = aggregate(&records, &config);
        let continuity = estimate(
            records.iter().map(|r| r.timestamp),
            &ContinuityOptions::default(),
        );
        let tally = IngestTally {
            source: SourceKind::TimeSeries,
            path: "batch_timestream.csv".to_string(),
            rows_read: 4,
            records: 4,
            skipped_no_timestamp: 0,
            skipped_empty: 0,
            malformed_cells: 0,
            duplicate_identifier_rows: 0,
            timestamp_column_found: true,
        };
        let provenance = Provenance {
            generated_by: "export_analyzer test".to_string(),
            input_folder: None,
            timeseries_csv: Some("batch_timestream.csv".to_string()),
            keyvalue_csv: None,
            config_path: None,
            config,
            step_override_seconds: None,
            utc_offset_hours: 9,
            continuity_source: ContinuitySource::All,
        };

        SummaryDocument::build(provenance, vec![tally], aggregates, continuity)
    }
}
