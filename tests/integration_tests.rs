use std::fs;
use std::path::Path;

use export_analyzer::analyzers::types::{ContinuityStatus, StepSource};
use export_analyzer::error::AnalysisError;
use export_analyzer::output::{AGE_CSV, GAPS_CSV, OUTPUT_DIR_NAME, REPORT_FILE, SUMMARY_FILE};
use export_analyzer::pipeline::{AnalysisRequest, run_analysis};
use export_analyzer::record::SourceKind;
use export_analyzer::render::{AgeView, SummaryView};
use export_analyzer::report::Language;
use export_analyzer::summary::{ContinuitySource, SummaryWarning};
use serde_json::Value;

const TIMESERIES: &str = "\
time,day,hour,minutes,stress,attention,four_types,user_id
2025-09-11 10:00:00,11,10,0,0.2,0.5,1,u1
2025-09-11 10:01:00,11,10,1,0.3,0.5,2,u1
2025-09-11 10:02:00,11,10,2,0.4,0.6,2.0,u1
2025-09-11 10:05:00,11,10,5,0.5,0.6,3,u1
2025-09-11 10:06:00,11,10,6,0.6,0.7,,u1
";

const KEYVALUE: &str = "\
user_id,inserted_time,data
cam-1,2025-09-11 10:00:30,\"{'Gender': {'Value': 'Female', 'Confidence': Decimal('99.5')}, 'AgeRange': {'Low': Decimal('20'), 'High': Decimal('28')}}\"
cam-1,2025-09-11 10:03:30,\"{'Gender': {'Value': 'Male'}, 'AgeRange': {'Low': 30, 'High': 38}}\"
";

#[tokio::test]
async fn test_full_pipeline_over_both_sources() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let req = AnalysisRequest {
        input_folder: Some(dir.path().to_path_buf()),
        emit_csv: true,
        continuity_source: ContinuitySource::TimeSeries,
        ..AnalysisRequest::default()
    };
    let outcome = run_analysis(&req).await.unwrap();
    let doc = &outcome.document;

    assert_eq!(doc.ingest.records_total, 7);
    assert_eq!(doc.ingest.sources.len(), 2);

    let four: Vec<(&str, u64)> = doc
        .four_types_distribution
        .iter()
        .map(|e| (e.value.as_str(), e.count))
        .collect();
    assert_eq!(four, vec![("1", 1), ("2", 2), ("3", 1)]);
    assert_eq!(doc.field_issues["four_types"].no_value, 3);

    assert_eq!(doc.gender_distribution.len(), 2);
    assert_eq!(doc.gender_distribution[0].gender, "Female");
    assert_eq!(doc.gender_distribution[0].percent, 50.0);

    assert!(doc.age_distribution_curve.is_none());
    let buckets = doc.age_buckets.as_ref().unwrap();
    assert_eq!(buckets[0].label, "20-28");
    assert_eq!(buckets[1].label, "30-38");

    let tc = &doc.time_continuity;
    assert_eq!(tc.status, ContinuityStatus::Ok);
    assert_eq!(tc.inferred_step, Some(60));
    assert_eq!(tc.observed_points, 5);
    assert_eq!(tc.expected_points_est, 7);
    assert_eq!(tc.missing_points_total_est, 2);
    assert_eq!(tc.gaps.len(), 1);
    assert_eq!(tc.gaps[0].gap_seconds, 180);

    let out = dir.path().join(OUTPUT_DIR_NAME);
    assert_eq!(outcome.outputs.summary, out.join(SUMMARY_FILE));
    assert_eq!(outcome.outputs.report, out.join(REPORT_FILE));
    assert_eq!(outcome.outputs.csv.len(), 4);

    let written: Value =
        serde_json::from_str(&fs::read_to_string(&outcome.outputs.summary).unwrap()).unwrap();
    assert_eq!(written["time_continuity"]["missing_points_total_est"], 2);
    assert!(written.get("age_distribution_curve").is_none());

    let gaps = fs::read_to_string(out.join(GAPS_CSV)).unwrap();
    assert_eq!(gaps.lines().count(), 2);
    let age = fs::read_to_string(out.join(AGE_CSV)).unwrap();
    assert_eq!(age.lines().next(), Some("label,low,high,count"));

    let report = fs::read_to_string(&outcome.outputs.report).unwrap();
    assert!(report.contains("Missing points (est.): 2"));
    assert!(report.contains("20-28: 1"));
}

#[tokio::test]
async fn test_written_summary_reads_back_through_tolerant_view() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let outcome = run_analysis(&request_for(dir.path())).await.unwrap();
    let value: Value =
        serde_json::from_str(&fs::read_to_string(&outcome.outputs.summary).unwrap()).unwrap();
    let view = SummaryView::from_value(&value);

    assert_eq!(view.schema_version, Some(2));
    assert_eq!(view.four_types.len(), 3);
    assert_eq!(view.gender.len(), 2);
    assert!(matches!(view.age, Some(AgeView::Buckets(ref b)) if b.len() == 2));
    assert_eq!(
        view.continuity.unwrap().observed_points,
        Some(outcome.document.time_continuity.observed_points)
    );
}

#[tokio::test]
async fn test_continuity_defaults_to_all_sources() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let outcome = run_analysis(&request_for(dir.path())).await.unwrap();
    let tc = &outcome.document.time_continuity;

    assert_eq!(tc.observed_points, 7);
    assert!(tc.available);
    assert_eq!(
        tc.missing_points_total_est,
        tc.expected_points_est.saturating_sub(tc.observed_points)
    );
}

#[tokio::test]
async fn test_single_source_with_step_override() {
    let dir = tempfile::tempdir().unwrap();
    let ts = dir.path().join("batch_timestream.csv");
    fs::write(&ts, TIMESERIES).unwrap();

    let req = AnalysisRequest {
        timeseries: Some(ts),
        step_override: Some(30),
        ..AnalysisRequest::default()
    };
    let outcome = run_analysis(&req).await.unwrap();
    let doc = &outcome.document;

    assert_eq!(doc.time_continuity.step_source, Some(StepSource::Override));
    assert_eq!(doc.time_continuity.expected_points_est, 13);
    assert_eq!(doc.time_continuity.missing_points_total_est, 8);
    assert!(doc.warnings.contains(&SummaryWarning::SourceMissing {
        source: SourceKind::KeyValue
    }));
    assert!(doc.warnings.contains(&SummaryWarning::NoAgeData));
    assert!(doc.gender_distribution.is_empty());
    assert!(outcome.outputs.csv.is_empty());
    assert!(dir.path().join(OUTPUT_DIR_NAME).join(SUMMARY_FILE).exists());
}

#[tokio::test]
async fn test_zero_step_override_completes_without_continuity() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let req = AnalysisRequest {
        step_override: Some(0),
        ..request_for(dir.path())
    };
    let outcome = run_analysis(&req).await.unwrap();
    let tc = &outcome.document.time_continuity;

    assert_eq!(tc.status, ContinuityStatus::StepUndetermined);
    assert!(!tc.available);
    assert!(outcome.document.warnings.contains(&SummaryWarning::ContinuityUnavailable {
        status: ContinuityStatus::StepUndetermined
    }));
}

#[tokio::test]
async fn test_config_file_adds_attributes_and_step() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let config = dir.path().join("attributes.json");
    fs::write(
        &config,
        r#"{
            "attributes": [
                {"name": "user", "keys": ["user_id"], "type": "categorical"},
                {"name": "stress", "source_keys": ["stress"], "type": "number", "min": 0, "max": 1}
            ],
            "expected_step_seconds": 60
        }"#,
    )
    .unwrap();

    let req = AnalysisRequest {
        config_path: Some(config),
        lang: Language::Ja,
        ..request_for(dir.path())
    };
    let outcome = run_analysis(&req).await.unwrap();
    let doc = &outcome.document;

    let user = &doc.distributions["user"];
    assert_eq!(user.total, 7);
    assert_eq!(user.entries[0].value, "cam-1");
    assert_eq!(user.entries[0].count, 2);
    assert_eq!(user.entries[1].value, "u1");

    let stress = &doc.numeric_attributes["stress"];
    assert_eq!(stress.non_null, 5);
    assert!((stress.mean - 0.4).abs() < 1e-9);
    assert!((stress.max - 0.6).abs() < 1e-9);

    assert_eq!(doc.time_continuity.step_source, Some(StepSource::Config));
    assert_eq!(doc.time_continuity.inferred_step, Some(60));

    let report = fs::read_to_string(&outcome.outputs.report).unwrap();
    assert!(report.contains("時間連続性"));
    assert!(report.contains("- user"));
}

#[tokio::test]
async fn test_invalid_config_is_fatal_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let config = dir.path().join("attributes.json");
    fs::write(&config, r#"{"attributes": [{"name": "", "keys": ["x"]}]}"#).unwrap();

    let req = AnalysisRequest {
        config_path: Some(config),
        ..request_for(dir.path())
    };
    let err = run_analysis(&req).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Config(_)));
    assert!(!dir.path().join(OUTPUT_DIR_NAME).exists());
}

#[tokio::test]
async fn test_missing_inputs_are_fatal() {
    let dir = tempfile::tempdir().unwrap();

    let err = run_analysis(&request_for(dir.path())).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InputMissing(_)));

    let req = AnalysisRequest {
        keyvalue: Some(dir.path().join("absent_dynamodb.csv")),
        ..AnalysisRequest::default()
    };
    let err = run_analysis(&req).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InputMissing(_)));
}

#[tokio::test]
async fn test_source_without_timestamps_is_flagged_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("x_timestream.csv"),
        "four_types,stress\n1,0.2\n2,0.3\n",
    )
    .unwrap();

    let outcome = run_analysis(&request_for(dir.path())).await.unwrap();
    let doc = &outcome.document;

    assert_eq!(doc.ingest.records_total, 0);
    assert_eq!(doc.time_continuity.status, ContinuityStatus::InsufficientData);
    assert!(doc.warnings.contains(&SummaryWarning::RowsSkipped {
        source: SourceKind::TimeSeries,
        no_timestamp: 2,
        empty: 0,
    }));
    assert!(doc.warnings.contains(&SummaryWarning::ContinuityUnavailable {
        status: ContinuityStatus::InsufficientData
    }));
}

// Helper functions for tests
fn write_fixtures(dir: &Path) {
    fs::write(dir.join("batch_timestream.csv"), TIMESERIES).unwrap();
    fs::write(dir.join("batch_dynamodb.csv"), KEYVALUE).unwrap();
}

fn request_for(dir: &Path) -> AnalysisRequest {
    AnalysisRequest {
        input_folder: Some(dir.to_path_buf()),
        ..AnalysisRequest::default()
    }
}
