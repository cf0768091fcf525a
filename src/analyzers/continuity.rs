//! Time-continuity estimation.
//!
//! The sampling step is inferred as the most frequent gap between consecutive
//! distinct timestamps, after dropping gaps longer than `outlier_factor`
//! times the median gap (those are outages, not cadence). Expected points
//! over the span follow from the step, and the shortfall against the
//! observed points is the missing-point estimate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::analyzers::types::{ContinuityReport, ContinuityStatus, Gap, Span, StepSource};
use crate::analyzers::utility::median;
use crate::config::DEFAULT_OUTLIER_FACTOR;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuityOptions {
    /// Externally supplied step in seconds and where it came from.
    pub step: Option<(u64, StepSource)>,
    pub outlier_factor: f64,
}

impl Default for ContinuityOptions {
    fn default() -> Self {
        Self {
            step: None,
            outlier_factor: DEFAULT_OUTLIER_FACTOR,
        }
    }
}

/// Result of step inference over a gap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInference {
    pub step: u64,
    pub discarded: usize,
}

/// Sorts timestamps ascending and removes duplicates.
pub fn distinct_sorted<I>(timestamps: I) -> Vec<DateTime<Utc>>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut ts: Vec<_> = timestamps.into_iter().collect();
    ts.sort_unstable();
    ts.dedup();
    ts
}

fn round_seconds(millis: i64) -> i64 {
    (millis as f64 / 1000.0).round() as i64
}

/// Consecutive gaps in whole seconds (rounded) over a sorted sequence.
pub fn gaps_seconds(sorted: &[DateTime<Utc>]) -> Vec<i64> {
    sorted
        .windows(2)
        .map(|w| round_seconds((w[1] - w[0]).num_milliseconds()))
        .collect()
}

/// Infers the sampling step from gaps.
///
/// Non-positive gaps are ignored. Gaps above `outlier_factor` × median are
/// discarded, then the mode of the remainder wins, ties going to the smaller
/// gap. Returns `None` when no positive gap exists.
pub fn infer_step(gaps: &[i64], outlier_factor: f64) -> Option<StepInference> {
    let positive: Vec<i64> = gaps.iter().copied().filter(|g| *g > 0).collect();
    if positive.is_empty() {
        return None;
    }

    let as_f64: Vec<f64> = positive.iter().map(|g| *g as f64).collect();
    let threshold = median(&as_f64) * outlier_factor;

    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    let mut discarded = 0;
    for g in positive {
        if g as f64 > threshold {
            discarded += 1;
        } else {
            *counts.entry(g).or_default() += 1;
        }
    }

    // Ascending iteration with a strict comparison keeps the smaller gap on ties.
    let mut best: Option<(i64, usize)> = None;
    for (gap, count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((gap, count));
        }
    }

    best.map(|(gap, _)| StepInference {
        step: gap as u64,
        discarded,
    })
}

/// Builds the continuity report for a set of timestamps (duplicates allowed).
pub fn estimate<I>(timestamps: I, opts: &ContinuityOptions) -> ContinuityReport
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let sorted = distinct_sorted(timestamps);
    let observed = sorted.len() as u64;

    let span = match (sorted.first(), sorted.last()) {
        (Some(&start), Some(&end)) => Some(Span {
            start,
            end,
            seconds: round_seconds((end - start).num_milliseconds()),
        }),
        _ => None,
    };

    if sorted.len() < 2 {
        debug!(observed, "Too few distinct timestamps for continuity");
        return unavailable(ContinuityStatus::InsufficientData, observed, span);
    }

    let gaps = gaps_seconds(&sorted);
    let (step, step_source, discarded) = match opts.step {
        Some((0, source)) => {
            warn!(?source, "Zero sampling step supplied; continuity left undetermined");
            return unavailable(ContinuityStatus::StepUndetermined, observed, span);
        }
        Some((step, source)) => (step, source, 0),
        None => match infer_step(&gaps, opts.outlier_factor) {
            Some(inferred) => (inferred.step, StepSource::Inferred, inferred.discarded),
            None => {
                return unavailable(ContinuityStatus::StepUndetermined, observed, span);
            }
        },
    };

    let span_seconds = span.as_ref().map_or(0, |s| s.seconds).max(0) as u64;
    let expected = span_seconds / step + 1;
    let missing = expected.saturating_sub(observed);

    let gap_list: Vec<Gap> = sorted
        .windows(2)
        .zip(&gaps)
        .filter(|(_, g)| **g > step as i64)
        .map(|(w, g)| Gap {
            prev_time: w[0],
            next_time: w[1],
            gap_seconds: *g,
            missing_points_est: ((*g as f64 / step as f64).round() as u64).saturating_sub(1),
        })
        .collect();

    debug!(
        step,
        ?step_source,
        observed,
        expected,
        missing,
        gaps = gap_list.len(),
        "Continuity estimated"
    );

    ContinuityReport {
        status: ContinuityStatus::Ok,
        available: true,
        observed_points: observed,
        expected_points_est: expected,
        missing_points_total_est: missing,
        inferred_step: Some(step),
        step_source: Some(step_source),
        span,
        gap_count: gap_list.len(),
        continuity_ratio_est: Some(observed as f64 / expected as f64),
        discarded_outlier_gaps: discarded,
        gaps: gap_list,
    }
}

fn unavailable(status: ContinuityStatus, observed: u64, span: Option<Span>) -> ContinuityReport {
    ContinuityReport {
        status,
        available: false,
        observed_points: observed,
        expected_points_est: 0,
        missing_points_total_est: 0,
        inferred_step: None,
        step_source: None,
        span,
        gap_count: 0,
        continuity_ratio_est: None,
        discarded_outlier_gaps: 0,
        gaps: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_regular_stream_of_100_points() {
        let ts: Vec<_> = (0..100).map(|i| at(i * 60)).collect();
        let report = estimate(ts, &ContinuityOptions::default());

        assert_eq!(report.status, ContinuityStatus::Ok);
        assert_eq!(report.inferred_step, Some(60));
        assert_eq!(report.expected_points_est, 100);
        assert_eq!(report.observed_points, 100);
        assert_eq!(report.missing_points_total_est, 0);
        assert_eq!(report.gap_count, 0);
        assert_eq!(report.continuity_ratio_est, Some(1.0));
    }

    #[test]
    fn test_minute_stream_with_one_gap() {
        let ts: Vec<_> = [0, 1, 2, 5, 6].iter().map(|m| at(m * 60)).collect();
        let report = estimate(ts, &ContinuityOptions::default());

        assert_eq!(report.inferred_step, Some(60));
        assert_eq!(report.span.as_ref().unwrap().seconds, 360);
        assert_eq!(report.expected_points_est, 7);
        assert_eq!(report.observed_points, 5);
        assert_eq!(report.missing_points_total_est, 2);
        assert_eq!(report.gap_count, 1);
        assert_eq!(report.gaps[0].gap_seconds, 180);
        assert_eq!(report.gaps[0].missing_points_est, 2);
    }

    #[test]
    fn test_duplicate_timestamps_count_once() {
        let ts = vec![at(0), at(0), at(10), at(10), at(20)];
        let report = estimate(ts, &ContinuityOptions::default());

        assert_eq!(report.observed_points, 3);
        assert_eq!(report.inferred_step, Some(10));
        assert_eq!(report.missing_points_total_est, 0);
    }

    #[test]
    fn test_fewer_than_two_timestamps_is_unavailable() {
        let report = estimate(vec![at(0), at(0)], &ContinuityOptions::default());
        assert_eq!(report.status, ContinuityStatus::InsufficientData);
        assert!(!report.available);
        assert_eq!(report.inferred_step, None);
        assert_eq!(report.expected_points_est, 0);
        assert_eq!(report.missing_points_total_est, 0);

        let empty = estimate(Vec::new(), &ContinuityOptions::default());
        assert_eq!(empty.observed_points, 0);
        assert!(empty.span.is_none());
    }

    #[test]
    fn test_override_skips_inference_but_not_with_one_point() {
        let opts = ContinuityOptions {
            step: Some((30, StepSource::Override)),
            ..Default::default()
        };
        let ts: Vec<_> = (0..4).map(|i| at(i * 60)).collect();
        let report = estimate(ts, &opts);
        assert_eq!(report.inferred_step, Some(30));
        assert_eq!(report.step_source, Some(StepSource::Override));
        assert_eq!(report.expected_points_est, 7);
        assert_eq!(report.missing_points_total_est, 3);

        let single = estimate(vec![at(0)], &opts);
        assert_eq!(single.status, ContinuityStatus::InsufficientData);
    }

    #[test]
    fn test_zero_supplied_step_is_undetermined() {
        let opts = ContinuityOptions {
            step: Some((0, StepSource::Override)),
            ..Default::default()
        };
        let report = estimate(vec![at(0), at(60)], &opts);

        assert_eq!(report.status, ContinuityStatus::StepUndetermined);
        assert!(!report.available);
        assert_eq!(report.inferred_step, None);
        assert_eq!(report.observed_points, 2);
    }

    #[test]
    fn test_sub_second_gaps_leave_step_undetermined() {
        let base = at(0);
        let ts = vec![base, base + Duration::milliseconds(100)];
        let report = estimate(ts, &ContinuityOptions::default());
        assert_eq!(report.status, ContinuityStatus::StepUndetermined);
        assert_eq!(report.missing_points_total_est, 0);
    }

    #[test]
    fn test_infer_step_discards_outages() {
        // One long outage must not pull the step away from 10s.
        let gaps = vec![10, 10, 10, 3600, 10, 20];
        let inferred = infer_step(&gaps, 10.0).unwrap();
        assert_eq!(inferred.step, 10);
        assert_eq!(inferred.discarded, 1);
    }

    #[test]
    fn test_infer_step_tie_goes_to_smaller_gap() {
        let inferred = infer_step(&[20, 10, 20, 10], 10.0).unwrap();
        assert_eq!(inferred.step, 10);
    }

    #[test]
    fn test_infer_step_no_positive_gaps() {
        assert_eq!(infer_step(&[0, 0], 10.0), None);
        assert_eq!(infer_step(&[], 10.0), None);
    }

    #[test]
    fn test_missing_never_negative_when_oversampled() {
        // Jittery stream: more points than the inferred cadence predicts.
        let ts = vec![at(0), at(10), at(15), at(20), at(30)];
        let report = estimate(ts, &ContinuityOptions::default());
        assert_eq!(report.inferred_step, Some(5));
        assert_eq!(
            report.missing_points_total_est,
            report.expected_points_est.saturating_sub(report.observed_points)
        );
    }

    // Helper functions for tests
    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 11, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }
}
