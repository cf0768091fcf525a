use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::analyzers::types::{
    AgeBucket, AgeCurve, DistributionEntry, DistributionTable, FieldIssues, NumericStats,
};
use crate::analyzers::utility::{mean, median, pct, stddev};
use crate::classify::{Resolution, UNKNOWN_LABEL, classify};
use crate::config::{AGE, AnalysisConfig, AttributeConfig, AttributeType};
use crate::record::Record;

/// Everything the aggregation stage produces for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    /// One table per categorical, code or bool attribute, in config order.
    pub tables: Vec<DistributionTable>,
    /// Stats per numeric attribute with at least one value, in config order.
    pub numeric: Vec<(String, NumericStats)>,
    pub age_curve: Option<AgeCurve>,
    pub issues: BTreeMap<String, FieldIssues>,
}

impl Aggregates {
    pub fn table(&self, attribute: &str) -> Option<&DistributionTable> {
        self.tables.iter().find(|t| t.attribute == attribute)
    }

    pub fn numeric_stats(&self, attribute: &str) -> Option<&NumericStats> {
        self.numeric
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, stats)| stats)
    }
}

/// Classifies every record against every configured attribute and tabulates
/// the results. Records are counted independently per attribute: a record
/// without a value for one attribute still counts toward the others.
#[tracing::instrument(skip_all, fields(records = records.len(), attributes = config.attributes.len()))]
pub fn aggregate(records: &[Record], config: &AnalysisConfig) -> Aggregates {
    let mut tables = Vec::new();
    let mut numeric = Vec::new();
    let mut age_curve = None;
    let mut issues = BTreeMap::new();

    for attr in &config.attributes {
        let resolutions = classify(records, attr);
        let mut attr_issues = tally_issues(&resolutions);

        match attr.kind {
            AttributeType::Numeric => {
                if let Some(stats) = numeric_stats(&resolutions) {
                    numeric.push((attr.name.clone(), stats));
                }
                if attr.name == AGE {
                    age_curve = build_age_curve(&resolutions, &mut attr_issues);
                }
            }
            _ => tables.push(distribution_table(attr, &resolutions)),
        }

        issues.insert(attr.name.clone(), attr_issues);
    }

    Aggregates {
        tables,
        numeric,
        age_curve,
        issues,
    }
}

/// Counts resolved labels for one attribute.
pub fn distribution_table(attr: &AttributeConfig, resolutions: &[Resolution]) -> DistributionTable {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for r in resolutions {
        if let Resolution::Label(label) = r {
            *counts.entry(label.as_str()).or_default() += 1;
        }
    }

    let total: u64 = counts.values().sum();
    let mut entries: Vec<DistributionEntry> = counts
        .into_iter()
        .map(|(value, count)| DistributionEntry {
            value: value.to_string(),
            count,
            percent: pct(count, total),
        })
        .collect();
    entries.sort_by(|a, b| label_order(&a.value, &b.value));

    DistributionTable {
        attribute: attr.name.clone(),
        kind: attr.kind,
        total,
        entries,
    }
}

/// Integer-like labels numerically, then other labels, then `unknown`.
fn label_order(a: &str, b: &str) -> Ordering {
    fn rank(label: &str) -> (u8, Option<i64>) {
        if label == UNKNOWN_LABEL {
            (2, None)
        } else if let Ok(n) = label.parse::<i64>() {
            (0, Some(n))
        } else {
            (1, None)
        }
    }
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}

/// Min/max/mean/median over exact values and range midpoints.
pub fn numeric_stats(resolutions: &[Resolution]) -> Option<NumericStats> {
    let values: Vec<f64> = resolutions
        .iter()
        .filter_map(|r| match r {
            Resolution::Number(x) => Some(*x),
            Resolution::Range { low, high } => Some((low + high) / 2.0),
            _ => None,
        })
        .collect();
    if values.is_empty() {
        return None;
    }

    let avg = mean(&values);
    Some(NumericStats {
        non_null: values.len(),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: avg,
        median: median(&values),
        stddev: stddev(&values, avg),
    })
}

/// Builds the age curve. Exact ages win: when any record has one, the curve
/// is per-integer and range-only records are tallied instead of counted.
/// Only when no exact age exists do ranges become buckets.
pub fn build_age_curve(resolutions: &[Resolution], issues: &mut FieldIssues) -> Option<AgeCurve> {
    let mut exact: BTreeMap<u32, u64> = BTreeMap::new();
    let mut ranges: BTreeMap<(u32, u32), u64> = BTreeMap::new();

    for r in resolutions {
        match r {
            Resolution::Number(x) if *x >= 0.0 => *exact.entry(x.trunc() as u32).or_default() += 1,
            Resolution::Range { low, high } if *low >= 0.0 => {
                *ranges
                    .entry((low.trunc() as u32, high.trunc() as u32))
                    .or_default() += 1
            }
            _ => {}
        }
    }

    if !exact.is_empty() {
        issues.range_only += ranges.values().sum::<u64>();
        return Some(AgeCurve::PerAge(exact.into_iter().collect()));
    }
    if ranges.is_empty() {
        return None;
    }

    Some(AgeCurve::Bucketed(
        ranges
            .into_iter()
            .map(|((low, high), count)| AgeBucket {
                label: format!("{low}-{high}"),
                low,
                high,
                count,
            })
            .collect(),
    ))
}

fn tally_issues(resolutions: &[Resolution]) -> FieldIssues {
    let mut issues = FieldIssues::default();
    for r in resolutions {
        match r {
            Resolution::NoValue => issues.no_value += 1,
            Resolution::Malformed => issues.malformed += 1,
            Resolution::OutOfRange => issues.out_of_range += 1,
            Resolution::Label(l) if l == UNKNOWN_LABEL => issues.unknown += 1,
            _ => {}
        }
    }
    issues
}
