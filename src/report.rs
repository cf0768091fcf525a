//! Plain-text report.
//!
//! A formatting projection of [`SummaryDocument`]: every number printed here
//! is read from the document, never recomputed.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::analyzers::types::{ContinuityStatus, DistributionTable, NumericStats, StepSource};
use crate::config::{AttributeType, FOUR_TYPES, GENDER};
use crate::summary::{SummaryDocument, SummaryWarning};

/// Maximum number of gaps listed in the report.
const GAP_LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    En,
    Ja,
}

struct Labels {
    title: &'static str,
    generated_at: &'static str,
    inputs: &'static str,
    rows_read: &'static str,
    records: &'static str,
    skipped: &'static str,
    malformed_cells: &'static str,
    continuity: &'static str,
    status: &'static str,
    step: &'static str,
    start: &'static str,
    end: &'static str,
    observed: &'static str,
    expected: &'static str,
    gap_count: &'static str,
    missing: &'static str,
    ratio: &'static str,
    gap_list: &'static str,
    unavailable: &'static str,
    four_types: &'static str,
    gender: &'static str,
    total: &'static str,
    items: &'static str,
    age: &'static str,
    age_stats: &'static str,
    age_curve: &'static str,
    age_buckets: &'static str,
    no_data: &'static str,
    attributes: &'static str,
    none: &'static str,
    warnings: &'static str,
    status_ok: &'static str,
    status_insufficient: &'static str,
    status_undetermined: &'static str,
    step_override: &'static str,
    step_config: &'static str,
    step_inferred: &'static str,
    kind_categorical: &'static str,
    kind_code: &'static str,
    kind_bool: &'static str,
    kind_numeric: &'static str,
}

const EN: Labels = Labels {
    title: "=== Post-export analysis report ===",
    generated_at: "Generated at",
    inputs: "[0] Inputs",
    rows_read: "rows read",
    records: "records",
    skipped: "skipped (no timestamp / empty)",
    malformed_cells: "malformed cells",
    continuity: "[1] Time continuity",
    status: "Status",
    step: "Step (seconds)",
    start: "Start",
    end: "End",
    observed: "Observed points",
    expected: "Expected points (est.)",
    gap_count: "Gap count",
    missing: "Missing points (est.)",
    ratio: "Continuity ratio (est.)",
    gap_list: "Gaps (first 10)",
    unavailable: "not available",
    four_types: "[2] four_types distribution",
    gender: "[3] Gender distribution",
    total: "Total",
    items: "",
    age: "[4] Age",
    age_stats: "Statistics",
    age_curve: "Distribution (per year of age)",
    age_buckets: "Distribution (ranges)",
    no_data: "no data",
    attributes: "[5] Configured attributes",
    none: "none",
    warnings: "[6] Warnings",
    status_ok: "ok",
    status_insufficient: "insufficient data (fewer than 2 distinct timestamps)",
    status_undetermined: "step undetermined",
    step_override: "command line",
    step_config: "config file",
    step_inferred: "inferred",
    kind_categorical: "categorical",
    kind_code: "code",
    kind_bool: "boolean",
    kind_numeric: "numeric",
};

const JA: Labels = Labels {
    title: "=== ダウンロード後解析レポート ===",
    generated_at: "生成日時",
    inputs: "[0] 入力",
    rows_read: "読込行数",
    records: "レコード数",
    skipped: "スキップ (時刻なし / 空行)",
    malformed_cells: "解析不能セル",
    continuity: "[1] 時間連続性",
    status: "状態",
    step: "期待ステップ秒",
    start: "開始時刻",
    end: "終了時刻",
    observed: "観測点数",
    expected: "推定期待点数",
    gap_count: "ギャップ数",
    missing: "推定欠損点数",
    ratio: "連続率(概算)",
    gap_list: "ギャップ一覧（先頭10件）",
    unavailable: "算出不可",
    four_types: "[2] four_types 分布",
    gender: "[3] 性別分布",
    total: "合計",
    items: "件",
    age: "[4] 年齢",
    age_stats: "年齢統計",
    age_curve: "年齢分布（1歳刻み）",
    age_buckets: "年齢分布（区間）",
    no_data: "データなし",
    attributes: "[5] コンフィグ属性",
    none: "なし",
    warnings: "[6] 注意事項",
    status_ok: "正常",
    status_insufficient: "データ不足（異なる時刻が2点未満）",
    status_undetermined: "ステップ推定不可",
    step_override: "コマンド指定",
    step_config: "設定ファイル",
    step_inferred: "推定",
    kind_categorical: "カテゴリ",
    kind_code: "コード",
    kind_bool: "真偽値",
    kind_numeric: "数値",
};

impl Language {
    fn labels(&self) -> &'static Labels {
        match self {
            Language::En => &EN,
            Language::Ja => &JA,
        }
    }
}

impl Labels {
    fn status_text(&self, status: ContinuityStatus) -> &'static str {
        match status {
            ContinuityStatus::Ok => self.status_ok,
            ContinuityStatus::InsufficientData => self.status_insufficient,
            ContinuityStatus::StepUndetermined => self.status_undetermined,
        }
    }

    fn step_source_text(&self, source: StepSource) -> &'static str {
        match source {
            StepSource::Override => self.step_override,
            StepSource::Config => self.step_config,
            StepSource::Inferred => self.step_inferred,
        }
    }

    fn kind_text(&self, kind: AttributeType) -> &'static str {
        match kind {
            AttributeType::Categorical => self.kind_categorical,
            AttributeType::Code => self.kind_code,
            AttributeType::Bool => self.kind_bool,
            AttributeType::Numeric => self.kind_numeric,
        }
    }
}

/// Renders the report for `doc` in `lang`.
pub fn render_report(doc: &SummaryDocument, lang: Language) -> String {
    let l = lang.labels();
    let offset = FixedOffset::east_opt(doc.provenance.utc_offset_hours * 3600)
        .unwrap_or_else(|| Utc.fix());
    let ts = |t: &DateTime<Utc>| t.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string();

    let mut out = vec![
        l.title.to_string(),
        format!("{}: {}", l.generated_at, ts(&doc.generated_at)),
        format!(
            "schema v{} / algorithm v{}",
            doc.schema_version, doc.algorithm_version
        ),
        String::new(),
        l.inputs.to_string(),
    ];

    for t in &doc.ingest.sources {
        out.push(format!("- {} ({})", t.source.as_str(), t.path));
        out.push(format!(
            "    {}: {}, {}: {}, {}: {} / {}, {}: {}",
            l.rows_read,
            t.rows_read,
            l.records,
            t.records,
            l.skipped,
            t.skipped_no_timestamp,
            t.skipped_empty,
            l.malformed_cells,
            t.malformed_cells
        ));
    }
    out.push(String::new());

    let tc = &doc.time_continuity;
    out.push(l.continuity.to_string());
    out.push(format!("- {}: {}", l.status, l.status_text(tc.status)));
    if let Some(span) = &tc.span {
        out.push(format!("- {}: {}", l.start, ts(&span.start)));
        out.push(format!("- {}: {}", l.end, ts(&span.end)));
    }
    out.push(format!("- {}: {}", l.observed, tc.observed_points));
    if tc.available {
        let step = tc.inferred_step.map_or_else(|| l.unavailable.to_string(), |s| s.to_string());
        let source = tc
            .step_source
            .map(|s| format!(" ({})", l.step_source_text(s)))
            .unwrap_or_default();
        out.push(format!("- {}: {step}{source}", l.step));
        out.push(format!("- {}: {}", l.expected, tc.expected_points_est));
        out.push(format!("- {}: {}", l.gap_count, tc.gap_count));
        out.push(format!("- {}: {}", l.missing, tc.missing_points_total_est));
        if let Some(ratio) = tc.continuity_ratio_est {
            out.push(format!("- {}: {:.1} %", l.ratio, ratio * 100.0));
        }
        if !tc.gaps.is_empty() {
            out.push(format!("  {}:", l.gap_list));
            for g in tc.gaps.iter().take(GAP_LIST_LIMIT) {
                out.push(format!(
                    "    - prev={}, next={}, gap_s={}, missing≈{}",
                    ts(&g.prev_time),
                    ts(&g.next_time),
                    g.gap_seconds,
                    g.missing_points_est
                ));
            }
        }
    } else {
        out.push(format!("- {}: {}", l.step, l.unavailable));
    }
    out.push(String::new());

    out.push(l.four_types.to_string());
    push_table(&mut out, l, doc.distributions.get(FOUR_TYPES));
    out.push(String::new());

    out.push(l.gender.to_string());
    push_table(&mut out, l, doc.distributions.get(GENDER));
    out.push(String::new());

    out.push(l.age.to_string());
    match &doc.age_stats {
        Some(stats) => out.push(format!("  {}: {}", l.age_stats, stats_line(stats))),
        None => out.push(format!("  {}: {}", l.age_stats, l.no_data)),
    }
    if let Some(curve) = &doc.age_distribution_curve {
        out.push(format!("  {}:", l.age_curve));
        for (age, count) in curve.labels.iter().zip(&curve.data) {
            out.push(format!("    - {age:02}: {count}{}", l.items));
        }
    } else if let Some(buckets) = &doc.age_buckets {
        out.push(format!("  {}:", l.age_buckets));
        for b in buckets {
            out.push(format!("    - {}: {}{}", b.label, b.count, l.items));
        }
    }
    out.push(String::new());

    out.push(l.attributes.to_string());
    let mut any = false;
    for (name, table) in &doc.distributions {
        if name == FOUR_TYPES || name == GENDER {
            continue;
        }
        any = true;
        out.push(format!("- {name} ({})", l.kind_text(table.kind)));
        push_table(&mut out, l, Some(table));
    }
    for (name, stats) in &doc.numeric_attributes {
        any = true;
        out.push(format!("- {name}: {}", stats_line(stats)));
    }
    if !any {
        out.push(format!("- {}", l.none));
    }
    out.push(String::new());

    out.push(l.warnings.to_string());
    if doc.warnings.is_empty() {
        out.push(format!("- {}", l.none));
    }
    for w in &doc.warnings {
        out.push(format!("- {}", warning_line(l, w)));
    }

    let mut text = out.join("\n");
    text.push('\n');
    text
}

fn push_table(out: &mut Vec<String>, l: &Labels, table: Option<&DistributionTable>) {
    let Some(table) = table.filter(|t| t.total > 0) else {
        out.push(format!("  {}", l.no_data));
        return;
    };
    out.push(format!("  {}: {}{}", l.total, table.total, l.items));
    for e in &table.entries {
        out.push(format!(
            "    - {}: {}{} ({}%)",
            e.value, e.count, l.items, e.percent
        ));
    }
}

fn stats_line(s: &NumericStats) -> String {
    format!(
        "n={}, min={:.1}, max={:.1}, mean={:.1}, median={:.1}",
        s.non_null, s.min, s.max, s.mean, s.median
    )
}

fn warning_line(l: &Labels, w: &SummaryWarning) -> String {
    match w {
        SummaryWarning::SourceMissing { source } => {
            format!("source_missing: {}", source.as_str())
        }
        SummaryWarning::RowsSkipped {
            source,
            no_timestamp,
            empty,
        } => format!(
            "rows_skipped: {} (no_timestamp={no_timestamp}, empty={empty})",
            source.as_str()
        ),
        SummaryWarning::MalformedCells { source, count } => {
            format!("malformed_cells: {} ({count})", source.as_str())
        }
        SummaryWarning::ContinuityUnavailable { status } => {
            format!("continuity_unavailable: {}", l.status_text(*status))
        }
        SummaryWarning::NoAgeData => "no_age_data".to_string(),
        SummaryWarning::FieldIssues {
            attribute,
            malformed,
            out_of_range,
        } => format!("field_issues: {attribute} (malformed={malformed}, out_of_range={out_of_range})"),
    }
}
