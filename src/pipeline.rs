//! One complete analysis run: resolve inputs, normalize both sources
//! concurrently, aggregate, estimate continuity, then write the outputs.

use std::path::{Path, PathBuf};

use tokio::task;
use tracing::{info, warn};

use crate::analyzers::aggregate::aggregate;
use crate::analyzers::continuity::{ContinuityOptions, estimate};
use crate::analyzers::types::StepSource;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::output::{OUTPUT_DIR_NAME, OutputPaths, write_outputs};
use crate::report::{Language, render_report};
use crate::sources::{
    KeyValueSource, NormalizeOptions, NormalizedBatch, SourceAdapter, TimeSeriesSource, normalize,
};
use crate::summary::{ContinuitySource, Provenance, SummaryDocument};

pub const TIMESERIES_SUFFIX: &str = "_timestream.csv";
pub const KEYVALUE_SUFFIX: &str = "_dynamodb.csv";

/// Exporters stamp naive times in this zone.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

/// Everything the caller controls about a run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub input_folder: Option<PathBuf>,
    pub timeseries: Option<PathBuf>,
    pub keyvalue: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub step_override: Option<u64>,
    pub emit_csv: bool,
    pub lang: Language,
    pub utc_offset_hours: i32,
    pub output_dir: Option<PathBuf>,
    pub continuity_source: ContinuitySource,
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        Self {
            input_folder: None,
            timeseries: None,
            keyvalue: None,
            config_path: None,
            step_override: None,
            emit_csv: false,
            lang: Language::default(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            output_dir: None,
            continuity_source: ContinuitySource::default(),
        }
    }
}

/// Source files selected for a run. At least one is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    pub timeseries: Option<PathBuf>,
    pub keyvalue: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub document: SummaryDocument,
    pub outputs: OutputPaths,
}

/// Picks the source files. Explicit paths win over folder discovery.
pub fn resolve_inputs(req: &AnalysisRequest) -> Result<InputPaths> {
    let mut found = InputPaths {
        timeseries: None,
        keyvalue: None,
    };

    if let Some(folder) = &req.input_folder {
        if !folder.is_dir() {
            return Err(AnalysisError::InputMissing(format!(
                "input folder '{}' does not exist",
                folder.display()
            )));
        }
        found.timeseries = discover(folder, TIMESERIES_SUFFIX)?;
        found.keyvalue = discover(folder, KEYVALUE_SUFFIX)?;
    }

    for (explicit, slot) in [
        (&req.timeseries, &mut found.timeseries),
        (&req.keyvalue, &mut found.keyvalue),
    ] {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(AnalysisError::InputMissing(format!(
                    "'{}' does not exist",
                    path.display()
                )));
            }
            *slot = Some(path.clone());
        }
    }

    if found.timeseries.is_none() && found.keyvalue.is_none() {
        return Err(AnalysisError::InputMissing(
            "neither a time-series nor a key-value export was found".to_string(),
        ));
    }
    Ok(found)
}

/// First file in `folder`, by sorted name, ending in `suffix` or `suffix.gz`.
fn discover(folder: &Path, suffix: &str) -> Result<Option<PathBuf>> {
    let gz_suffix = format!("{suffix}.gz");
    let mut names: Vec<String> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(suffix) || name.ends_with(&gz_suffix))
        .collect();
    names.sort();
    Ok(names.into_iter().next().map(|name| folder.join(name)))
}

/// Output directory: explicit, else under the input folder, else next to the
/// first source.
pub fn output_dir(req: &AnalysisRequest, inputs: &InputPaths) -> PathBuf {
    if let Some(dir) = &req.output_dir {
        return dir.clone();
    }
    let base = req.input_folder.clone().or_else(|| {
        inputs
            .timeseries
            .as_ref()
            .or(inputs.keyvalue.as_ref())
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
    });
    base.unwrap_or_default().join(OUTPUT_DIR_NAME)
}

/// Runs `adapter` over `path` on the blocking pool. I/O failures become
/// [`AnalysisError::InputUnreadable`].
fn spawn_normalize<A>(
    adapter: A,
    path: Option<PathBuf>,
    opts: NormalizeOptions,
) -> Option<task::JoinHandle<Result<NormalizedBatch>>>
where
    A: SourceAdapter + 'static,
{
    path.map(|path| {
        task::spawn_blocking(move || {
            normalize(&adapter, &path, &opts).map_err(|e| match e {
                AnalysisError::Io(_) | AnalysisError::Csv(_) => AnalysisError::InputUnreadable {
                    reason: e.to_string(),
                    path,
                },
                other => other,
            })
        })
    })
}

async fn join(handle: Option<task::JoinHandle<Result<NormalizedBatch>>>) -> Result<Option<NormalizedBatch>> {
    match handle {
        Some(h) => Ok(Some(h.await??)),
        None => Ok(None),
    }
}

/// Executes a full run and writes its outputs.
#[tracing::instrument(skip_all)]
pub async fn run_analysis(req: &AnalysisRequest) -> Result<AnalysisOutcome> {
    let inputs = resolve_inputs(req)?;
    let config = match &req.config_path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let opts = NormalizeOptions::from_offset_hours(req.utc_offset_hours)?;

    info!(
        timeseries = ?inputs.timeseries,
        keyvalue = ?inputs.keyvalue,
        attributes = config.attributes.len(),
        "Starting analysis"
    );

    // Both sources are read in parallel; nothing downstream starts before both finish.
    let ts_handle = spawn_normalize(TimeSeriesSource, inputs.timeseries.clone(), opts);
    let kv_handle = spawn_normalize(KeyValueSource, inputs.keyvalue.clone(), opts);
    let batches: Vec<NormalizedBatch> = [join(ts_handle).await?, join(kv_handle).await?]
        .into_iter()
        .flatten()
        .collect();

    let mut records = Vec::new();
    let mut tallies = Vec::new();
    for batch in batches {
        records.extend(batch.records);
        tallies.push(batch.tally);
    }
    if records.is_empty() {
        warn!("No records survived normalization");
    }

    let aggregates = aggregate(&records, &config);

    let step = match (req.step_override, config.expected_step_seconds) {
        (Some(s), _) => Some((s, StepSource::Override)),
        (None, Some(s)) => Some((s, StepSource::Config)),
        (None, None) => None,
    };
    let continuity = estimate(
        records
            .iter()
            .filter(|r| req.continuity_source.includes(r.source))
            .map(|r| r.timestamp),
        &ContinuityOptions {
            step,
            outlier_factor: config.outlier_factor,
        },
    );

    let provenance = Provenance {
        generated_by: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        input_folder: req.input_folder.as_ref().map(|p| p.display().to_string()),
        timeseries_csv: inputs.timeseries.as_ref().map(|p| p.display().to_string()),
        keyvalue_csv: inputs.keyvalue.as_ref().map(|p| p.display().to_string()),
        config_path: req.config_path.as_ref().map(|p| p.display().to_string()),
        config,
        step_override_seconds: req.step_override,
        utc_offset_hours: req.utc_offset_hours,
        continuity_source: req.continuity_source,
    };
    let document = SummaryDocument::build(provenance, tallies, aggregates, continuity);
    let report = render_report(&document, req.lang);

    let dir = output_dir(req, &inputs);
    let outputs = write_outputs(&dir, &document, &report, req.emit_csv)?;

    Ok(AnalysisOutcome { document, outputs })
}
