//! CLI entry point for the export analyzer.
//!
//! `analyze` runs one batch analysis over a pair of exports and writes the
//! summary and report; `show` prints any summary document through the
//! tolerant reader.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use export_analyzer::pipeline::{AnalysisRequest, DEFAULT_UTC_OFFSET_HOURS, run_analysis};
use export_analyzer::render::SummaryView;
use export_analyzer::report::Language;
use export_analyzer::summary::ContinuitySource;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "export_analyzer")]
#[command(about = "Summarize attendance exports: distributions, ages and time continuity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a time-series export and/or a key-value export
    Analyze {
        /// Folder holding `*_timestream.csv` and `*_dynamodb.csv`
        #[arg(short, long)]
        input_folder: Option<PathBuf>,

        /// Time-series export (overrides discovery)
        #[arg(long)]
        timeseries: Option<PathBuf>,

        /// Key-value export (overrides discovery)
        #[arg(long)]
        keyvalue: Option<PathBuf>,

        /// Attribute configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sampling step in seconds, skips inference
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        step: Option<u64>,

        /// Also write per-table CSV files
        #[arg(long, default_value_t = false)]
        emit_csv: bool,

        /// Report language
        #[arg(long, value_enum, default_value_t = LangArg::En)]
        lang: LangArg,

        /// Offset in hours for timestamps written without a zone
        #[arg(long, default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_hyphen_values = true)]
        utc_offset: i32,

        /// Where to write outputs (default: `<input>/analysis_outputs`)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Which source's timestamps feed the continuity estimate
        #[arg(long, value_enum, default_value_t = ContinuityArg::All)]
        continuity_source: ContinuityArg,
    },
    /// Print a summary document, whatever version produced it
    Show {
        #[arg(value_name = "SUMMARY_JSON")]
        summary: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LangArg {
    En,
    Ja,
}

impl From<LangArg> for Language {
    fn from(arg: LangArg) -> Self {
        match arg {
            LangArg::En => Language::En,
            LangArg::Ja => Language::Ja,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ContinuityArg {
    All,
    Timeseries,
    Keyvalue,
}

impl From<ContinuityArg> for ContinuitySource {
    fn from(arg: ContinuityArg) -> Self {
        match arg {
            ContinuityArg::All => ContinuitySource::All,
            ContinuityArg::Timeseries => ContinuitySource::TimeSeries,
            ContinuityArg::Keyvalue => ContinuitySource::KeyValue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/export_analyzer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("export_analyzer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input_folder,
            timeseries,
            keyvalue,
            config,
            step,
            emit_csv,
            lang,
            utc_offset,
            output_dir,
            continuity_source,
        } => {
            let request = AnalysisRequest {
                input_folder,
                timeseries,
                keyvalue,
                config_path: config,
                step_override: step,
                emit_csv,
                lang: lang.into(),
                utc_offset_hours: utc_offset,
                output_dir,
                continuity_source: continuity_source.into(),
            };
            let outcome = run_analysis(&request).await?;

            let tc = &outcome.document.time_continuity;
            info!(
                records = outcome.document.ingest.records_total,
                status = ?tc.status,
                missing = tc.missing_points_total_est,
                warnings = outcome.document.warnings.len(),
                "Analysis complete"
            );
            println!("{}", serde_json::to_string_pretty(&outcome.outputs)?);
        }
        Commands::Show { summary } => {
            let content = std::fs::read_to_string(&summary)
                .with_context(|| format!("reading {}", summary.display()))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", summary.display()))?;
            print!("{}", SummaryView::from_value(&value).to_text());
        }
    }

    Ok(())
}
