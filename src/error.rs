//! Error taxonomy for an analysis run.
//!
//! Only failures that end the run live here. Per-field parse problems and a
//! too-short timestamp stream are recovered where they happen and reported
//! as counters and flags inside the summary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no input source available: {0}")]
    InputMissing(String),
    #[error("input '{path}' could not be read: {reason}")]
    InputUnreadable { path: PathBuf, reason: String },
    #[error("attribute configuration error: {0}")]
    Config(String),
    #[error("failed to write '{path}': {reason}")]
    Output { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("normalization task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
