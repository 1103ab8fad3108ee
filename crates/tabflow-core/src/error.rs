// crates/tabflow-core/src/error.rs

use std::path::PathBuf;

use tabflow_parser::{LoadError, TableError};
use thiserror::Error;

use crate::orchestrator::PipelineState;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Unsupported source format '{extension}' ({})", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Table selection failed: {0}")]
    TableSelection(LoadError),

    #[error("Failed to load source: {0}")]
    Load(LoadError),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Invalid filter value '{value}' for {kind} column '{column}'")]
    InvalidFilterValue {
        column: String,
        kind: &'static str,
        value: String,
    },

    #[error("Invalid aggregation spec: {0}")]
    InvalidAggregationSpec(String),

    #[error("Invalid clean parameters: {0}")]
    InvalidCleanSpec(String),

    #[error("Failed to write {}: {message}", .path.display())]
    WriteFailure { path: PathBuf, message: String },

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("No working data; load a source first")]
    NoWorkingData,

    #[error("Cannot {action} while pipeline is {state}")]
    InvalidTransition {
        state: PipelineState,
        action: &'static str,
    },

    #[error("Table operation failed: {0}")]
    Table(#[from] TableError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<LoadError> for PipelineError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::SourceNotFound(path) => PipelineError::SourceNotFound(path),
            LoadError::UnsupportedFormat { path, extension } => {
                PipelineError::UnsupportedFormat { path, extension }
            }
            err @ (LoadError::TableSelectionRequired { .. } | LoadError::UnknownTable { .. }) => {
                PipelineError::TableSelection(err)
            }
            other => PipelineError::Load(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
