use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("column '{column}' has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column '{column}' cannot hold {kind} data")]
    TypeMismatch { column: String, kind: &'static str },

    #[error("row mask has {found} entries, table has {expected} rows")]
    MaskLength { expected: usize, found: usize },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("unsupported file type '{extension}' for {}; only .csv, .txt, .db and .sqlite are supported", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("database {} contains no tables", .0.display())]
    EmptyDatabase(PathBuf),

    #[error("database {} requires a table selection; available tables: {available:?}", .path.display())]
    TableSelectionRequired {
        path: PathBuf,
        available: Vec<String>,
    },

    #[error("table '{requested}' not found; available tables: {available:?}")]
    UnknownTable {
        requested: String,
        available: Vec<String>,
    },

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("SQLite error in {}: {source}", .path.display())]
    Sqlite {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error while writing: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}
