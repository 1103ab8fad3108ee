use std::path::{Path, PathBuf};

use tracing::info;

use crate::csv_source::read_delimited;
use crate::errors::LoadError;
use crate::model::Table;
use crate::sqlite_source::{read_sqlite_table, TableSelection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Sqlite,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "txt" => Ok(SourceFormat::Delimited),
            "db" | "sqlite" => Ok(SourceFormat::Sqlite),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub path: PathBuf,
    pub table: Option<TableSelection>,
}

impl SourceRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: None,
        }
    }

    pub fn with_table(mut self, selection: TableSelection) -> Self {
        self.table = Some(selection);
        self
    }

    /// File name without extension, used to label staged snapshots.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string())
    }
}

/// Reads a source into a typed table. The format is decided by extension
/// before the file is touched, so an unsupported path never reaches the disk.
pub fn load_source(request: &SourceRequest) -> Result<Table, LoadError> {
    let path = request.path.as_path();
    info!(path = %path.display(), "connecting to source");

    let format = SourceFormat::from_path(path)?;
    if !path.is_file() {
        return Err(LoadError::SourceNotFound(path.to_path_buf()));
    }

    let table = match format {
        SourceFormat::Delimited => read_delimited(path)?,
        SourceFormat::Sqlite => read_sqlite_table(path, request.table.as_ref())?,
    };

    info!(
        path = %path.display(),
        rows = table.height(),
        columns = table.width(),
        "source loaded"
    );
    Ok(table)
}
