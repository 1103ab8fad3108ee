use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tabflow_parser::{write_delimited, Table};
use tracing::info;

use crate::error::{PipelineError, Result};

/// Writes immutable, timestamped CSV snapshots of a table into one directory.
#[derive(Debug, Clone)]
pub struct StagingWriter {
    root: PathBuf,
}

impl StagingWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, table: &Table, label: &str) -> Result<PathBuf> {
        self.write_at(table, label, Local::now().naive_local())
    }

    /// Writes `<label>_<YYYYmmdd_HHMMSS>.csv`, adding `_<n>` when a snapshot for
    /// the same second already exists. Data goes to a hidden partial file first
    /// and is renamed into place once complete.
    pub fn write_at(&self, table: &Table, label: &str, now: NaiveDateTime) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|err| write_failure(&self.root, err))?;

        let stem = format!("{}_{}", sanitize_label(label), now.format("%Y%m%d_%H%M%S"));
        let mut target = self.root.join(format!("{stem}.csv"));
        let mut attempt = 1;
        while target.exists() {
            target = self.root.join(format!("{stem}_{attempt}.csv"));
            attempt += 1;
        }

        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{stem}.csv"));
        let partial = self.root.join(format!(".{file_name}.partial"));

        if let Err(err) = write_snapshot(table, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(err);
        }
        if let Err(err) = fs::rename(&partial, &target) {
            let _ = fs::remove_file(&partial);
            return Err(write_failure(&target, err));
        }

        info!(path = %target.display(), rows = table.height(), "snapshot written");
        Ok(target)
    }
}

fn write_snapshot(table: &Table, partial: &Path) -> Result<()> {
    let file = File::create(partial).map_err(|err| write_failure(partial, err))?;
    let mut sink = BufWriter::new(file);
    write_delimited(table, &mut sink).map_err(|err| write_failure(partial, err))?;
    let file = sink
        .into_inner()
        .map_err(|err| write_failure(partial, err.into_error()))?;
    file.sync_all().map_err(|err| write_failure(partial, err))?;
    Ok(())
}

fn write_failure(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::WriteFailure {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "snapshot".to_string()
    } else {
        cleaned
    }
}
