use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tabflow_parser::{SourceRequest, TableSelection};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::staging::StagingWriter;
use crate::transforms::Casing;

pub const DEFAULT_CONFIG_FILE: &str = "tabflow.toml";

/// Every field has a default, so an absent or partial file is valid.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub output: OutputConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub source_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub warehouse_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("source_data"),
            staging_dir: PathBuf::from("staging_data"),
            warehouse_dir: PathBuf::from("data_warehouse"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub final_name: String,
    pub preview_rows: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            final_name: "FINAL_ANALYTICS".to_string(),
            preview_rows: 10,
        }
    }
}

/// Settings for the unattended run: where the data comes from and which fixed
/// cleaning steps stand in for the interactive prompts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    pub poll_millis: u64,
    pub default_source: PathBuf,
    pub default_table: Option<String>,
    pub clean_columns: Vec<String>,
    pub casing: Casing,
    pub drop_null_columns: Vec<String>,
    pub run_immediately: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            poll_millis: 1000,
            default_source: PathBuf::from("source_data/data.csv"),
            default_table: None,
            clean_columns: vec!["name".to_string()],
            casing: Casing::Title,
            drop_null_columns: vec!["name".to_string()],
            run_immediately: false,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_millis)
    }

    pub fn source_request(&self) -> SourceRequest {
        let request = SourceRequest::new(&self.default_source);
        match &self.default_table {
            Some(table) => request.with_table(TableSelection::parse(table)),
            None => request,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|err| PipelineError::Config(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// An explicit path must exist; otherwise `tabflow.toml` is read when
    /// present and defaults apply when it is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path).map_err(|err| {
            PipelineError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.schedule.interval_secs == 0 {
            return Err(PipelineError::Config(
                "schedule.interval_secs must be greater than zero".into(),
            ));
        }
        if self.schedule.poll_millis == 0 {
            return Err(PipelineError::Config(
                "schedule.poll_millis must be greater than zero".into(),
            ));
        }
        if self.output.final_name.trim().is_empty() {
            return Err(PipelineError::Config("output.final_name must not be empty".into()));
        }
        Ok(())
    }

    /// Creates the source, staging and warehouse directories. Called once at startup.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.paths.source_dir,
            &self.paths.staging_dir,
            &self.paths.warehouse_dir,
        ] {
            fs::create_dir_all(dir).map_err(|err| {
                PipelineError::Config(format!("cannot create directory {}: {err}", dir.display()))
            })?;
        }
        Ok(())
    }

    pub fn staging_writer(&self) -> StagingWriter {
        StagingWriter::new(&self.paths.staging_dir)
    }

    pub fn warehouse_writer(&self) -> StagingWriter {
        StagingWriter::new(&self.paths.warehouse_dir)
    }
}
