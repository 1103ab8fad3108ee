use std::fmt;
use std::path::{Path, PathBuf};

use tabflow_parser::{load_source, SourceRequest, Table};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::params::AutomatedPlan;
use crate::staging::StagingWriter;
use crate::transforms::TransformOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loaded,
    Transforming,
    FinalizePending,
    Finalized,
    Aborted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Loaded => "loaded",
            PipelineState::Transforming => "transforming",
            PipelineState::FinalizePending => "finalize-pending",
            PipelineState::Finalized => "finalized",
            PipelineState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded {
        rows: usize,
        columns: usize,
        staged_path: PathBuf,
    },
    /// The source parsed but held no rows; nothing was replaced.
    Empty { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied { rows: usize, columns: usize },
    /// The operator succeeded but no rows matched.
    Emptied { columns: usize },
    NoChange,
}

/// Summary of one unattended load-transform-finalize run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub rows_loaded: usize,
    pub rows_written: usize,
    pub staged_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
}

/// Owns the working dataset for one pipeline run and enforces the phase order
/// idle -> loaded -> transforming -> finalize-pending -> finalized.
#[derive(Debug)]
pub struct Orchestrator {
    state: PipelineState,
    working: Option<Table>,
    draft: Option<Table>,
    source: Option<PathBuf>,
    history: Vec<String>,
    run_id: Uuid,
    staging: StagingWriter,
    warehouse: StagingWriter,
    final_name: String,
}

impl Orchestrator {
    pub fn new(staging: StagingWriter, warehouse: StagingWriter, final_name: impl Into<String>) -> Self {
        Self {
            state: PipelineState::Idle,
            working: None,
            draft: None,
            source: None,
            history: Vec::new(),
            run_id: Uuid::new_v4(),
            staging,
            warehouse,
            final_name: final_name.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.staging_writer(),
            config.warehouse_writer(),
            config.output.final_name.clone(),
        )
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Descriptions of the operators applied in this run, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// The table a viewer should see: the in-progress draft while
    /// transforming, otherwise the committed working dataset.
    pub fn current(&self) -> Option<&Table> {
        match self.state {
            PipelineState::Transforming => self.draft.as_ref(),
            _ => self.working.as_ref(),
        }
    }

    /// Starts a fresh run with no working data.
    pub fn reset(&mut self) {
        self.state = PipelineState::Idle;
        self.working = None;
        self.draft = None;
        self.source = None;
        self.history.clear();
        self.run_id = Uuid::new_v4();
    }

    fn invalid(&self, action: &'static str) -> PipelineError {
        PipelineError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    /// Loads a source and stages a raw snapshot of it. Any failure, or an
    /// empty source, leaves the current state and data untouched.
    pub fn load(&mut self, request: &SourceRequest) -> Result<LoadOutcome> {
        if self.state == PipelineState::Transforming {
            return Err(self.invalid("load a new source"));
        }

        let table = load_source(request)?;
        if table.is_empty() {
            warn!(path = %request.path.display(), "source contained no rows");
            return Ok(LoadOutcome::Empty {
                path: request.path.clone(),
            });
        }

        let label = format!("raw_load_{}", request.stem());
        let staged_path = self.staging.write(&table, &label)?;

        self.reset();
        let outcome = LoadOutcome::Loaded {
            rows: table.height(),
            columns: table.width(),
            staged_path,
        };
        info!(
            run_id = %self.run_id,
            path = %request.path.display(),
            rows = table.height(),
            columns = table.width(),
            "working dataset replaced"
        );
        self.working = Some(table);
        self.source = Some(request.path.clone());
        self.state = PipelineState::Loaded;
        Ok(outcome)
    }

    /// Enters the transform phase. Re-entering while already transforming
    /// keeps the current draft.
    pub fn begin_transform(&mut self) -> Result<()> {
        match self.state {
            PipelineState::Loaded => {
                let working = self.working.as_ref().ok_or(PipelineError::NoWorkingData)?;
                self.draft = Some(working.clone());
                self.state = PipelineState::Transforming;
                Ok(())
            }
            PipelineState::Transforming => Ok(()),
            PipelineState::Idle | PipelineState::Finalized | PipelineState::Aborted => {
                Err(PipelineError::NoWorkingData)
            }
            PipelineState::FinalizePending => Err(self.invalid("start transforming")),
        }
    }

    /// Applies one operator to the draft. On error the draft is unchanged.
    pub fn apply(&mut self, op: &TransformOp) -> Result<ApplyOutcome> {
        if self.state != PipelineState::Transforming {
            return Err(self.invalid("apply a transform"));
        }
        let draft = self.draft.as_ref().ok_or(PipelineError::NoWorkingData)?;

        let result = match op.apply(draft) {
            Ok(result) => result,
            Err(err) => {
                warn!(run_id = %self.run_id, op = op.name(), error = %err, "transform rejected");
                return Err(err);
            }
        };

        if result == *draft {
            info!(run_id = %self.run_id, op = op.name(), "transform left data unchanged");
            return Ok(ApplyOutcome::NoChange);
        }

        let outcome = if result.is_empty() {
            ApplyOutcome::Emptied {
                columns: result.width(),
            }
        } else {
            ApplyOutcome::Applied {
                rows: result.height(),
                columns: result.width(),
            }
        };
        info!(
            run_id = %self.run_id,
            op = op.name(),
            rows = result.height(),
            columns = result.width(),
            "transform applied"
        );
        self.history.push(op.to_string());
        self.draft = Some(result);
        Ok(outcome)
    }

    /// Commits the draft as the working dataset, ready for the final write.
    pub fn finish(&mut self) -> Result<()> {
        if self.state != PipelineState::Transforming {
            return Err(self.invalid("finish transforming"));
        }
        let draft = self.draft.take().ok_or(PipelineError::NoWorkingData)?;
        self.working = Some(draft);
        self.state = PipelineState::FinalizePending;
        Ok(())
    }

    /// Throws away the draft and the working dataset; nothing is persisted.
    pub fn discard(&mut self) -> Result<()> {
        if self.state != PipelineState::Transforming {
            return Err(self.invalid("discard"));
        }
        info!(run_id = %self.run_id, "run discarded");
        self.abort();
        Ok(())
    }

    /// Ends the run from any phase without persisting anything.
    pub fn abort(&mut self) {
        self.working = None;
        self.draft = None;
        self.state = PipelineState::Aborted;
    }

    /// Writes the working dataset to the warehouse and clears it. A failed
    /// write leaves the run finalize-pending with its data intact.
    pub fn finalize(&mut self) -> Result<PathBuf> {
        match self.state {
            PipelineState::Loaded | PipelineState::FinalizePending => {}
            PipelineState::Idle | PipelineState::Finalized | PipelineState::Aborted => {
                return Err(PipelineError::NoWorkingData)
            }
            PipelineState::Transforming => return Err(self.invalid("finalize")),
        }
        let table = self.working.as_ref().ok_or(PipelineError::NoWorkingData)?;
        self.state = PipelineState::FinalizePending;

        let path = match self.warehouse.write(table, &self.final_name) {
            Ok(path) => path,
            Err(err) => {
                error!(run_id = %self.run_id, error = %err, "final write failed");
                return Err(err);
            }
        };
        info!(
            run_id = %self.run_id,
            path = %path.display(),
            rows = table.height(),
            "run finalized"
        );
        self.working = None;
        self.state = PipelineState::Finalized;
        Ok(path)
    }

    /// Runs load, the plan's operators and finalize without any prompting.
    /// Any failure aborts the run and is returned to the caller.
    pub fn run_automated(&mut self, request: &SourceRequest, plan: &AutomatedPlan) -> Result<RunReport> {
        self.reset();
        let result = self.run_phases(request, plan);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn run_phases(&mut self, request: &SourceRequest, plan: &AutomatedPlan) -> Result<RunReport> {
        let (rows_loaded, staged_path) = match self.load(request)? {
            LoadOutcome::Loaded {
                rows, staged_path, ..
            } => (rows, staged_path),
            LoadOutcome::Empty { path } => {
                return Ok(RunReport {
                    run_id: self.run_id,
                    source: path,
                    rows_loaded: 0,
                    rows_written: 0,
                    staged_path: None,
                    output_path: None,
                });
            }
        };

        self.begin_transform()?;
        let ops = match self.current() {
            Some(table) => plan.operations(table),
            None => return Err(PipelineError::NoWorkingData),
        };
        for op in &ops {
            self.apply(op)?;
        }
        self.finish()?;

        let rows_written = self.working.as_ref().map_or(0, Table::height);
        let output_path = self.finalize()?;
        Ok(RunReport {
            run_id: self.run_id,
            source: request.path.clone(),
            rows_loaded,
            rows_written,
            staged_path: Some(staged_path),
            output_path: Some(output_path),
        })
    }
}
