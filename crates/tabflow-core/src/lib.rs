pub mod config;
pub mod error;
pub mod orchestrator;
pub mod params;
pub mod scheduler;
pub mod seed;
pub mod staging;
pub mod transforms;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use orchestrator::{ApplyOutcome, LoadOutcome, Orchestrator, PipelineState, RunReport};
pub use params::{AutomatedPlan, ParameterSource};
pub use scheduler::{InterruptRelay, PipelineJob, RunGuard, ScheduledJob, Scheduler, SchedulerSummary, TickOutcome};
pub use staging::StagingWriter;
pub use transforms::TransformOp;
