//! Fixed-interval re-runs of the automated pipeline.
//!
//! The loop polls a coarse ticker and runs the job inline once it is due, so a
//! run always completes before the next tick is looked at. A shared
//! [`RunGuard`] serializes runs started from different triggers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tabflow_parser::SourceRequest;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, ScheduleConfig};
use crate::error::Result;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::params::AutomatedPlan;

/// Run-in-progress flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one run; releases the guard when dropped.
#[derive(Debug)]
pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Routes interrupts to whichever scheduler loop is currently armed. A single
/// process-wide signal listener calls [`InterruptRelay::deliver`]; when no loop
/// is armed the caller decides what an interrupt means (the console exits).
#[derive(Debug, Clone, Default)]
pub struct InterruptRelay {
    slot: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl InterruptRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the relay and returns a future that resolves on the next
    /// delivered interrupt, or once the relay is disarmed.
    pub fn arm(&self) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        async move {
            let _ = rx.await;
        }
    }

    pub fn disarm(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Hands one interrupt to the armed loop. Returns `false` when nothing was
    /// armed to receive it.
    pub fn deliver(&self) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

pub trait ScheduledJob {
    fn run(&mut self) -> Result<RunReport>;
}

impl<F> ScheduledJob for F
where
    F: FnMut() -> Result<RunReport>,
{
    fn run(&mut self) -> Result<RunReport> {
        self()
    }
}

/// The full unattended pipeline against the configured default source. Each
/// run gets a fresh orchestrator, so nothing carries over between runs.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    config: PipelineConfig,
    request: SourceRequest,
    plan: AutomatedPlan,
}

impl PipelineJob {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
            request: config.schedule.source_request(),
            plan: AutomatedPlan::from_schedule(&config.schedule),
        }
    }

    pub fn with_request(mut self, request: SourceRequest) -> Self {
        self.request = request;
        self
    }

    pub fn request(&self) -> &SourceRequest {
        &self.request
    }
}

impl ScheduledJob for PipelineJob {
    fn run(&mut self) -> Result<RunReport> {
        let mut orchestrator = Orchestrator::from_config(&self.config);
        orchestrator.run_automated(&self.request, &self.plan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not due yet.
    Idle,
    Ran { succeeded: bool },
    /// Due, but another run held the guard; retried on the next tick.
    Deferred,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub runs: usize,
    pub failures: usize,
    pub deferred: usize,
}

#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    poll: Duration,
    next_due: Instant,
    guard: RunGuard,
    summary: SchedulerSummary,
    max_runs: Option<usize>,
}

impl Scheduler {
    /// The first run is due one interval after `start`, or at `start` when
    /// `run_immediately` is set.
    pub fn new(interval: Duration, poll: Duration, start: Instant, run_immediately: bool) -> Self {
        let next_due = if run_immediately { start } else { start + interval };
        Self {
            interval,
            poll,
            next_due,
            guard: RunGuard::new(),
            summary: SchedulerSummary::default(),
            max_runs: None,
        }
    }

    pub fn from_config(schedule: &ScheduleConfig, start: Instant) -> Self {
        Self::new(
            schedule.interval(),
            schedule.poll(),
            start,
            schedule.run_immediately,
        )
    }

    /// Stops the async loop after `runs` completed runs.
    pub fn with_max_runs(mut self, runs: usize) -> Self {
        self.max_runs = Some(runs);
        self
    }

    pub fn with_guard(mut self, guard: RunGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> RunGuard {
        self.guard.clone()
    }

    pub fn summary(&self) -> SchedulerSummary {
        self.summary
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_complete(&self) -> bool {
        self.max_runs
            .is_some_and(|limit| self.summary.runs >= limit)
    }

    pub fn tick(&mut self, now: Instant, job: &mut dyn ScheduledJob) -> TickOutcome {
        if now < self.next_due {
            return TickOutcome::Idle;
        }
        self.run_now(now, job)
    }

    /// Runs the job immediately unless a run is already in progress. Failures
    /// are logged and counted; they never stop the schedule.
    pub fn run_now(&mut self, now: Instant, job: &mut dyn ScheduledJob) -> TickOutcome {
        let Some(_permit) = self.guard.try_acquire() else {
            self.summary.deferred += 1;
            warn!("previous run still in progress; deferring");
            return TickOutcome::Deferred;
        };

        let succeeded = match job.run() {
            Ok(report) => {
                info!(
                    run_id = %report.run_id,
                    source = %report.source.display(),
                    rows_loaded = report.rows_loaded,
                    rows_written = report.rows_written,
                    output = ?report.output_path,
                    "scheduled run complete"
                );
                true
            }
            Err(err) => {
                self.summary.failures += 1;
                error!(error = %err, "scheduled run failed; waiting for next interval");
                false
            }
        };
        self.summary.runs += 1;
        self.next_due = now + self.interval;
        debug!(runs = self.summary.runs, "next run scheduled");
        TickOutcome::Ran { succeeded }
    }

    /// Polls until `shutdown` resolves or the run limit is reached.
    pub async fn run_until<F>(&mut self, job: &mut dyn ScheduledJob, shutdown: F) -> SchedulerSummary
    where
        F: Future<Output = ()>,
    {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            poll_millis = self.poll.as_millis() as u64,
            "scheduler started"
        );
        let mut ticker = interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Instant::now(), job);
                    if self.is_complete() {
                        info!(runs = self.summary.runs, "run limit reached; stopping scheduler");
                        break;
                    }
                }
            }
        }

        info!(
            runs = self.summary.runs,
            failures = self.summary.failures,
            deferred = self.summary.deferred,
            "scheduler stopped"
        );
        self.summary
    }

    /// Runs until Ctrl+C.
    pub async fn run_until_ctrl_c(&mut self, job: &mut dyn ScheduledJob) -> SchedulerSummary {
        self.run_until(job, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
