use std::cell::Cell;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tabflow_core::config::PipelineConfig;
use tabflow_core::{
    seed, InterruptRelay, PipelineError, PipelineJob, RunGuard, RunReport, ScheduledJob, Scheduler,
    SchedulerSummary, TickOutcome,
};
use tabflow_parser::SourceRequest;
use uuid::Uuid;

fn report() -> RunReport {
    RunReport {
        run_id: Uuid::new_v4(),
        source: PathBuf::from("source_data/data.csv"),
        rows_loaded: 1,
        rows_written: 1,
        staged_path: None,
        output_path: None,
    }
}

const SECOND: Duration = Duration::from_secs(1);

type JobResult = tabflow_core::Result<RunReport>;

#[test]
fn runs_only_once_due() {
    let start = Instant::now();
    let mut scheduler = Scheduler::new(10 * SECOND, SECOND, start, false);
    let mut calls = 0;
    let mut job = || -> JobResult {
        calls += 1;
        Ok(report())
    };

    assert_eq!(scheduler.tick(start, &mut job), TickOutcome::Idle);
    assert_eq!(scheduler.tick(start + 9 * SECOND, &mut job), TickOutcome::Idle);
    assert_eq!(
        scheduler.tick(start + 10 * SECOND, &mut job),
        TickOutcome::Ran { succeeded: true }
    );
    assert_eq!(scheduler.next_due(), start + 20 * SECOND);
    assert_eq!(scheduler.tick(start + 15 * SECOND, &mut job), TickOutcome::Idle);
    drop(job);
    assert_eq!(calls, 1);
}

#[test]
fn failures_are_counted_and_the_schedule_continues() {
    let start = Instant::now();
    let mut scheduler = Scheduler::new(SECOND, SECOND, start, true);
    let mut attempt = 0;
    let mut job = || -> JobResult {
        attempt += 1;
        if attempt == 1 {
            Err(PipelineError::SourceNotFound(PathBuf::from("missing.csv")))
        } else {
            Ok(report())
        }
    };

    assert_eq!(
        scheduler.tick(start, &mut job),
        TickOutcome::Ran { succeeded: false }
    );
    assert_eq!(
        scheduler.tick(start + SECOND, &mut job),
        TickOutcome::Ran { succeeded: true }
    );
    assert_eq!(
        scheduler.summary(),
        SchedulerSummary {
            runs: 2,
            failures: 1,
            deferred: 0
        }
    );
}

#[test]
fn due_tick_is_deferred_while_a_run_holds_the_guard() {
    let start = Instant::now();
    let guard = RunGuard::new();
    let mut scheduler = Scheduler::new(SECOND, SECOND, start, true).with_guard(guard.clone());
    let mut job = || -> JobResult { Ok(report()) };

    let permit = guard.try_acquire().unwrap();
    assert_eq!(scheduler.tick(start, &mut job), TickOutcome::Deferred);
    assert_eq!(scheduler.tick(start, &mut job), TickOutcome::Deferred);
    drop(permit);

    assert_eq!(
        scheduler.tick(start, &mut job),
        TickOutcome::Ran { succeeded: true }
    );
    assert_eq!(scheduler.summary().deferred, 2);
    assert!(!guard.is_running());
}

#[test]
fn overlapping_triggers_never_run_concurrently() {
    let start = Instant::now();
    let guard = RunGuard::new();
    let mut manual = Scheduler::new(SECOND, SECOND, start, true).with_guard(guard.clone());
    let mut timer = Scheduler::new(SECOND, SECOND, start, true).with_guard(guard.clone());

    let active = Cell::new(0usize);
    let peak = Cell::new(0usize);
    let mut nested_outcome = None;
    {
        let mut inner = || -> JobResult {
            active.set(active.get() + 1);
            peak.set(peak.get().max(active.get()));
            active.set(active.get() - 1);
            Ok(report())
        };
        let mut outer = || -> JobResult {
            active.set(active.get() + 1);
            peak.set(peak.get().max(active.get()));
            // the timer fires while the manual run is still in progress
            nested_outcome = Some(timer.tick(start, &mut inner));
            active.set(active.get() - 1);
            Ok(report())
        };
        assert_eq!(
            manual.run_now(start, &mut outer),
            TickOutcome::Ran { succeeded: true }
        );
    }

    assert_eq!(nested_outcome, Some(TickOutcome::Deferred));
    assert_eq!(peak.get(), 1);
    assert_eq!(timer.summary().deferred, 1);
    assert_eq!(timer.summary().runs, 0);
}

#[tokio::test]
async fn loop_stops_after_run_limit() {
    let mut scheduler = Scheduler::new(
        Duration::from_millis(10),
        Duration::from_millis(2),
        Instant::now(),
        true,
    )
    .with_max_runs(3);
    let mut job = || -> JobResult { Ok(report()) };

    let summary = scheduler
        .run_until(&mut job, tokio::time::sleep(Duration::from_secs(10)))
        .await;
    assert_eq!(summary.runs, 3);
    assert_eq!(summary.failures, 0);
}

#[tokio::test]
async fn loop_stops_on_shutdown() {
    let mut scheduler = Scheduler::new(
        Duration::from_secs(3600),
        Duration::from_millis(5),
        Instant::now(),
        false,
    );
    let mut job = || -> JobResult { Ok(report()) };

    let summary = scheduler
        .run_until(&mut job, tokio::time::sleep(Duration::from_millis(30)))
        .await;
    assert_eq!(summary, SchedulerSummary::default());
}

#[tokio::test]
async fn interrupt_stops_only_the_armed_loop() {
    let relay = InterruptRelay::new();
    assert!(!relay.deliver());

    let mut scheduler = Scheduler::new(
        Duration::from_secs(3600),
        Duration::from_millis(5),
        Instant::now(),
        false,
    );
    let mut job = || -> JobResult { Ok(report()) };
    let shutdown = relay.arm();
    assert!(relay.is_armed());

    let trigger = relay.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(trigger.deliver());
    });
    let summary = scheduler.run_until(&mut job, shutdown).await;
    assert_eq!(summary, SchedulerSummary::default());

    // back at the menu nothing is armed, so the next interrupt is the caller's
    assert!(!relay.is_armed());
    assert!(!relay.deliver());

    let pending = relay.arm();
    relay.disarm();
    pending.await;
    assert!(!relay.deliver());
}

#[test]
fn pipeline_job_runs_against_configured_paths() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let config = PipelineConfig::from_toml_str(&format!(
        r#"
        [paths]
        source_dir = "{root}/source"
        staging_dir = "{root}/staging"
        warehouse_dir = "{root}/warehouse"

        [schedule]
        default_source = "{root}/source/data.csv"
        "#,
        root = root.display()
    ))
    .unwrap();
    config.ensure_directories().unwrap();
    seed::write_sample_csv(&root.join("source/data.csv")).unwrap();

    let mut job = PipelineJob::from_config(&config);
    let report = job.run().unwrap();
    assert_eq!(report.rows_written, 6);
    assert!(report.output_path.unwrap().starts_with(root.join("warehouse")));

    let mut missing = PipelineJob::from_config(&config)
        .with_request(SourceRequest::new(root.join("source/absent.csv")));
    let start = Instant::now();
    let mut scheduler = Scheduler::new(SECOND, SECOND, start, true);
    assert_eq!(
        scheduler.tick(start, &mut missing),
        TickOutcome::Ran { succeeded: false }
    );
    assert_eq!(scheduler.summary().failures, 1);
}
