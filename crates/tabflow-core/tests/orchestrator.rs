use std::fs;
use std::path::{Path, PathBuf};

use tabflow_core::transforms::{Casing, CleanParams, FilterPredicate};
use tabflow_core::{
    seed, ApplyOutcome, AutomatedPlan, LoadOutcome, Orchestrator, PipelineError, PipelineState,
    StagingWriter, TransformOp,
};
use tabflow_parser::{load_source, SourceRequest, Value};

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        seed::write_sample_csv(&root.join("source/data.csv")).unwrap();
        Self { _dir: dir, root }
    }

    fn source(&self) -> SourceRequest {
        SourceRequest::new(self.root.join("source/data.csv"))
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            StagingWriter::new(self.root.join("staging")),
            StagingWriter::new(self.root.join("warehouse")),
            "FINAL_ANALYTICS",
        )
    }

    fn files(&self, sub: &str) -> Vec<PathBuf> {
        match fs::read_dir(self.root.join(sub)) {
            Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn full_interactive_run() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let outcome = pipeline.load(&ws.source()).unwrap();
    let LoadOutcome::Loaded {
        rows, staged_path, ..
    } = outcome
    else {
        panic!("expected a loaded outcome");
    };
    assert_eq!(rows, 6);
    assert!(staged_path.is_file());
    assert!(file_name(&staged_path).starts_with("raw_load_data_"));
    assert_eq!(pipeline.state(), PipelineState::Loaded);

    pipeline.begin_transform().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Transforming);

    let dedupe = TransformOp::Deduplicate {
        keys: vec!["id".into()],
    };
    assert_eq!(
        pipeline.apply(&dedupe).unwrap(),
        ApplyOutcome::Applied {
            rows: 5,
            columns: 5
        }
    );
    assert_eq!(pipeline.apply(&dedupe).unwrap(), ApplyOutcome::NoChange);

    let clean = TransformOp::Clean(CleanParams::new(vec!["name".into()], Casing::Upper));
    pipeline.apply(&clean).unwrap();
    assert_eq!(
        pipeline.current().unwrap().value(0, "name").unwrap(),
        Value::Text("CLAIRE GUTE".into())
    );
    assert_eq!(pipeline.history().len(), 2);

    pipeline.finish().unwrap();
    assert_eq!(pipeline.state(), PipelineState::FinalizePending);

    let output = pipeline.finalize().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Finalized);
    assert!(pipeline.current().is_none());
    assert!(file_name(&output).starts_with("FINAL_ANALYTICS_"));

    let written = load_source(&SourceRequest::new(&output)).unwrap();
    assert_eq!(written.height(), 5);
}

#[test]
fn failed_transform_leaves_draft_untouched() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();
    pipeline.load(&ws.source()).unwrap();
    pipeline.begin_transform().unwrap();
    let before = pipeline.current().unwrap().clone();

    let err = pipeline
        .apply(&TransformOp::Filter(FilterPredicate::new("missing", "x")))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ColumnNotFound(_)));
    assert_eq!(pipeline.state(), PipelineState::Transforming);
    assert_eq!(pipeline.current().unwrap(), &before);
    assert!(pipeline.history().is_empty());
}

#[test]
fn filter_to_nothing_is_flagged() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();
    pipeline.load(&ws.source()).unwrap();
    pipeline.begin_transform().unwrap();

    let outcome = pipeline
        .apply(&TransformOp::Filter(FilterPredicate::new("state", "Oregon")))
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Emptied { columns: 5 });
}

#[test]
fn unsupported_source_keeps_idle() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();

    let err = pipeline
        .load(&SourceRequest::new(ws.root.join("data.json")))
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(pipeline.current().is_none());
    assert!(ws.files("staging").is_empty());

    let err = pipeline
        .load(&SourceRequest::new(ws.root.join("absent.csv")))
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));
}

#[test]
fn empty_source_is_not_an_error() {
    let ws = Workspace::new();
    let path = ws.root.join("source/header_only.csv");
    fs::write(&path, "id,name\n").unwrap();

    let mut pipeline = ws.orchestrator();
    let outcome = pipeline.load(&SourceRequest::new(&path)).unwrap();
    assert!(matches!(outcome, LoadOutcome::Empty { .. }));
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn phases_are_enforced() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();

    assert!(matches!(pipeline.begin_transform(), Err(PipelineError::NoWorkingData)));
    assert!(matches!(pipeline.finalize(), Err(PipelineError::NoWorkingData)));
    assert!(matches!(
        pipeline.finish(),
        Err(PipelineError::InvalidTransition { .. })
    ));

    pipeline.load(&ws.source()).unwrap();
    pipeline.begin_transform().unwrap();
    let err = pipeline.load(&ws.source()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidTransition {
            state: PipelineState::Transforming,
            ..
        }
    ));
    assert!(matches!(
        pipeline.finalize(),
        Err(PipelineError::InvalidTransition { .. })
    ));
}

#[test]
fn discard_aborts_without_output() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();
    pipeline.load(&ws.source()).unwrap();
    pipeline.begin_transform().unwrap();

    pipeline.discard().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert!(pipeline.current().is_none());
    assert!(ws.files("warehouse").is_empty());

    // a new run can start straight away
    pipeline.load(&ws.source()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Loaded);
}

#[test]
fn loaded_data_can_be_finalized_directly_and_rerun() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();

    for _ in 0..2 {
        pipeline.load(&ws.source()).unwrap();
        pipeline.finalize().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Finalized);
    }
    assert_eq!(ws.files("warehouse").len(), 2);
    assert_eq!(ws.files("staging").len(), 2);
}

#[test]
fn write_failure_keeps_data_for_retry() {
    let ws = Workspace::new();
    let blocker = ws.root.join("not_a_dir");
    fs::write(&blocker, "file").unwrap();

    let mut pipeline = Orchestrator::new(
        StagingWriter::new(ws.root.join("staging")),
        StagingWriter::new(blocker.join("warehouse")),
        "FINAL_ANALYTICS",
    );
    pipeline.load(&ws.source()).unwrap();

    let err = pipeline.finalize().unwrap_err();
    assert!(matches!(err, PipelineError::WriteFailure { .. }));
    assert_eq!(pipeline.state(), PipelineState::FinalizePending);
    assert_eq!(pipeline.current().unwrap().height(), 6);
}

#[test]
fn automated_run_reports_what_it_did() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();
    let plan = AutomatedPlan {
        clean_columns: vec!["name".into(), "city".into()],
        casing: Casing::Lower,
        drop_null_columns: vec!["name".into()],
    };

    let report = pipeline.run_automated(&ws.source(), &plan).unwrap();
    assert_eq!(report.rows_loaded, 6);
    assert_eq!(report.rows_written, 6);
    assert_eq!(report.run_id, pipeline.run_id());
    let output = report.output_path.unwrap();
    let written = load_source(&SourceRequest::new(&output)).unwrap();
    assert_eq!(
        written.value(1, "city").unwrap(),
        Value::Text("los angeles".into())
    );

    let err = pipeline
        .run_automated(&SourceRequest::new(ws.root.join("gone.csv")), &plan)
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));
    assert_eq!(pipeline.state(), PipelineState::Aborted);
}

#[test]
fn staged_snapshot_round_trips() {
    let ws = Workspace::new();
    let mut pipeline = ws.orchestrator();
    let LoadOutcome::Loaded { staged_path, .. } = pipeline.load(&ws.source()).unwrap() else {
        panic!("expected a loaded outcome");
    };

    let original = load_source(&ws.source()).unwrap();
    let staged = load_source(&SourceRequest::new(&staged_path)).unwrap();
    assert_eq!(staged, original);
}
