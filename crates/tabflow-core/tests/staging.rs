use std::fs;

use chrono::NaiveDate;
use tabflow_core::{seed, PipelineError, StagingWriter};
use tabflow_parser::{load_source, SourceRequest};

#[test]
fn same_second_snapshots_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let writer = StagingWriter::new(dir.path().join("staging"));
    let table = seed::sample_table().unwrap();
    let now = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, 30, 5)
        .unwrap();

    let first = writer.write_at(&table, "raw_load_data", now).unwrap();
    let second = writer.write_at(&table, "raw_load_data", now).unwrap();
    let third = writer.write_at(&table, "raw_load_data", now).unwrap();

    assert_eq!(
        first.file_name().unwrap(),
        "raw_load_data_20240301_093005.csv"
    );
    assert_eq!(
        second.file_name().unwrap(),
        "raw_load_data_20240301_093005_1.csv"
    );
    assert_eq!(
        third.file_name().unwrap(),
        "raw_load_data_20240301_093005_2.csv"
    );

    let names: Vec<String> = fs::read_dir(writer.root())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|name| !name.ends_with(".partial")));

    let reloaded = load_source(&SourceRequest::new(&first)).unwrap();
    assert_eq!(reloaded.height(), table.height());
    assert_eq!(reloaded.column_names(), table.column_names());
}

#[test]
fn unwritable_location_is_a_write_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("occupied");
    fs::write(&blocker, "not a directory").unwrap();

    let writer = StagingWriter::new(blocker.join("staging"));
    let err = writer
        .write(&seed::sample_table().unwrap(), "raw_load_data")
        .unwrap_err();
    assert!(matches!(err, PipelineError::WriteFailure { .. }));
}
