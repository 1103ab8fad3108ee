use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use rusqlite::{params, Connection};
use tabflow_parser::{write_delimited, ColumnData, ColumnSpec, ColumnType, Table};
use tracing::info;

use crate::error::{PipelineError, Result};

pub const SAMPLE_TABLE: &str = "raw_customers_staging";

pub const SAMPLE_COLUMNS: [&str; 5] = ["id", "name", "segment", "state", "city"];

/// Six customer rows; `SG-19345` appears twice so deduplication has work to do.
pub const SAMPLE_ROWS: [[&str; 5]; 6] = [
    ["CG-12520", "Claire Gute", "Consumer", "Kentucky", "Henderson"],
    ["DV-13045", "Darrin Van Huff", "Corporate", "California", "Los Angeles"],
    ["SO-20335", "Sean O'Donnell", "Consumer", "Florida", "Fort Lauderdale"],
    ["BH-11710", "Brosina Hoffman", "Consumer", "California", "Los Angeles"],
    ["SG-19345", "Samantha Green", "Corporate", "California", "Los Angeles"],
    ["SG-19345", "Samantha Green", "Corporate", "California", "Los Angeles"],
];

/// Writes the sample database and CSV, returning the rows written to each.
pub fn run(database: &Path, csv: &Path) -> Result<(usize, usize)> {
    let db_rows = write_sample_database(database)?;
    let csv_rows = write_sample_csv(csv)?;
    Ok((db_rows, csv_rows))
}

/// (Re)creates the staging table in a SQLite file and fills it with the
/// sample rows.
pub fn write_sample_database(path: &Path) -> Result<usize> {
    ensure_parent(path)?;
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        r#"
        DROP TABLE IF EXISTS {SAMPLE_TABLE};
        CREATE TABLE {SAMPLE_TABLE} (
            id TEXT NOT NULL,
            name TEXT,
            segment TEXT,
            state TEXT,
            city TEXT
        );
        "#
    ))?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {SAMPLE_TABLE} (id, name, segment, state, city) VALUES (?1, ?2, ?3, ?4, ?5)"
        ))?;
        for row in SAMPLE_ROWS {
            insert.execute(params![row[0], row[1], row[2], row[3], row[4]])?;
        }
    }
    tx.commit()?;

    info!(path = %path.display(), table = SAMPLE_TABLE, rows = SAMPLE_ROWS.len(), "Seeded sample database");
    Ok(SAMPLE_ROWS.len())
}

pub fn write_sample_csv(path: &Path) -> Result<usize> {
    ensure_parent(path)?;
    let table = sample_table()?;
    let file = File::create(path)?;
    write_delimited(&table, BufWriter::new(file)).map_err(|err| PipelineError::WriteFailure {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    info!(path = %path.display(), rows = table.height(), "Seeded sample csv");
    Ok(table.height())
}

pub fn sample_table() -> Result<Table> {
    let columns = SAMPLE_COLUMNS
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values = SAMPLE_ROWS
                .iter()
                .map(|row| Some(row[idx].to_string()))
                .collect();
            (ColumnSpec::new(*name, ColumnType::Text), ColumnData::Text(values))
        })
        .collect();
    Ok(Table::from_columns(columns)?)
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}
