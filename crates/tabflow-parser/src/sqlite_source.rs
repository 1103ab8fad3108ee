use std::fmt;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::errors::LoadError;
use crate::infer::{infer_table, unique_column_names};
use crate::model::Table;

/// Which table of a relational source to read: by name or by 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelection {
    Name(String),
    Position(usize),
}

impl TableSelection {
    /// All-digit input selects by position, anything else by name.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(position) = trimmed.parse::<usize>() {
                return TableSelection::Position(position);
            }
        }
        TableSelection::Name(trimmed.to_string())
    }

    /// A position whose digits exactly name a table selects that table, so
    /// numeric table names stay reachable.
    pub fn resolve<'a>(&self, available: &'a [String]) -> Result<&'a str, LoadError> {
        let found = match self {
            TableSelection::Name(name) => available.iter().find(|table| *table == name),
            TableSelection::Position(position) => {
                let digits = position.to_string();
                available.iter().find(|table| **table == digits).or_else(|| {
                    position
                        .checked_sub(1)
                        .and_then(|idx| available.get(idx))
                })
            }
        };
        found
            .map(String::as_str)
            .ok_or_else(|| LoadError::UnknownTable {
                requested: self.to_string(),
                available: available.to_vec(),
            })
    }
}

impl fmt::Display for TableSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSelection::Name(name) => f.write_str(name),
            TableSelection::Position(position) => write!(f, "#{position}"),
        }
    }
}

fn sqlite_error(path: &Path) -> impl Fn(rusqlite::Error) -> LoadError + '_ {
    move |source| LoadError::Sqlite {
        path: path.to_path_buf(),
        source,
    }
}

fn open_read_only(path: &Path) -> Result<Connection, LoadError> {
    if !path.is_file() {
        return Err(LoadError::SourceNotFound(path.to_path_buf()));
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(sqlite_error(path))
}

fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    names.collect()
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_cell(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

pub fn list_sqlite_tables(path: &Path) -> Result<Vec<String>, LoadError> {
    let conn = open_read_only(path)?;
    table_names(&conn).map_err(sqlite_error(path))
}

pub fn read_sqlite_table(
    path: &Path,
    selection: Option<&TableSelection>,
) -> Result<Table, LoadError> {
    let conn = open_read_only(path)?;
    let available = table_names(&conn).map_err(sqlite_error(path))?;
    if available.is_empty() {
        return Err(LoadError::EmptyDatabase(path.to_path_buf()));
    }

    let selection = selection.ok_or_else(|| LoadError::TableSelectionRequired {
        path: path.to_path_buf(),
        available: available.clone(),
    })?;
    let table_name = selection.resolve(&available)?;

    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {}", quote_identifier(table_name)))
        .map_err(sqlite_error(path))?;
    let names = unique_column_names(stmt.column_names());
    let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];

    let mut rows = stmt.query([]).map_err(sqlite_error(path))?;
    while let Some(row) = rows.next().map_err(sqlite_error(path))? {
        for (idx, column) in raw_columns.iter_mut().enumerate() {
            let cell = row.get_ref(idx).map_err(sqlite_error(path))?;
            column.push(render_cell(cell));
        }
    }

    let table = infer_table(names, raw_columns)?;
    info!(table = table_name, rows = table.height(), "loaded SQLite table");
    Ok(table)
}
