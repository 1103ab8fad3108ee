use std::collections::HashSet;

use tabflow_parser::{ColumnData, Table};

use super::KeyPart;
use crate::error::{PipelineError, Result};

fn key_columns(table: &Table, names: &[String]) -> Result<Vec<ColumnData>> {
    if names.is_empty() {
        return table
            .columns()
            .iter()
            .map(|spec| -> Result<ColumnData> { Ok(table.column_data(&spec.name)?) })
            .collect();
    }
    names
        .iter()
        .map(|name| {
            if table.column_spec(name).is_none() {
                return Err(PipelineError::ColumnNotFound(name.clone()));
            }
            Ok(table.column_data(name)?)
        })
        .collect()
}

/// Keeps the first row for each distinct combination of `keys`; an empty key
/// list compares whole rows.
pub fn deduplicate(table: &Table, keys: &[String]) -> Result<Table> {
    let data = key_columns(table, keys)?;
    let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
    let keep: Vec<bool> = (0..table.height())
        .map(|row| {
            let key = data
                .iter()
                .map(|column| KeyPart::from_value(&column.value(row)))
                .collect();
            seen.insert(key)
        })
        .collect();
    Ok(table.filter_rows(&keep)?)
}

/// Removes rows holding a null in any of `columns` (all columns when empty).
pub fn drop_nulls(table: &Table, columns: &[String]) -> Result<Table> {
    let data = key_columns(table, columns)?;
    let keep: Vec<bool> = (0..table.height())
        .map(|row| data.iter().all(|column| !column.is_null(row)))
        .collect();
    Ok(table.filter_rows(&keep)?)
}
