use std::collections::HashSet;

use crate::errors::TableError;
use crate::model::{parse_timestamp, ColumnData, ColumnSpec, ColumnType, Table};

/// String columns with at most this many distinct values may be tagged Category.
pub const CATEGORY_MAX_DISTINCT: usize = 32;

const NULL_TOKENS: [&str; 5] = ["", "na", "n/a", "nan", "null"];

pub fn is_null_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    NULL_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

/// Assigns a semantic type to one column of raw cells and converts it to storage.
pub fn infer_column(name: &str, raw: Vec<Option<String>>) -> (ColumnSpec, ColumnData) {
    let values: Vec<Option<String>> = raw
        .into_iter()
        .map(|cell| cell.filter(|text| !is_null_token(text)))
        .collect();
    let present: Vec<&str> = values.iter().flatten().map(String::as_str).collect();

    if present.is_empty() {
        return (ColumnSpec::new(name, ColumnType::Text), ColumnData::Text(values));
    }

    if present.iter().all(|value| parse_number(value).is_some()) {
        let numbers = values
            .iter()
            .map(|value| value.as_deref().and_then(parse_number))
            .collect();
        return (
            ColumnSpec::new(name, ColumnType::Number),
            ColumnData::Number(numbers),
        );
    }

    if present.iter().all(|value| parse_timestamp(value).is_some()) {
        let stamps = values
            .iter()
            .map(|value| value.as_deref().and_then(parse_timestamp))
            .collect();
        return (
            ColumnSpec::new(name, ColumnType::Timestamp),
            ColumnData::Timestamp(stamps),
        );
    }

    let distinct: HashSet<&str> = present.iter().copied().collect();
    let kind = if distinct.len() <= CATEGORY_MAX_DISTINCT && distinct.len() * 2 <= present.len() {
        ColumnType::Category
    } else {
        ColumnType::Text
    };
    (ColumnSpec::new(name, kind), ColumnData::Text(values))
}

/// Builds a typed table from column names and column-major raw cells.
pub fn infer_table(
    names: Vec<String>,
    raw_columns: Vec<Vec<Option<String>>>,
) -> Result<Table, TableError> {
    let columns = names
        .iter()
        .zip(raw_columns)
        .map(|(name, raw)| infer_column(name, raw))
        .collect();
    Table::from_columns(columns)
}

/// Fills blank header names and suffixes repeats (`x`, `x.1`, `x.2`).
pub fn unique_column_names<'a>(headers: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (idx, header) in headers.into_iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {idx}"),
            _ => header.to_string(),
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while names.contains(&candidate) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}
