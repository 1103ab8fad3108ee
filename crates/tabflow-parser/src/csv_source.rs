use std::fs;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::warn;

use crate::errors::LoadError;
use crate::infer::{infer_table, unique_column_names};
use crate::model::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// Decodes as UTF-8, falling back to Latin-1 (every byte maps to one char).
pub fn decode_text(bytes: Vec<u8>) -> (String, TextEncoding) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, TextEncoding::Utf8),
        Err(err) => (
            err.into_bytes().iter().map(|&byte| char::from(byte)).collect(),
            TextEncoding::Latin1,
        ),
    }
}

pub fn read_delimited(path: &Path) -> Result<Table, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (text, encoding) = decode_text(bytes);
    if encoding == TextEncoding::Latin1 {
        warn!(path = %path.display(), "source is not valid UTF-8, decoded as Latin-1");
    }
    parse_delimited(path, &text)
}

/// Parses comma-separated text with a mandatory header row.
pub fn parse_delimited(path: &Path, text: &str) -> Result<Table, LoadError> {
    let csv_error = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();
    if headers.is_empty() {
        return Ok(Table::empty());
    }

    let names = unique_column_names(headers.iter());
    let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        for (idx, column) in raw_columns.iter_mut().enumerate() {
            column.push(record.get(idx).map(str::to_string));
        }
    }

    Ok(infer_table(names, raw_columns)?)
}
