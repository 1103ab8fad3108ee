use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

use crate::errors::TableError;

/// Semantic type tag assigned to a column when it is loaded. Operators consult
/// the tag instead of re-inferring types from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Number,
    Timestamp,
    Category,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Category => "category",
        }
    }

    /// Text and Category columns share string storage.
    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Category)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Number)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A single cell. Timestamps are microseconds since the Unix epoch (naive UTC).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Timestamp(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(text) => f.write_str(text),
            Value::Number(value) => f.write_str(&format_number(*value)),
            Value::Timestamp(micros) => f.write_str(&format_timestamp(*micros)),
        }
    }
}

/// Renders integral values without a fractional part so identifiers and counts
/// survive a text round trip unchanged.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn format_timestamp(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
        .unwrap_or_else(|| micros.to_string())
}

pub fn parse_timestamp(value: &str) -> Option<i64> {
    static FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    let trimmed = value.trim();
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.and_utc().timestamp_micros());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_micros())
}

/// Column values in their physical representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Number(Vec<Option<f64>>),
    Timestamp(Vec<Option<i64>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(values) => values.len(),
            ColumnData::Number(values) => values.len(),
            ColumnData::Timestamp(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Text(values) => values[row].is_none(),
            ColumnData::Number(values) => values[row].is_none(),
            ColumnData::Timestamp(values) => values[row].is_none(),
        }
    }

    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnData::Text(values) => values[row]
                .as_ref()
                .map_or(Value::Null, |text| Value::Text(text.clone())),
            ColumnData::Number(values) => values[row].map_or(Value::Null, Value::Number),
            ColumnData::Timestamp(values) => values[row].map_or(Value::Null, Value::Timestamp),
        }
    }

    /// Builds storage for `kind` from cells; a cell of the wrong variant is an error.
    pub fn from_values(
        column: &str,
        kind: ColumnType,
        values: Vec<Value>,
    ) -> Result<Self, TableError> {
        let mismatch = || TableError::TypeMismatch {
            column: column.to_string(),
            kind: kind.as_str(),
        };
        let data = match kind {
            ColumnType::Text | ColumnType::Category => ColumnData::Text(
                values
                    .into_iter()
                    .map(|value| match value {
                        Value::Null => Ok(None),
                        Value::Text(text) => Ok(Some(text)),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            ColumnType::Number => ColumnData::Number(
                values
                    .into_iter()
                    .map(|value| match value {
                        Value::Null => Ok(None),
                        Value::Number(number) => Ok(Some(number)),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            ColumnType::Timestamp => ColumnData::Timestamp(
                values
                    .into_iter()
                    .map(|value| match value {
                        Value::Null => Ok(None),
                        Value::Timestamp(micros) => Ok(Some(micros)),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(data)
    }

    fn fits(&self, kind: ColumnType) -> bool {
        matches!(
            (kind, self),
            (ColumnType::Text | ColumnType::Category, ColumnData::Text(_))
                | (ColumnType::Number, ColumnData::Number(_))
                | (ColumnType::Timestamp, ColumnData::Timestamp(_))
        )
    }

    fn into_series(self, name: &str) -> Result<Series, PolarsError> {
        match self {
            ColumnData::Text(values) => {
                let utf8: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
                Ok(Series::new(name.into(), utf8))
            }
            ColumnData::Number(values) => Ok(Series::new(name.into(), values)),
            ColumnData::Timestamp(values) => Series::new(name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None)),
        }
    }
}

/// In-memory dataset: a polars frame plus the semantic type of every column.
/// Column order and names are fixed once built; operators produce new tables.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<ColumnSpec>,
    df: DataFrame,
}

impl Table {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            df: DataFrame::default(),
        }
    }

    pub fn from_columns(columns: Vec<(ColumnSpec, ColumnData)>) -> Result<Self, TableError> {
        let height = columns.first().map_or(0, |(_, data)| data.len());
        let mut specs: Vec<ColumnSpec> = Vec::with_capacity(columns.len());
        let mut series: Vec<Column> = Vec::with_capacity(columns.len());

        for (spec, data) in columns {
            if specs.iter().any(|existing| existing.name == spec.name) {
                return Err(TableError::DuplicateColumn(spec.name));
            }
            if data.len() != height {
                return Err(TableError::LengthMismatch {
                    column: spec.name,
                    expected: height,
                    found: data.len(),
                });
            }
            if !data.fits(spec.kind) {
                return Err(TableError::TypeMismatch {
                    column: spec.name,
                    kind: spec.kind.as_str(),
                });
            }
            series.push(data.into_series(&spec.name)?.into());
            specs.push(spec);
        }

        let df = DataFrame::new(series)?;
        Ok(Self { columns: specs, df })
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|spec| spec.name.as_str()).collect()
    }

    pub fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|spec| spec.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|spec| spec.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&ColumnSpec, TableError> {
        self.column_spec(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn column_data(&self, name: &str) -> Result<ColumnData, TableError> {
        let spec = self.require_column(name)?;
        let column = self.df.column(name)?;
        let data = match spec.kind {
            ColumnType::Text | ColumnType::Category => ColumnData::Text(
                column
                    .str()?
                    .into_iter()
                    .map(|value| value.map(str::to_string))
                    .collect(),
            ),
            ColumnType::Number => ColumnData::Number(column.f64()?.into_iter().collect()),
            ColumnType::Timestamp => {
                let physical = column.cast(&DataType::Int64)?;
                ColumnData::Timestamp(physical.i64()?.into_iter().collect())
            }
        };
        Ok(data)
    }

    pub fn value(&self, row: usize, column: &str) -> Result<Value, TableError> {
        let data = self.column_data(column)?;
        if row >= data.len() {
            return Ok(Value::Null);
        }
        Ok(data.value(row))
    }

    /// Materializes every row in column order.
    pub fn rows(&self) -> Result<Vec<Vec<Value>>, TableError> {
        let data = self
            .columns
            .iter()
            .map(|spec| self.column_data(&spec.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.height())
            .map(|row| data.iter().map(|column| column.value(row)).collect())
            .collect())
    }

    /// Keeps the rows whose mask entry is `true`, preserving order and columns.
    pub fn filter_rows(&self, keep: &[bool]) -> Result<Self, TableError> {
        if keep.len() != self.height() {
            return Err(TableError::MaskLength {
                expected: self.height(),
                found: keep.len(),
            });
        }
        if self.columns.is_empty() {
            return Ok(self.clone());
        }
        let mask = Series::new("mask".into(), keep.to_vec());
        let df = self.df.filter(mask.bool()?)?;
        Ok(Self {
            columns: self.columns.clone(),
            df,
        })
    }

    pub fn replace_column(
        &self,
        name: &str,
        kind: ColumnType,
        data: ColumnData,
    ) -> Result<Self, TableError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;
        if data.len() != self.height() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.height(),
                found: data.len(),
            });
        }
        if !data.fits(kind) {
            return Err(TableError::TypeMismatch {
                column: name.to_string(),
                kind: kind.as_str(),
            });
        }

        let mut columns: Vec<Column> = self.df.get_columns().iter().cloned().collect();
        columns[index] = data.into_series(name)?.into();
        let df = DataFrame::new(columns)?;

        let mut specs = self.columns.clone();
        specs[index].kind = kind;
        Ok(Self { columns: specs, df })
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.df.equals_missing(&other.df)
    }
}
