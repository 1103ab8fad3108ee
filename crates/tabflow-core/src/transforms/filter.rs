use tabflow_parser::model::parse_timestamp;
use tabflow_parser::{ColumnData, ColumnType, Table};

use crate::error::{PipelineError, Result};

/// Equality predicate on one column. Comparison follows the column's type tag.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub column: String,
    pub value: String,
}

impl FilterPredicate {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Evaluates the predicate for every row. Nulls never match.
    pub fn mask(&self, table: &Table) -> Result<Vec<bool>> {
        let spec = table
            .column_spec(&self.column)
            .ok_or_else(|| PipelineError::ColumnNotFound(self.column.clone()))?;
        let invalid = || PipelineError::InvalidFilterValue {
            column: self.column.clone(),
            kind: spec.kind.as_str(),
            value: self.value.clone(),
        };

        let mask = match (spec.kind, table.column_data(&self.column)?) {
            (ColumnType::Number, ColumnData::Number(values)) => {
                let target: f64 = self.value.trim().parse().map_err(|_| invalid())?;
                values.iter().map(|cell| *cell == Some(target)).collect()
            }
            (ColumnType::Timestamp, ColumnData::Timestamp(values)) => {
                let target = parse_timestamp(&self.value).ok_or_else(invalid)?;
                values.iter().map(|cell| *cell == Some(target)).collect()
            }
            (_, ColumnData::Text(values)) => {
                let target = self.value.trim().to_lowercase();
                values
                    .iter()
                    .map(|cell| {
                        cell.as_deref()
                            .is_some_and(|text| text.trim().to_lowercase() == target)
                    })
                    .collect()
            }
            (kind, _) => {
                return Err(PipelineError::Table(tabflow_parser::TableError::TypeMismatch {
                    column: self.column.clone(),
                    kind: kind.as_str(),
                }))
            }
        };
        Ok(mask)
    }
}

/// Keeps the matching rows; columns are carried over unchanged. A zero-row
/// result is a valid outcome.
pub fn apply_filter(table: &Table, predicate: &FilterPredicate) -> Result<Table> {
    let mask = predicate.mask(table)?;
    Ok(table.filter_rows(&mask)?)
}
