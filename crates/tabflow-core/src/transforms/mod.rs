//! Table-to-table operators. Each takes the current table by reference and
//! returns a new one; the input is never modified.

pub mod aggregate;
pub mod clean;
pub mod filter;
pub mod rows;

use std::fmt;

use tabflow_parser::{Table, Value};

use crate::error::Result;

pub use aggregate::{AggregationSpec, AggregationTarget, Reduction};
pub use clean::{clean_columns, clean_text, Casing, CleanParams};
pub use filter::{apply_filter, FilterPredicate};
pub use rows::{deduplicate, drop_nulls};

#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    Clean(CleanParams),
    Filter(FilterPredicate),
    Aggregate(AggregationSpec),
    Deduplicate { keys: Vec<String> },
    DropNulls { columns: Vec<String> },
}

impl TransformOp {
    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::Clean(_) => "clean",
            TransformOp::Filter(_) => "filter",
            TransformOp::Aggregate(_) => "aggregate",
            TransformOp::Deduplicate { .. } => "deduplicate",
            TransformOp::DropNulls { .. } => "drop_nulls",
        }
    }

    pub fn apply(&self, table: &Table) -> Result<Table> {
        match self {
            TransformOp::Clean(params) => clean_columns(table, params),
            TransformOp::Filter(predicate) => apply_filter(table, predicate),
            TransformOp::Aggregate(spec) => spec.apply(table),
            TransformOp::Deduplicate { keys } => deduplicate(table, keys),
            TransformOp::DropNulls { columns } => drop_nulls(table, columns),
        }
    }
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformOp::Clean(params) => write!(
                f,
                "clean [{}] ({})",
                params.columns.join(", "),
                params.casing
            ),
            TransformOp::Filter(predicate) => {
                write!(f, "filter {} = '{}'", predicate.column, predicate.value)
            }
            TransformOp::Aggregate(spec) => write!(
                f,
                "aggregate by [{}] into {} columns",
                spec.group_by().join(", "),
                spec.output_names().len()
            ),
            TransformOp::Deduplicate { keys } => write!(f, "deduplicate on [{}]", keys.join(", ")),
            TransformOp::DropNulls { columns } => {
                write!(f, "drop nulls in [{}]", columns.join(", "))
            }
        }
    }
}

/// Hashable form of a cell, used for grouping and duplicate detection.
/// Null is a key of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyPart {
    Null,
    Text(String),
    Number(u64),
    Timestamp(i64),
}

impl KeyPart {
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Text(text) => KeyPart::Text(text.clone()),
            // -0.0 and 0.0 compare equal, so they must hash alike
            Value::Number(number) if *number == 0.0 => KeyPart::Number(0.0f64.to_bits()),
            Value::Number(number) => KeyPart::Number(number.to_bits()),
            Value::Timestamp(micros) => KeyPart::Timestamp(*micros),
        }
    }
}
