use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use tabflow_parser::{ColumnData, ColumnSpec, ColumnType, Table, Value};

use super::KeyPart;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    DistinctCount,
    Mode,
}

impl Reduction {
    pub const ALL: [Reduction; 8] = [
        Reduction::Sum,
        Reduction::Mean,
        Reduction::Median,
        Reduction::Min,
        Reduction::Max,
        Reduction::Count,
        Reduction::DistinctCount,
        Reduction::Mode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Mean => "mean",
            Reduction::Median => "median",
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::Count => "count",
            Reduction::DistinctCount => "distinct_count",
            Reduction::Mode => "mode",
        }
    }

    /// Number columns accept every reduction, timestamps the order-based ones,
    /// and text or category columns only count, distinct_count and mode.
    pub fn allowed_for(&self, kind: ColumnType) -> bool {
        match kind {
            ColumnType::Number => true,
            ColumnType::Timestamp => matches!(
                self,
                Reduction::Min
                    | Reduction::Max
                    | Reduction::Count
                    | Reduction::DistinctCount
                    | Reduction::Mode
            ),
            ColumnType::Text | ColumnType::Category => matches!(
                self,
                Reduction::Count | Reduction::DistinctCount | Reduction::Mode
            ),
        }
    }

    pub fn allowed_names(kind: ColumnType) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|reduction| reduction.allowed_for(kind))
            .map(Reduction::name)
            .collect()
    }

    fn output_kind(&self, input: ColumnType) -> ColumnType {
        match self {
            Reduction::Min | Reduction::Max | Reduction::Mode => input,
            _ => ColumnType::Number,
        }
    }

    /// Reduces the non-null values of one group.
    fn reduce(&self, values: &[Value]) -> Value {
        match self {
            Reduction::Count => Value::Number(values.len() as f64),
            Reduction::DistinctCount => {
                let distinct: HashSet<KeyPart> = values.iter().map(KeyPart::from_value).collect();
                Value::Number(distinct.len() as f64)
            }
            Reduction::Sum => Value::Number(values.iter().filter_map(Value::as_number).sum()),
            Reduction::Mean => {
                if values.is_empty() {
                    return Value::Null;
                }
                let total: f64 = values.iter().filter_map(Value::as_number).sum();
                Value::Number(total / values.len() as f64)
            }
            Reduction::Median => {
                let mut numbers: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
                if numbers.is_empty() {
                    return Value::Null;
                }
                numbers.sort_by(f64::total_cmp);
                let mid = numbers.len() / 2;
                if numbers.len() % 2 == 0 {
                    Value::Number((numbers[mid - 1] + numbers[mid]) / 2.0)
                } else {
                    Value::Number(numbers[mid])
                }
            }
            Reduction::Min => extreme(values, false),
            Reduction::Max => extreme(values, true),
            Reduction::Mode => {
                let mut counts: HashMap<KeyPart, usize> = HashMap::new();
                for value in values {
                    *counts.entry(KeyPart::from_value(value)).or_default() += 1;
                }
                let top = counts.values().copied().max().unwrap_or(0);
                values
                    .iter()
                    .find(|value| counts.get(&KeyPart::from_value(value)) == Some(&top))
                    .cloned()
                    .unwrap_or(Value::Null)
            }
        }
    }
}

fn extreme(values: &[Value], pick_max: bool) -> Value {
    values
        .iter()
        .cloned()
        .reduce(|best, candidate| {
            let replace = match (&best, &candidate) {
                (Value::Number(a), Value::Number(b)) => {
                    if pick_max {
                        b > a
                    } else {
                        b < a
                    }
                }
                (Value::Timestamp(a), Value::Timestamp(b)) => {
                    if pick_max {
                        b > a
                    } else {
                        b < a
                    }
                }
                _ => false,
            };
            if replace {
                candidate
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Reduction {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        let reduction = match normalized.as_str() {
            "sum" => Reduction::Sum,
            "mean" | "avg" | "average" => Reduction::Mean,
            "median" => Reduction::Median,
            "min" => Reduction::Min,
            "max" => Reduction::Max,
            "count" => Reduction::Count,
            "distinct_count" | "nunique" => Reduction::DistinctCount,
            "mode" => Reduction::Mode,
            _ => {
                return Err(PipelineError::InvalidAggregationSpec(format!(
                    "unknown function '{}'",
                    raw.trim()
                )))
            }
        };
        Ok(reduction)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationTarget {
    pub column: String,
    pub reductions: Vec<Reduction>,
}

impl AggregationTarget {
    pub fn new(column: impl Into<String>, reductions: Vec<Reduction>) -> Self {
        Self {
            column: column.into(),
            reductions,
        }
    }
}

/// Grouping columns plus, per target column, the reductions to compute.
/// Built against a table and re-checked whenever it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSpec {
    group_by: Vec<String>,
    targets: Vec<AggregationTarget>,
}

impl AggregationSpec {
    pub fn build(
        table: &Table,
        group_by: Vec<String>,
        targets: Vec<AggregationTarget>,
    ) -> Result<Self> {
        let spec = Self { group_by, targets };
        spec.validate(table)?;
        Ok(spec)
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    pub fn targets(&self) -> &[AggregationTarget] {
        &self.targets
    }

    /// Result column names in output order: grouping columns, then
    /// `<function>_<column>` per target and function.
    pub fn output_names(&self) -> Vec<String> {
        let mut names = self.group_by.clone();
        for target in &self.targets {
            for reduction in &target.reductions {
                names.push(format!("{}_{}", reduction.name(), target.column));
            }
        }
        names
    }

    pub fn validate(&self, table: &Table) -> Result<()> {
        let invalid = |message: String| Err(PipelineError::InvalidAggregationSpec(message));

        if self.targets.is_empty() {
            return invalid("no aggregation targets given".to_string());
        }
        let mut seen_groups: HashSet<&str> = HashSet::new();
        for name in &self.group_by {
            if table.column_spec(name).is_none() {
                return invalid(format!("grouping column '{name}' not found"));
            }
            if !seen_groups.insert(name) {
                return invalid(format!("grouping column '{name}' listed twice"));
            }
        }
        for target in &self.targets {
            let Some(spec) = table.column_spec(&target.column) else {
                return invalid(format!("target column '{}' not found", target.column));
            };
            if target.reductions.is_empty() {
                return invalid(format!("no functions given for '{}'", target.column));
            }
            for reduction in &target.reductions {
                if !reduction.allowed_for(spec.kind) {
                    return invalid(format!(
                        "'{reduction}' is not valid for {} column '{}' (allowed: {})",
                        spec.kind,
                        target.column,
                        Reduction::allowed_names(spec.kind).join(", ")
                    ));
                }
            }
        }

        let mut outputs: HashSet<String> = HashSet::new();
        for name in self.output_names() {
            if !outputs.insert(name.clone()) {
                return invalid(format!("output column '{name}' would be produced twice"));
            }
        }
        Ok(())
    }

    /// Groups rows in first-appearance order (null keys form their own group)
    /// and computes every requested reduction per group.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        self.validate(table)?;

        let keys: Vec<ColumnData> = self
            .group_by
            .iter()
            .map(|name| table.column_data(name))
            .collect::<std::result::Result<_, _>>()?;

        let mut index: HashMap<Vec<KeyPart>, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for row in 0..table.height() {
            let key: Vec<KeyPart> = keys
                .iter()
                .map(|data| KeyPart::from_value(&data.value(row)))
                .collect();
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(row);
        }

        let mut columns: Vec<(ColumnSpec, ColumnData)> = Vec::new();
        for (name, data) in self.group_by.iter().zip(&keys) {
            let kind = table.require_column(name)?.kind;
            let values = groups.iter().map(|rows| data.value(rows[0])).collect();
            columns.push((
                ColumnSpec::new(name.as_str(), kind),
                ColumnData::from_values(name, kind, values)?,
            ));
        }

        for target in &self.targets {
            let input_kind = table.require_column(&target.column)?.kind;
            let data = table.column_data(&target.column)?;
            let present: Vec<Vec<Value>> = groups
                .iter()
                .map(|rows| {
                    rows.iter()
                        .map(|&row| data.value(row))
                        .filter(|value| !value.is_null())
                        .collect()
                })
                .collect();

            for reduction in &target.reductions {
                let name = format!("{}_{}", reduction.name(), target.column);
                let kind = reduction.output_kind(input_kind);
                let values = present.iter().map(|group| reduction.reduce(group)).collect();
                let data = ColumnData::from_values(&name, kind, values)?;
                columns.push((ColumnSpec::new(name, kind), data));
            }
        }

        Ok(Table::from_columns(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::Number).collect()
    }

    #[test]
    fn numeric_reductions() {
        let values = numbers(&[4.0, 1.0, 3.0, 1.0]);
        assert_eq!(Reduction::Sum.reduce(&values), Value::Number(9.0));
        assert_eq!(Reduction::Mean.reduce(&values), Value::Number(2.25));
        assert_eq!(Reduction::Median.reduce(&values), Value::Number(2.0));
        assert_eq!(Reduction::Min.reduce(&values), Value::Number(1.0));
        assert_eq!(Reduction::Max.reduce(&values), Value::Number(4.0));
        assert_eq!(Reduction::DistinctCount.reduce(&values), Value::Number(3.0));
        assert_eq!(Reduction::Mode.reduce(&values), Value::Number(1.0));
    }

    #[test]
    fn empty_groups_reduce_to_zero_or_null() {
        assert_eq!(Reduction::Sum.reduce(&[]), Value::Number(0.0));
        assert_eq!(Reduction::Count.reduce(&[]), Value::Number(0.0));
        assert_eq!(Reduction::Mean.reduce(&[]), Value::Null);
        assert_eq!(Reduction::Median.reduce(&[]), Value::Null);
        assert_eq!(Reduction::Max.reduce(&[]), Value::Null);
        assert_eq!(Reduction::Mode.reduce(&[]), Value::Null);
    }

    #[test]
    fn mode_ties_go_to_first_seen() {
        let values = vec![
            Value::Text("b".into()),
            Value::Text("a".into()),
            Value::Text("a".into()),
            Value::Text("b".into()),
        ];
        assert_eq!(Reduction::Mode.reduce(&values), Value::Text("b".into()));
    }

    #[test]
    fn timestamps_take_min_and_max() {
        let values = vec![Value::Timestamp(30), Value::Timestamp(10), Value::Timestamp(20)];
        assert_eq!(Reduction::Min.reduce(&values), Value::Timestamp(10));
        assert_eq!(Reduction::Max.reduce(&values), Value::Timestamp(30));
    }

    #[test]
    fn type_rules() {
        assert!(Reduction::Mean.allowed_for(ColumnType::Number));
        assert!(!Reduction::Mean.allowed_for(ColumnType::Timestamp));
        assert!(Reduction::Max.allowed_for(ColumnType::Timestamp));
        assert!(!Reduction::Max.allowed_for(ColumnType::Category));
        assert_eq!(
            Reduction::allowed_names(ColumnType::Text),
            vec!["count", "distinct_count", "mode"]
        );
        assert_eq!("Distinct-Count".parse::<Reduction>().unwrap(), Reduction::DistinctCount);
        assert!("variance".parse::<Reduction>().is_err());
    }
}
