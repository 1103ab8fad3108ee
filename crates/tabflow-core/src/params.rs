use tabflow_parser::Table;
use tracing::warn;

use crate::config::ScheduleConfig;
use crate::error::{PipelineError, Result};
use crate::transforms::{AggregationSpec, Casing, CleanParams, FilterPredicate, TransformOp};

/// Supplies operator parameters for the current table. The console prompter
/// asks a person; `AutomatedPlan` answers from configuration. Returning
/// `UserCancelled` backs out of the operation without touching the data.
pub trait ParameterSource {
    fn clean_params(&mut self, table: &Table) -> Result<CleanParams>;
    fn filter_predicate(&mut self, table: &Table) -> Result<FilterPredicate>;
    fn aggregation_spec(&mut self, table: &Table) -> Result<AggregationSpec>;
    fn dedupe_keys(&mut self, table: &Table) -> Result<Vec<String>>;
}

/// Fixed steps for unattended runs: clean the configured text columns, then
/// drop rows with nulls in the configured columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomatedPlan {
    pub clean_columns: Vec<String>,
    pub casing: Casing,
    pub drop_null_columns: Vec<String>,
}

impl AutomatedPlan {
    pub fn from_schedule(schedule: &ScheduleConfig) -> Self {
        Self {
            clean_columns: schedule.clean_columns.clone(),
            casing: schedule.casing,
            drop_null_columns: schedule.drop_null_columns.clone(),
        }
    }

    /// Columns that are missing (or not text, for cleaning) are skipped with a
    /// warning so one odd source cannot fail every scheduled run.
    pub fn operations(&self, table: &Table) -> Vec<TransformOp> {
        let mut ops = Vec::new();

        let clean: Vec<String> = self
            .clean_columns
            .iter()
            .filter(|name| match table.column_spec(name) {
                Some(spec) if spec.kind.is_textual() => true,
                Some(spec) => {
                    warn!(column = %name, kind = %spec.kind, "skipping clean of non-text column");
                    false
                }
                None => {
                    warn!(column = %name, "skipping clean of missing column");
                    false
                }
            })
            .cloned()
            .collect();
        if !clean.is_empty() {
            ops.push(TransformOp::Clean(CleanParams::new(clean, self.casing)));
        }

        let drop: Vec<String> = self
            .drop_null_columns
            .iter()
            .filter(|name| {
                let present = table.column_spec(name).is_some();
                if !present {
                    warn!(column = %name, "skipping null check on missing column");
                }
                present
            })
            .cloned()
            .collect();
        if !drop.is_empty() {
            ops.push(TransformOp::DropNulls { columns: drop });
        }

        ops
    }
}

impl ParameterSource for AutomatedPlan {
    fn clean_params(&mut self, table: &Table) -> Result<CleanParams> {
        self.operations(table)
            .into_iter()
            .find_map(|op| match op {
                TransformOp::Clean(params) => Some(params),
                _ => None,
            })
            .ok_or(PipelineError::UserCancelled)
    }

    fn filter_predicate(&mut self, _table: &Table) -> Result<FilterPredicate> {
        Err(PipelineError::UserCancelled)
    }

    fn aggregation_spec(&mut self, _table: &Table) -> Result<AggregationSpec> {
        Err(PipelineError::UserCancelled)
    }

    fn dedupe_keys(&mut self, _table: &Table) -> Result<Vec<String>> {
        Err(PipelineError::UserCancelled)
    }
}

#[cfg(test)]
mod tests {
    use tabflow_parser::{ColumnData, ColumnSpec, ColumnType};

    use super::*;

    fn table() -> Table {
        Table::from_columns(vec![
            (
                ColumnSpec::new("name", ColumnType::Text),
                ColumnData::Text(vec![Some(" ada ".into()), None]),
            ),
            (
                ColumnSpec::new("score", ColumnType::Number),
                ColumnData::Number(vec![Some(1.0), Some(2.0)]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn plan_skips_unusable_columns() {
        let plan = AutomatedPlan {
            clean_columns: vec!["name".into(), "score".into(), "city".into()],
            casing: Casing::Title,
            drop_null_columns: vec!["name".into(), "city".into()],
        };
        assert_eq!(
            plan.operations(&table()),
            vec![
                TransformOp::Clean(CleanParams::new(vec!["name".into()], Casing::Title)),
                TransformOp::DropNulls {
                    columns: vec!["name".into()]
                },
            ]
        );
    }

    #[test]
    fn plan_cannot_answer_interactive_questions() {
        let mut plan = AutomatedPlan::from_schedule(&ScheduleConfig::default());
        assert!(plan.clean_params(&table()).is_ok());
        assert!(matches!(
            plan.filter_predicate(&table()),
            Err(PipelineError::UserCancelled)
        ));
    }
}
