use std::io::{BufRead, Write};

use tabflow_core::transforms::{
    AggregationSpec, AggregationTarget, Casing, CleanParams, FilterPredicate, Reduction,
};
use tabflow_core::{ParameterSource, PipelineError, Result};
use tabflow_parser::Table;

/// Line-oriented console I/O. End of input is treated as the user backing out.
pub struct ConsolePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsolePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }

    /// Prints `question` and returns the trimmed answer.
    pub fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question} ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Err(PipelineError::UserCancelled);
        }
        Ok(line.trim().to_string())
    }

    /// Like `ask`, but a blank answer cancels.
    fn ask_required(&mut self, question: &str) -> Result<String> {
        let answer = self.ask(question)?;
        if answer.is_empty() {
            return Err(PipelineError::UserCancelled);
        }
        Ok(answer)
    }

    fn list_columns(&mut self, table: &Table, only_text: bool) -> Result<()> {
        for (idx, spec) in table.columns().iter().enumerate() {
            if only_text && !spec.kind.is_textual() {
                continue;
            }
            writeln!(self.output, "  [{}] {} ({})", idx + 1, spec.name, spec.kind)?;
        }
        Ok(())
    }

    /// Asks until the answer names existing columns; blank cancels.
    fn ask_columns(&mut self, table: &Table, question: &str) -> Result<Vec<String>> {
        loop {
            let answer = self.ask_required(question)?;
            match resolve_columns(table, &answer) {
                Ok(columns) => return Ok(columns),
                Err(message) => self.say(&message)?,
            }
        }
    }

    fn ask_column(&mut self, table: &Table, question: &str) -> Result<String> {
        loop {
            let mut columns = self.ask_columns(table, question)?;
            if columns.len() == 1 {
                return Ok(columns.remove(0));
            }
            self.say("Please pick exactly one column.")?;
        }
    }
}

impl<R: BufRead, W: Write> ParameterSource for ConsolePrompter<R, W> {
    fn clean_params(&mut self, table: &Table) -> Result<CleanParams> {
        self.say("Text columns:")?;
        self.list_columns(table, true)?;
        let columns = loop {
            let columns =
                self.ask_columns(table, "Columns to clean (names or numbers, comma-separated):")?;
            let rejected: Vec<&String> = columns
                .iter()
                .filter(|name| {
                    table
                        .column_spec(name)
                        .is_some_and(|spec| !spec.kind.is_textual())
                })
                .collect();
            if rejected.is_empty() {
                break columns;
            }
            let names: Vec<&str> = rejected.iter().map(|name| name.as_str()).collect();
            self.say(&format!("Not text columns: {}", names.join(", ")))?;
        };

        let casing = loop {
            let answer = self.ask_required("Casing [1] title [2] lower [3] upper:")?;
            let parsed = match answer.as_str() {
                "1" => Ok(Casing::Title),
                "2" => Ok(Casing::Lower),
                "3" => Ok(Casing::Upper),
                other => other.parse::<Casing>(),
            };
            match parsed {
                Ok(casing) => break casing,
                Err(err) => self.say(&err.to_string())?,
            }
        };

        Ok(CleanParams::new(columns, casing))
    }

    fn filter_predicate(&mut self, table: &Table) -> Result<FilterPredicate> {
        self.say("Columns:")?;
        self.list_columns(table, false)?;
        let column = self.ask_column(table, "Filter on column:")?;
        let value = self.ask_required(&format!("Keep rows where '{column}' equals:"))?;
        Ok(FilterPredicate::new(column, value))
    }

    fn aggregation_spec(&mut self, table: &Table) -> Result<AggregationSpec> {
        self.say("Columns:")?;
        self.list_columns(table, false)?;
        let group_by = self.ask_columns(table, "Group by (names or numbers, comma-separated):")?;

        let mut targets: Vec<AggregationTarget> = Vec::new();
        loop {
            let answer = self.ask("Aggregate column (blank when done):")?;
            if answer.is_empty() {
                break;
            }
            let column = match resolve_columns(table, &answer) {
                Ok(mut columns) if columns.len() == 1 => columns.remove(0),
                Ok(_) => {
                    self.say("Please pick exactly one column.")?;
                    continue;
                }
                Err(message) => {
                    self.say(&message)?;
                    continue;
                }
            };
            let Some(kind) = table.column_spec(&column).map(|spec| spec.kind) else {
                continue;
            };
            let allowed = Reduction::allowed_names(kind).join(", ");
            let reductions = loop {
                let answer = self.ask_required(&format!("Functions for '{column}' ({allowed}):"))?;
                match parse_reductions(&answer) {
                    Ok(reductions) if reductions.iter().all(|r| r.allowed_for(kind)) => {
                        break reductions
                    }
                    Ok(_) => self.say(&format!("'{column}' is {kind}; allowed: {allowed}"))?,
                    Err(err) => self.say(&err.to_string())?,
                }
            };
            targets.push(AggregationTarget::new(column, reductions));
        }

        if targets.is_empty() {
            return Err(PipelineError::UserCancelled);
        }
        AggregationSpec::build(table, group_by, targets)
    }

    fn dedupe_keys(&mut self, table: &Table) -> Result<Vec<String>> {
        self.say("Columns:")?;
        self.list_columns(table, false)?;
        loop {
            let answer =
                self.ask_required("Key columns for duplicates ('*' compares whole rows):")?;
            if answer == "*" {
                return Ok(Vec::new());
            }
            match resolve_columns(table, &answer) {
                Ok(columns) => return Ok(columns),
                Err(message) => self.say(&message)?,
            }
        }
    }
}

/// Resolves a comma-separated list of column names or 1-based positions.
pub fn resolve_columns(table: &Table, answer: &str) -> std::result::Result<Vec<String>, String> {
    let mut columns: Vec<String> = Vec::new();
    for token in answer.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let name = match token.parse::<usize>() {
            Ok(position) => table
                .columns()
                .get(position.wrapping_sub(1))
                .map(|spec| spec.name.clone())
                .ok_or_else(|| format!("No column number {position}."))?,
            Err(_) => table
                .column_spec(token)
                .map(|spec| spec.name.clone())
                .ok_or_else(|| format!("No column named '{token}'."))?,
        };
        if !columns.contains(&name) {
            columns.push(name);
        }
    }
    if columns.is_empty() {
        return Err("No columns given.".to_string());
    }
    Ok(columns)
}

pub fn parse_reductions(answer: &str) -> Result<Vec<Reduction>> {
    let mut reductions = Vec::new();
    for token in answer.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let reduction: Reduction = token.parse()?;
        if !reductions.contains(&reduction) {
            reductions.push(reduction);
        }
    }
    if reductions.is_empty() {
        return Err(PipelineError::InvalidAggregationSpec(
            "no functions given".to_string(),
        ));
    }
    Ok(reductions)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tabflow_parser::{ColumnData, ColumnSpec, ColumnType};

    use super::*;

    fn table() -> Table {
        Table::from_columns(vec![
            (
                ColumnSpec::new("id", ColumnType::Text),
                ColumnData::Text(vec![Some("a".into()), Some("b".into())]),
            ),
            (
                ColumnSpec::new("state", ColumnType::Category),
                ColumnData::Text(vec![Some("Ohio".into()), Some("Ohio".into())]),
            ),
            (
                ColumnSpec::new("amount", ColumnType::Number),
                ColumnData::Number(vec![Some(1.0), Some(2.0)]),
            ),
        ])
        .unwrap()
    }

    fn prompter(script: &str) -> ConsolePrompter<Cursor<Vec<u8>>, Vec<u8>> {
        ConsolePrompter::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn columns_resolve_by_name_or_position() {
        let table = table();
        assert_eq!(resolve_columns(&table, "1, state").unwrap(), vec!["id", "state"]);
        assert_eq!(resolve_columns(&table, "3,3").unwrap(), vec!["amount"]);
        assert!(resolve_columns(&table, "0").is_err());
        assert!(resolve_columns(&table, "email").is_err());
        assert!(resolve_columns(&table, " , ").is_err());
    }

    #[test]
    fn clean_prompt_reprompts_on_bad_answers() {
        let mut exhausted = prompter("amount\nzip\nname, 2\n3\n");
        assert!(matches!(
            exhausted.clean_params(&table()),
            Err(PipelineError::UserCancelled)
        ));

        let mut answered = prompter("amount\n1,2\nshouty\n3\n");
        let params = answered.clean_params(&table()).unwrap();
        assert_eq!(params.columns, vec!["id", "state"]);
        assert_eq!(params.casing, Casing::Upper);
    }

    #[test]
    fn filter_prompt_collects_column_and_value() {
        let mut prompter = prompter("state\n california \n");
        let predicate = prompter.filter_predicate(&table()).unwrap();
        assert_eq!(predicate, FilterPredicate::new("state", "california"));
    }

    #[test]
    fn aggregation_prompt_builds_a_spec() {
        let mut prompter = prompter("state\namount\nsum, MEAN\nid\nsum\ncount\n\n");
        let spec = prompter.aggregation_spec(&table()).unwrap();
        assert_eq!(
            spec.output_names(),
            vec!["state", "sum_amount", "mean_amount", "count_id"]
        );
    }

    #[test]
    fn blank_or_eof_cancels() {
        assert!(matches!(
            prompter("\n").filter_predicate(&table()),
            Err(PipelineError::UserCancelled)
        ));
        assert!(matches!(
            prompter("").dedupe_keys(&table()),
            Err(PipelineError::UserCancelled)
        ));
        assert!(matches!(
            prompter("state\n\n").aggregation_spec(&table()),
            Err(PipelineError::UserCancelled)
        ));
        assert_eq!(prompter("*\n").dedupe_keys(&table()).unwrap(), Vec::<String>::new());
    }
}
