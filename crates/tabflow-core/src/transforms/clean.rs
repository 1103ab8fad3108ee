use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tabflow_parser::{ColumnData, Table};
use unicode_normalization::UnicodeNormalization;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Casing {
    Title,
    Lower,
    Upper,
}

impl Casing {
    pub const ALL: [Casing; 3] = [Casing::Title, Casing::Lower, Casing::Upper];

    pub fn as_str(&self) -> &'static str {
        match self {
            Casing::Title => "title",
            Casing::Lower => "lower",
            Casing::Upper => "upper",
        }
    }

    fn apply(&self, text: &str) -> String {
        match self {
            Casing::Lower => text.to_lowercase(),
            Casing::Upper => text.to_uppercase(),
            Casing::Title => title_case(text),
        }
    }
}

impl fmt::Display for Casing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Casing {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Casing::Title),
            "lower" => Ok(Casing::Lower),
            "upper" => Ok(Casing::Upper),
            other => Err(PipelineError::InvalidCleanSpec(format!(
                "unknown casing '{other}' (expected title, lower or upper)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanParams {
    pub columns: Vec<String>,
    pub casing: Casing,
}

impl CleanParams {
    pub fn new(columns: Vec<String>, casing: Casing) -> Self {
        Self { columns, casing }
    }

    /// Every selected column must exist and be string-backed.
    pub fn validate(&self, table: &Table) -> Result<()> {
        if self.columns.is_empty() {
            return Err(PipelineError::InvalidCleanSpec(
                "no columns selected".to_string(),
            ));
        }
        for name in &self.columns {
            let spec = table.column_spec(name).ok_or_else(|| {
                PipelineError::InvalidCleanSpec(format!("column '{name}' not found"))
            })?;
            if !spec.kind.is_textual() {
                return Err(PipelineError::InvalidCleanSpec(format!(
                    "column '{name}' is {}, not text",
                    spec.kind
                )));
            }
        }
        Ok(())
    }
}

/// NFKC-normalizes, collapses whitespace runs, trims, then applies `casing`.
pub fn clean_text(raw: &str, casing: Casing) -> String {
    let normalized: String = raw.nfkc().collect();
    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    casing.apply(&collapsed)
}

pub fn clean_columns(table: &Table, params: &CleanParams) -> Result<Table> {
    params.validate(table)?;

    let mut result = table.clone();
    let mut done: Vec<&str> = Vec::new();
    for name in &params.columns {
        if done.contains(&name.as_str()) {
            continue;
        }
        let kind = table.require_column(name)?.kind;
        let ColumnData::Text(values) = table.column_data(name)? else {
            return Err(PipelineError::InvalidCleanSpec(format!(
                "column '{name}' is not text"
            )));
        };
        let cleaned = values
            .into_iter()
            .map(|cell| cell.map(|text| clean_text(&text, params.casing)))
            .collect();
        result = result.replace_column(name, kind, ColumnData::Text(cleaned))?;
        done.push(name);
    }
    Ok(result)
}

/// Uppercases the first letter of every alphabetic run and lowercases the rest,
/// so "o'donnell" becomes "O'Donnell".
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                let mut upper = ch.to_uppercase();
                if let Some(first) = upper.next() {
                    out.push(first);
                }
                out.extend(upper.flat_map(char::to_lowercase));
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}
