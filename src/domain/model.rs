use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One flattened resource: column name -> JSON value, in first-seen key order.
pub type FlatRow = serde_json::Map<String, Value>;

/// In-memory CSV: ordered header plus rows aligned to it.
///
/// Every row always holds exactly one cell per declared column; an absent
/// value is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ColumnTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "row {} has {} cells but the table declares {} columns",
                    self.rows.len(),
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`column_index`](Self::column_index) but a missing column is fatal.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| EtlError::MissingColumn {
            column: name.to_string(),
            available: self.columns.clone(),
        })
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row[idx].as_str())
    }

    /// Projects the table onto `names`, in that order. Unknown names are ignored.
    pub fn select(&self, names: &[String]) -> ColumnTable {
        let indices: Vec<(usize, &String)> = names
            .iter()
            .filter_map(|name| self.column_index(name).map(|idx| (idx, name)))
            .collect();

        ColumnTable {
            columns: indices.iter().map(|(_, name)| (*name).clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|(idx, _)| row[*idx].clone()).collect())
                .collect(),
        }
    }
}

/// Text form of a JSON value for a CSV cell.
///
/// Null is the empty cell, strings are verbatim and everything else is
/// compact JSON, so nested objects and arrays re-parse to the same structure.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// FHIR resource types the fetch stage knows how to page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ResourceKind {
    #[serde(rename = "ExplanationOfBenefit")]
    #[cfg_attr(feature = "cli", value(name = "eob"))]
    ExplanationOfBenefit,
    #[serde(rename = "Patient")]
    #[cfg_attr(feature = "cli", value(name = "patient"))]
    Patient,
}

impl ResourceKind {
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::ExplanationOfBenefit => "ExplanationOfBenefit",
            ResourceKind::Patient => "Patient",
        }
    }

    /// Search endpoint for this resource under a FHIR base URL.
    pub fn endpoint(&self, base_url: &str) -> String {
        format!("{}/{}/", base_url.trim_end_matches('/'), self.resource_type())
    }
}

/// One `(path, value)` hit of the generic path extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMatch {
    pub path: String,
    pub value: String,
}

/// 單一階段的執行結果
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage_name: String,
    pub output_path: String,
    pub records: usize,
    pub duration: Duration,
}
