//! Splices one table's columns into another in place of a replaced column.

use crate::domain::model::ColumnTable;
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Column of the left table that the right table's columns replace.
    pub replace_column: String,
    /// Removed from the merged header regardless of which side they came from.
    pub drop_columns: Vec<String>,
    /// Row identifier that must match pairwise when both sides carry it.
    pub key_column: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            replace_column: "item".to_string(),
            drop_columns: vec!["created".to_string(), "sequence".to_string()],
            key_column: Some("claim_id".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub columns: Vec<String>,
    /// Right-hand columns spliced in.
    pub inserted: Vec<String>,
    /// Right-hand columns dropped because the left table already has them.
    pub dropped_collisions: Vec<String>,
    /// Block-listed columns removed from the result.
    pub blocked: Vec<String>,
}

#[derive(Clone, Copy)]
enum Source {
    Left(usize),
    Right(usize),
}

/// Checks that row `i` of both tables carries the same key.
fn check_row_keys(left: &ColumnTable, right: &ColumnTable, key: &str) -> Result<()> {
    let (Some(l_idx), Some(r_idx)) = (left.column_index(key), right.column_index(key)) else {
        tracing::warn!(
            "⚠️ Key column '{}' missing from one side, row correspondence is not verified",
            key
        );
        return Ok(());
    };

    for (row, (l, r)) in left.column_values(l_idx).zip(right.column_values(r_idx)).enumerate() {
        if l != r {
            return Err(EtlError::RowKeyMismatch {
                row,
                column: key.to_string(),
                left: l.to_string(),
                right: r.to_string(),
            });
        }
    }
    Ok(())
}

/// Merges `right` into `left` by row position.
///
/// The header is `left[..replaced] + right (minus collisions) + left[replaced+1..]`
/// with `drop_columns` removed. Row counts must be equal.
pub fn merge_tables(
    left: &ColumnTable,
    right: &ColumnTable,
    options: &MergeOptions,
) -> Result<(ColumnTable, MergeReport)> {
    if left.len() != right.len() {
        return Err(EtlError::RowCountMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    let replace_idx = left.require_column(&options.replace_column)?;

    if let Some(key) = options.key_column.as_deref().filter(|k| !k.is_empty()) {
        check_row_keys(left, right, key)?;
    }

    let mut report = MergeReport::default();
    let mut plan: Vec<(String, Source)> = Vec::new();

    let left_cols = left.columns();
    let others: Vec<&String> = left_cols
        .iter()
        .filter(|c| **c != options.replace_column)
        .collect();

    let left_entries = left_cols.iter().enumerate().map(|(i, c)| (c.clone(), Source::Left(i)));
    plan.extend(left_entries.clone().take(replace_idx));
    for (i, column) in right.columns().iter().enumerate() {
        if others.contains(&column) {
            report.dropped_collisions.push(column.clone());
        } else {
            report.inserted.push(column.clone());
            plan.push((column.clone(), Source::Right(i)));
        }
    }
    plan.extend(left_entries.skip(replace_idx + 1));

    plan.retain(|(column, _)| {
        let blocked = options.drop_columns.contains(column);
        if blocked {
            report.blocked.push(column.clone());
        }
        !blocked
    });

    report.columns = plan.iter().map(|(c, _)| c.clone()).collect();
    let mut merged = ColumnTable::new(report.columns.clone());
    for (l_row, r_row) in left.rows().iter().zip(right.rows()) {
        let cells = plan
            .iter()
            .map(|(_, source)| match *source {
                Source::Left(i) => l_row[i].clone(),
                Source::Right(i) => r_row[i].clone(),
            })
            .collect();
        merged.push_row(cells)?;
    }

    tracing::info!("🔗 Merged header ({}): {:?}", report.columns.len(), report.columns);
    if !report.dropped_collisions.is_empty() {
        tracing::debug!("Skipped duplicate columns: {:?}", report.dropped_collisions);
    }

    Ok((merged, report))
}
