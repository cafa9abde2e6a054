//! Drops all-null and constant columns from a table.

use crate::domain::model::ColumnTable;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub initial: Vec<String>,
    pub dropped: Vec<String>,
    pub kept: Vec<String>,
    /// Every column qualified for dropping, so the table was kept as is.
    pub fell_back: bool,
}

fn is_null(cell: &str) -> bool {
    cell.trim().is_empty()
}

/// Removes columns that are empty/whitespace in every row or identical to
/// the first row in every row. `exempt` is never dropped.
///
/// A single-row table makes every column constant. When nothing would be
/// left the original table is returned and no column is reported dropped.
/// A table without data rows keeps its header.
pub fn drop_null_and_constant_columns(table: &ColumnTable, exempt: &str) -> (ColumnTable, FilterReport) {
    let initial = table.columns().to_vec();
    tracing::info!("Initial columns ({}): {:?}", initial.len(), initial);

    if table.is_empty() {
        tracing::info!("No data rows found. Keeping original columns.");
        let report = FilterReport {
            kept: initial.clone(),
            initial,
            ..Default::default()
        };
        return (table.clone(), report);
    }

    let droppable = |idx: usize| {
        let mut values = table.column_values(idx);
        let first = values.next().unwrap_or("");
        let mut all_null = is_null(first);
        let mut constant = true;
        for value in values {
            all_null &= is_null(value);
            constant &= value == first;
        }
        all_null || constant
    };

    let mut dropped = Vec::new();
    let mut kept = Vec::new();
    for (idx, column) in initial.iter().enumerate() {
        if column != exempt && droppable(idx) {
            dropped.push(column.clone());
        } else {
            kept.push(column.clone());
        }
    }

    let mut fell_back = false;
    if kept.is_empty() {
        tracing::warn!("All columns are either null or constant. Keeping original columns as a fallback.");
        kept = initial.clone();
        dropped.clear();
        fell_back = true;
    }

    tracing::info!("Dropped columns ({}): {:?}", dropped.len(), dropped);
    tracing::info!("Kept columns ({}): {:?}", kept.len(), kept);

    (
        table.select(&kept),
        FilterReport {
            initial,
            dropped,
            kept,
            fell_back,
        },
    )
}
