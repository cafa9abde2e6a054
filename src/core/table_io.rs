//! CSV (de)serialization of [`ColumnTable`].

use crate::domain::model::ColumnTable;
use crate::utils::error::Result;

/// Parses UTF-8 CSV with a header row.
///
/// Short records are padded with empty cells and long ones truncated so the
/// table invariant holds even for slightly malformed exports.
pub fn read_csv(data: &[u8]) -> Result<ColumnTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let width = columns.len();
    let mut table = ColumnTable::new(columns);

    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().take(width).map(|c| c.to_string()).collect();
        row.resize(width, String::new());
        table.push_row(row)?;
    }

    Ok(table)
}

pub fn write_csv(table: &ColumnTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    if !table.columns().is_empty() {
        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row)?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| crate::utils::error::EtlError::IoError(e.into_error()))
}
