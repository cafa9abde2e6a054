//! Parquet copy of a flattened table.
//!
//! Only available with the `parquet` feature.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::domain::model::ColumnTable;
use crate::utils::error::{EtlError, Result};

fn snapshot_error(context: &str, e: impl std::fmt::Display) -> EtlError {
    EtlError::SnapshotError {
        message: format!("{}: {}", context, e),
    }
}

/// Encodes `table` as Parquet.
///
/// Columns listed in `numeric_columns` become Float64, everything else
/// nullable Utf8. Empty cells (and unparseable numbers) are null. Returns
/// `None` for a table without columns, which Parquet cannot represent.
pub fn write_parquet(table: &ColumnTable, numeric_columns: &[String]) -> Result<Option<Vec<u8>>> {
    if table.columns().is_empty() {
        tracing::warn!("⚠️ Table has no columns, Parquet snapshot skipped");
        return Ok(None);
    }

    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for (idx, column) in table.columns().iter().enumerate() {
        let cells = table.column_values(idx).map(|c| Some(c).filter(|c| !c.is_empty()));
        if numeric_columns.contains(column) {
            fields.push(Field::new(column, DataType::Float64, true));
            let array: Float64Array = cells.map(|c| c.and_then(|c| c.trim().parse::<f64>().ok())).collect();
            arrays.push(Arc::new(array));
        } else {
            fields.push(Field::new(column, DataType::Utf8, true));
            let array: StringArray = cells.collect();
            arrays.push(Arc::new(array));
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| snapshot_error("Failed to create record batch", e))?;

    let mut buffer = Vec::new();
    {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))
            .map_err(|e| snapshot_error("Failed to create Parquet writer", e))?;
        writer
            .write(&batch)
            .map_err(|e| snapshot_error("Failed to write record batch", e))?;
        writer
            .close()
            .map_err(|e| snapshot_error("Failed to close Parquet writer", e))?;
    }

    Ok(Some(buffer))
}
