//! One `Pipeline` per stage, bound to files in a `Storage`.

pub mod fetch_pipeline;
pub mod flatten_pipeline;
pub mod items_pipeline;
pub mod path_pipeline;
pub mod sequence_pipeline;
pub mod table_pipelines;

pub use fetch_pipeline::FetchPipeline;
pub use flatten_pipeline::FlattenPipeline;
pub use items_pipeline::ItemsPipeline;
pub use path_pipeline::PathExtractPipeline;
pub use sequence_pipeline::EtlSequence;
pub use table_pipelines::{FilterPipeline, MergePipeline};

use crate::core::table_io::{read_csv, write_csv};
use crate::core::Storage;
use crate::domain::model::ColumnTable;
use crate::utils::error::{EtlError, Result};
use serde_json::Value;

/// Reads a stage input; a file that does not exist is `MissingInputFile`.
pub(crate) async fn read_input<S: Storage>(storage: &S, path: &str) -> Result<Vec<u8>> {
    storage.read_file(path).await.map_err(|e| match e {
        EtlError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            EtlError::MissingInputFile {
                path: path.to_string(),
            }
        }
        other => other,
    })
}

pub(crate) async fn read_table<S: Storage>(storage: &S, path: &str) -> Result<ColumnTable> {
    let table = read_csv(&read_input(storage, path).await?)?;
    tracing::debug!("📄 Read {} rows x {} columns from {}", table.len(), table.columns().len(), path);
    Ok(table)
}

pub(crate) async fn write_table<S: Storage>(storage: &S, path: &str, table: &ColumnTable) -> Result<()> {
    storage.write_file(path, &write_csv(table)?).await
}

pub(crate) async fn read_json<S: Storage>(storage: &S, path: &str) -> Result<Value> {
    Ok(serde_json::from_slice(&read_input(storage, path).await?)?)
}

pub(crate) async fn write_json<S: Storage>(storage: &S, path: &str, value: &Value) -> Result<()> {
    storage
        .write_file(path, serde_json::to_string_pretty(value)?.as_bytes())
        .await
}
