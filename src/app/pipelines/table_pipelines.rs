use super::{read_table, write_table};
use crate::config::toml_config::EtlConfig;
use crate::core::column_filter::{drop_null_and_constant_columns, FilterReport};
use crate::core::merge::{merge_tables, MergeOptions, MergeReport};
use crate::core::{Pipeline, Storage};
use crate::domain::model::ColumnTable;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Drops all-null and constant columns from the claims table.
pub struct FilterPipeline<S: Storage> {
    storage: S,
    input: String,
    output: String,
    exempt_column: String,
}

impl<S: Storage> FilterPipeline<S> {
    pub fn from_config(storage: S, config: &EtlConfig) -> Self {
        Self {
            storage,
            input: config.files.claims_csv.clone(),
            output: config.files.claims_filtered_csv.clone(),
            exempt_column: config.filter.exempt_column.clone(),
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for FilterPipeline<S> {
    type Extracted = ColumnTable;
    type Transformed = (ColumnTable, FilterReport);

    fn name(&self) -> &str {
        "filter_columns"
    }

    async fn extract(&self) -> Result<ColumnTable> {
        read_table(&self.storage, &self.input).await
    }

    async fn transform(&self, table: ColumnTable) -> Result<(ColumnTable, FilterReport)> {
        Ok(drop_null_and_constant_columns(&table, &self.exempt_column))
    }

    async fn load(&self, (table, _report): (ColumnTable, FilterReport)) -> Result<(String, usize)> {
        write_table(&self.storage, &self.output, &table).await?;
        Ok((self.output.clone(), table.len()))
    }
}

/// Replaces the filtered claims' `item` column with the extracted item lines.
pub struct MergePipeline<S: Storage> {
    storage: S,
    left: String,
    right: String,
    output: String,
    options: MergeOptions,
}

impl<S: Storage> MergePipeline<S> {
    pub fn from_config(storage: S, config: &EtlConfig) -> Self {
        Self {
            storage,
            left: config.files.claims_filtered_csv.clone(),
            right: config.files.items_csv.clone(),
            output: config.files.final_csv.clone(),
            options: config.merge.clone(),
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for MergePipeline<S> {
    type Extracted = (ColumnTable, ColumnTable);
    type Transformed = (ColumnTable, MergeReport);

    fn name(&self) -> &str {
        "merge"
    }

    async fn extract(&self) -> Result<(ColumnTable, ColumnTable)> {
        let left = read_table(&self.storage, &self.left).await?;
        let right = read_table(&self.storage, &self.right).await?;
        Ok((left, right))
    }

    async fn transform(&self, (left, right): (ColumnTable, ColumnTable)) -> Result<(ColumnTable, MergeReport)> {
        merge_tables(&left, &right, &self.options)
    }

    async fn load(&self, (table, _report): (ColumnTable, MergeReport)) -> Result<(String, usize)> {
        write_table(&self.storage, &self.output, &table).await?;
        Ok((self.output.clone(), table.len()))
    }
}
