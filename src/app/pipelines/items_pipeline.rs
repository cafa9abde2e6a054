use super::{read_table, write_json, write_table};
use crate::config::toml_config::{EtlConfig, ItemsConfig};
use crate::core::items::{export_item_column, extract_item_lines, ItemReport};
use crate::core::{Pipeline, Storage};
use crate::domain::model::ColumnTable;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

pub struct ItemsOutput {
    pub lines: ColumnTable,
    pub report: ItemReport,
    pub raw: Option<(ColumnTable, Vec<Value>)>,
}

/// Claims CSV → one row per drug line.
pub struct ItemsPipeline<S: Storage> {
    storage: S,
    input: String,
    output: String,
    raw_csv: String,
    raw_json: String,
    items: ItemsConfig,
}

impl<S: Storage> ItemsPipeline<S> {
    pub fn from_config(storage: S, config: &EtlConfig) -> Self {
        let files = &config.files;
        Self {
            storage,
            input: files.claims_csv.clone(),
            output: files.items_csv.clone(),
            raw_csv: files.item_raw_csv.clone(),
            raw_json: files.item_raw_json.clone(),
            items: config.items.clone(),
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for ItemsPipeline<S> {
    type Extracted = ColumnTable;
    type Transformed = ItemsOutput;

    fn name(&self) -> &str {
        "extract_items"
    }

    async fn extract(&self) -> Result<ColumnTable> {
        read_table(&self.storage, &self.input).await
    }

    async fn transform(&self, table: ColumnTable) -> Result<ItemsOutput> {
        let (lines, report) = extract_item_lines(&table, &self.items.source_column, &self.items.carry_columns)?;
        if report.rows_skipped > 0 {
            tracing::warn!(
                "⚠️ {} of {} rows had an unusable '{}' cell and were skipped",
                report.rows_skipped,
                report.rows_read,
                self.items.source_column
            );
        }
        tracing::info!("Extracted {} item lines from {} rows", report.lines_emitted, report.rows_read);

        let raw = if self.items.export_raw {
            Some(export_item_column(&table, &self.items.source_column)?)
        } else {
            None
        };

        Ok(ItemsOutput { lines, report, raw })
    }

    async fn load(&self, output: ItemsOutput) -> Result<(String, usize)> {
        if let Some((raw_table, parsed)) = output.raw {
            write_table(&self.storage, &self.raw_csv, &raw_table).await?;
            write_json(&self.storage, &self.raw_json, &Value::Array(parsed)).await?;
            tracing::debug!("Raw item column saved to {} and {}", self.raw_csv, self.raw_json);
        }

        write_table(&self.storage, &self.output, &output.lines).await?;
        Ok((self.output.clone(), output.report.lines_emitted))
    }
}
