use super::{read_json, write_table};
use crate::core::path_extract::{default_output_path, extract_key_paths, matches_to_table};
use crate::core::{Pipeline, Storage};
use crate::domain::model::PathMatch;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Any JSON file → `path,value` CSV of every occurrence of one key.
pub struct PathExtractPipeline<S: Storage> {
    storage: S,
    input: String,
    key: String,
    output: String,
}

impl<S: Storage> PathExtractPipeline<S> {
    pub fn new(storage: S, input: String, key: String, output: Option<String>) -> Self {
        let output = output.unwrap_or_else(|| default_output_path(&input, &key));
        Self {
            storage,
            input,
            key,
            output,
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for PathExtractPipeline<S> {
    type Extracted = Value;
    type Transformed = Vec<PathMatch>;

    fn name(&self) -> &str {
        "extract_path"
    }

    async fn extract(&self) -> Result<Value> {
        read_json(&self.storage, &self.input).await
    }

    async fn transform(&self, document: Value) -> Result<Vec<PathMatch>> {
        let matches = extract_key_paths(&document, &self.key);
        for (i, m) in matches.iter().take(5).enumerate() {
            let preview: String = m.value.chars().take(100).collect();
            tracing::debug!("{}. {} = {}", i + 1, m.path, preview);
        }
        Ok(matches)
    }

    async fn load(&self, matches: Vec<PathMatch>) -> Result<(String, usize)> {
        if matches.is_empty() {
            tracing::warn!("⚠️ No data found for key '{}' in {}", self.key, self.input);
            return Ok((self.output.clone(), 0));
        }

        write_table(&self.storage, &self.output, &matches_to_table(&matches)?).await?;
        tracing::info!("Found {} instances of '{}'", matches.len(), self.key);
        Ok((self.output.clone(), matches.len()))
    }
}
