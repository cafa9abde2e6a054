use super::write_json;
use crate::config::toml_config::EtlConfig;
use crate::core::fetch::{extract_resources, BundleFetcher, FetchOutcome};
use crate::core::{Pipeline, Storage};
use crate::domain::model::ResourceKind;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Pages through one resource type and stores its resources as a JSON array.
pub struct FetchPipeline<S: Storage> {
    storage: S,
    fetcher: BundleFetcher,
    output: String,
    name: String,
}

impl<S: Storage> FetchPipeline<S> {
    pub fn new(storage: S, fetcher: BundleFetcher, output: String) -> Self {
        Self {
            storage,
            fetcher,
            output,
            name: "fetch".to_string(),
        }
    }

    pub fn from_config(storage: S, config: &EtlConfig, kind: ResourceKind) -> Result<Self> {
        config.validate_for_fetch()?;
        let fetcher = BundleFetcher::new(&config.source, config.token()?.clone(), kind)?;
        let output = match kind {
            ResourceKind::ExplanationOfBenefit => config.files.eob_raw_json.clone(),
            ResourceKind::Patient => config.files.patient_raw_json.clone(),
        };
        let mut pipeline = Self::new(storage, fetcher, output);
        pipeline.name = match kind {
            ResourceKind::ExplanationOfBenefit => "fetch_eob".to_string(),
            ResourceKind::Patient => "fetch_patient".to_string(),
        };
        Ok(pipeline)
    }
}

#[async_trait]
impl<S: Storage> Pipeline for FetchPipeline<S> {
    type Extracted = FetchOutcome;
    type Transformed = Vec<Value>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self) -> Result<FetchOutcome> {
        Ok(self.fetcher.fetch_pages().await)
    }

    async fn transform(&self, outcome: FetchOutcome) -> Result<Vec<Value>> {
        if outcome.bundles.is_empty() {
            return Err(EtlError::EmptyFetch {
                endpoint: self.fetcher.endpoint().to_string(),
            });
        }
        if !outcome.stop.is_complete() {
            tracing::warn!(
                "⚠️ Fetch stopped early after {} page(s): {:?}. Result is incomplete.",
                outcome.bundles.len(),
                outcome.stop
            );
        }

        let resources = extract_resources(&outcome.bundles);
        tracing::info!("Extracted {} resources", resources.len());
        Ok(resources)
    }

    async fn load(&self, resources: Vec<Value>) -> Result<(String, usize)> {
        let count = resources.len();
        write_json(&self.storage, &self.output, &Value::Array(resources)).await?;
        Ok((self.output.clone(), count))
    }
}
