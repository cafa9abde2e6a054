use super::{read_json, write_table};
use crate::config::toml_config::EtlConfig;
use crate::core::flatten::{flatten_resources, FlattenOutput, FlattenRules};
use crate::core::{Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Raw resource array → flat CSV (+ optional Parquet snapshot).
pub struct FlattenPipeline<S: Storage> {
    storage: S,
    name: String,
    input: String,
    csv_output: String,
    parquet_output: Option<String>,
    rules: FlattenRules,
}

impl<S: Storage> FlattenPipeline<S> {
    pub fn new(
        storage: S,
        name: &str,
        input: String,
        csv_output: String,
        parquet_output: Option<String>,
        rules: FlattenRules,
    ) -> Self {
        Self {
            storage,
            name: name.to_string(),
            input,
            csv_output,
            parquet_output,
            rules,
        }
    }

    /// Part D claims: `eob_raw_resources.json` → `eob_part_d_clean.csv`.
    pub fn claims(storage: S, config: &EtlConfig) -> Self {
        let files = &config.files;
        Self::new(
            storage,
            "flatten_claims",
            files.eob_raw_json.clone(),
            files.claims_csv.clone(),
            config.load.write_parquet.then(|| files.claims_parquet.clone()),
            config.claims.clone(),
        )
    }

    /// Patients: `patient_raw_resources.json` → `patient_clean.csv`.
    pub fn patients(storage: S, config: &EtlConfig) -> Self {
        let files = &config.files;
        Self::new(
            storage,
            "flatten_patients",
            files.patient_raw_json.clone(),
            files.patients_csv.clone(),
            config.load.write_parquet.then(|| files.patients_parquet.clone()),
            config.patients.clone(),
        )
    }

    #[cfg(feature = "parquet")]
    async fn write_snapshot(&self, path: &str, output: &FlattenOutput) -> Result<()> {
        if let Some(bytes) = crate::core::snapshot::write_parquet(&output.table, &output.numeric_columns)? {
            self.storage.write_file(path, &bytes).await?;
            tracing::info!("💾 Parquet snapshot saved to {}", path);
        }
        Ok(())
    }

    #[cfg(not(feature = "parquet"))]
    async fn write_snapshot(&self, path: &str, _output: &FlattenOutput) -> Result<()> {
        tracing::warn!("⚠️ Built without the parquet feature, {} not written", path);
        Ok(())
    }
}

#[async_trait]
impl<S: Storage> Pipeline for FlattenPipeline<S> {
    type Extracted = Vec<Value>;
    type Transformed = FlattenOutput;

    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self) -> Result<Vec<Value>> {
        match read_json(&self.storage, &self.input).await? {
            Value::Array(resources) => {
                tracing::info!("Loaded {} resources from {}", resources.len(), self.input);
                Ok(resources)
            }
            other => Err(EtlError::ProcessingError {
                message: format!(
                    "{} must hold a JSON array of resources, found {}",
                    self.input,
                    json_kind(&other)
                ),
            }),
        }
    }

    async fn transform(&self, resources: Vec<Value>) -> Result<FlattenOutput> {
        let output = flatten_resources(&resources, &self.rules)?;
        tracing::info!(
            "🔄 Normalized {} columns, kept {} rows x {} columns",
            output.report.normalized_columns,
            output.report.rows,
            output.table.columns().len()
        );
        Ok(output)
    }

    async fn load(&self, output: FlattenOutput) -> Result<(String, usize)> {
        write_table(&self.storage, &self.csv_output, &output.table).await?;
        if let Some(path) = &self.parquet_output {
            self.write_snapshot(path, &output).await?;
        }
        Ok((self.csv_output.clone(), output.table.len()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipelines::test_support::MockStorage;
    use crate::core::etl::EtlEngine;
    use crate::core::table_io::read_csv;
    use serde_json::json;

    async fn storage_with(path: &str, value: Value) -> MockStorage {
        let storage = MockStorage::new();
        storage.put(path, value.to_string().as_bytes()).await;
        storage
    }

    #[tokio::test]
    async fn test_claims_flatten_writes_csv_and_snapshot() {
        let storage = storage_with(
            "eob_raw_resources.json",
            json!([
                {"id": "pde--1", "status": "active", "patient": {"reference": "Patient/-1"},
                 "total": [{"amount": {"value": 10.5}}], "item": [{"sequence": 1}]},
                {"id": "carrier--2", "status": "active"}
            ]),
        )
        .await;

        let pipeline = FlattenPipeline::claims(storage.clone(), &EtlConfig::default());
        let result = EtlEngine::new(pipeline).run().await.unwrap();

        assert_eq!(result.output_path, "eob_part_d_clean.csv");
        assert_eq!(result.records, 1);

        let table = read_csv(&storage.get_file("eob_part_d_clean.csv").await.unwrap()).unwrap();
        assert_eq!(table.get(0, "claim_id"), Some("pde--1"));
        assert_eq!(table.get(0, "patient_ref"), Some("Patient/-1"));
        assert_eq!(table.get(0, "total_amount"), Some("10.5"));
        assert_eq!(table.get(0, "item"), Some(r#"[{"sequence":1}]"#));

        #[cfg(feature = "parquet")]
        assert!(storage.get_file("eob_part_d_clean.parquet").await.is_some());
    }

    #[tokio::test]
    async fn test_parquet_can_be_disabled() {
        let storage = storage_with("patient_raw_resources.json", json!([{"id": "-1", "gender": "female"}])).await;
        let mut config = EtlConfig::default();
        config.load.write_parquet = false;

        EtlEngine::new(FlattenPipeline::patients(storage.clone(), &config))
            .run()
            .await
            .unwrap();

        assert!(storage.get_file("patient_clean.csv").await.is_some());
        assert!(storage.get_file("patient_clean.parquet").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_input_is_fatal() {
        let pipeline = FlattenPipeline::patients(MockStorage::new(), &EtlConfig::default());
        assert!(matches!(
            pipeline.extract().await,
            Err(EtlError::MissingInputFile { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_array_input_is_rejected() {
        let storage = storage_with("patient_raw_resources.json", json!({"resourceType": "Bundle"})).await;
        let pipeline = FlattenPipeline::patients(storage, &EtlConfig::default());
        assert!(matches!(
            pipeline.extract().await,
            Err(EtlError::ProcessingError { .. })
        ));
    }
}
