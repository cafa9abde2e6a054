use super::{FetchPipeline, FilterPipeline, FlattenPipeline, ItemsPipeline, MergePipeline};
use crate::config::toml_config::EtlConfig;
use crate::core::etl::EtlEngine;
use crate::core::{Pipeline, Storage};
use crate::domain::model::{ResourceKind, StageResult};
use crate::utils::error::{EtlError, Result};
use crate::utils::monitor::SystemMonitor;
use crate::utils::validation::Validate;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// 依序執行整條 Part D 流程，任一階段失敗即中止
pub struct EtlSequence<S: Storage + Clone> {
    storage: S,
    config: EtlConfig,
    monitor: SystemMonitor,
    execution_id: String,
}

impl<S: Storage + Clone> EtlSequence<S> {
    pub fn new(storage: S, config: EtlConfig) -> Self {
        let execution_id = format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"));
        Self {
            storage,
            config,
            monitor: SystemMonitor::new(false),
            execution_id,
        }
    }

    pub fn with_execution_id(mut self, execution_id: String) -> Self {
        self.execution_id = execution_id;
        self
    }

    /// 啟用或禁用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = SystemMonitor::new(enabled);
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// fetch EOB → fetch Patient → flatten claims → flatten patients →
    /// filter claims → extract items → merge → archive.
    pub async fn execute_all(&self, skip_fetch: bool) -> Result<Vec<StageResult>> {
        if skip_fetch {
            self.config.validate()?;
        } else {
            self.config.validate_for_fetch()?;
        }

        tracing::info!("🚀 Starting sequence {} ({})", self.config.pipeline.name, self.execution_id);
        self.monitor.log_stage(&self.config.pipeline.name, "start");

        let mut results = Vec::new();
        let storage = &self.storage;
        let config = &self.config;

        if skip_fetch {
            tracing::info!("⏭️ Skipping fetch, using existing raw resource files");
        } else {
            for kind in [ResourceKind::ExplanationOfBenefit, ResourceKind::Patient] {
                let pipeline = FetchPipeline::from_config(storage.clone(), config, kind)?;
                results.push(self.run_stage(pipeline).await?);
            }
        }

        results.push(self.run_stage(FlattenPipeline::claims(storage.clone(), config)).await?);
        results.push(self.run_stage(FlattenPipeline::patients(storage.clone(), config)).await?);
        results.push(self.run_stage(FilterPipeline::from_config(storage.clone(), config)).await?);
        // items come from the unfiltered claims so the item column is always there
        results.push(self.run_stage(ItemsPipeline::from_config(storage.clone(), config)).await?);
        results.push(self.run_stage(MergePipeline::from_config(storage.clone(), config)).await?);

        if config.load.archive {
            self.write_archive(&results).await.map_err(|e| EtlError::TransformationError {
                stage: "archive".to_string(),
                details: e.to_string(),
            })?;
        }

        self.monitor.log_stage(&self.config.pipeline.name, "end");
        let summary = Value::Object(Self::get_execution_summary(&results).into_iter().collect());
        tracing::info!("📊 Execution summary: {}", summary);

        Ok(results)
    }

    async fn run_stage<P: Pipeline>(&self, pipeline: P) -> Result<StageResult> {
        let stage = pipeline.name().to_string();
        EtlEngine::new_with_monitoring(pipeline, self.monitor.is_enabled())
            .run()
            .await
            .map_err(|e| {
                tracing::error!("❌ Stage {} failed: {}", stage, e);
                EtlError::TransformationError {
                    stage,
                    details: e.to_string(),
                }
            })
    }

    /// Zips every CSV the run produced plus a `metadata.json`.
    async fn write_archive(&self, results: &[StageResult]) -> Result<String> {
        let archive_path = self.config.files.archive.clone();
        let csv_outputs: Vec<&StageResult> = results
            .iter()
            .filter(|r| r.output_path.ends_with(".csv"))
            .collect();

        let mut contents = Vec::with_capacity(csv_outputs.len());
        for result in &csv_outputs {
            contents.push((result.output_path.clone(), self.storage.read_file(&result.output_path).await?));
        }

        let metadata = json!({
            "pipeline": self.config.pipeline.name,
            "version": self.config.pipeline.version,
            "execution_id": self.execution_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "stages": results.iter().map(|r| json!({
                "name": r.stage_name,
                "output": r.output_path,
                "records": r.records,
                "duration_ms": r.duration.as_millis() as u64,
            })).collect::<Vec<_>>(),
        });

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
            for (name, data) in &contents {
                zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
                zip.write_all(data)?;
            }
            zip.start_file::<_, ()>("metadata.json", FileOptions::default())?;
            zip.write_all(serde_json::to_string_pretty(&metadata)?.as_bytes())?;

            zip.finish()?.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) with {} tables", zip_data.len(), contents.len());
        self.storage.write_file(&archive_path, &zip_data).await?;
        tracing::info!("📦 Archive saved to {}", archive_path);
        Ok(archive_path)
    }

    /// 獲取執行摘要
    pub fn get_execution_summary(results: &[StageResult]) -> HashMap<String, Value> {
        let mut summary = HashMap::new();

        let total_records: usize = results.iter().map(|r| r.records).sum();
        let total_duration: std::time::Duration = results.iter().map(|r| r.duration).sum();

        summary.insert("total_stages".to_string(), Value::Number(results.len().into()));
        summary.insert("total_records".to_string(), Value::Number(total_records.into()));
        summary.insert(
            "total_duration_ms".to_string(),
            Value::Number((total_duration.as_millis() as u64).into()),
        );
        summary.insert(
            "executed_stages".to_string(),
            Value::Array(
                results
                    .iter()
                    .map(|r| Value::String(r.stage_name.clone()))
                    .collect(),
            ),
        );

        summary
    }
}
