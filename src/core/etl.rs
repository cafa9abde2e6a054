use crate::core::Pipeline;
use crate::domain::model::StageResult;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

/// 執行單一 Pipeline 的 extract → transform → load
pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<StageResult> {
        let stage = self.pipeline.name().to_string();
        let start = Instant::now();
        tracing::info!("🚀 Starting stage: {}", stage);
        self.monitor.log_stage(&stage, "start");

        tracing::debug!("📥 Extracting...");
        let extracted = self.pipeline.extract().await?;

        tracing::debug!("🔄 Transforming...");
        let transformed = self.pipeline.transform(extracted).await?;

        tracing::debug!("💾 Loading...");
        let (output_path, records) = self.pipeline.load(transformed).await?;

        let duration = start.elapsed();
        self.monitor.log_stage(&stage, "end");
        tracing::info!(
            "✅ Stage {} wrote {} rows to {} in {:?}",
            stage,
            records,
            output_path,
            duration
        );

        Ok(StageResult {
            stage_name: stage,
            output_path,
            records,
            duration,
        })
    }
}
