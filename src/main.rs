use bluebutton_etl::app::pipelines::{
    FetchPipeline, FilterPipeline, FlattenPipeline, ItemsPipeline, MergePipeline, PathExtractPipeline,
};
use bluebutton_etl::core::Pipeline;
use bluebutton_etl::utils::error::ErrorSeverity;
use bluebutton_etl::utils::logger;
use bluebutton_etl::{CliConfig, Command, EtlConfig, EtlEngine, EtlError, EtlSequence, LocalStorage};
use clap::Parser;

async fn run_single<P: Pipeline>(pipeline: P, monitor: bool) -> bluebutton_etl::Result<Vec<String>> {
    let result = EtlEngine::new_with_monitoring(pipeline, monitor).run().await?;
    Ok(vec![result.output_path])
}

fn display_paths(storage: &LocalStorage, outputs: Vec<String>) -> Vec<String> {
    outputs
        .iter()
        .map(|output| storage.base_path().join(output).display().to_string())
        .collect()
}

async fn dispatch(cli: &CliConfig, config: EtlConfig) -> bluebutton_etl::Result<Vec<String>> {
    let monitor = config.monitoring_enabled();
    let storage = LocalStorage::new(config.files.output_dir.clone());
    let base = storage.clone();

    let outputs = match &cli.command {
        Command::Fetch { resource, .. } => {
            run_single(FetchPipeline::from_config(storage, &config, *resource)?, monitor).await
        }
        Command::FlattenClaims => run_single(FlattenPipeline::claims(storage, &config), monitor).await,
        Command::FlattenPatients => run_single(FlattenPipeline::patients(storage, &config), monitor).await,
        Command::ExtractItems => run_single(ItemsPipeline::from_config(storage, &config), monitor).await,
        Command::FilterColumns => run_single(FilterPipeline::from_config(storage, &config), monitor).await,
        Command::Merge => run_single(MergePipeline::from_config(storage, &config), monitor).await,
        Command::ExtractPath { input, key, output } => {
            // paths given on the command line are relative to the working directory
            let pipeline = PathExtractPipeline::new(LocalStorage::new("."), input.clone(), key.clone(), output.clone());
            return run_single(pipeline, monitor).await;
        }
        Command::Run { skip_fetch } => {
            let results = EtlSequence::new(storage, config)
                .with_monitoring(monitor)
                .execute_all(*skip_fetch)
                .await?;
            Ok(results.into_iter().map(|r| r.output_path).collect())
        }
    }?;

    Ok(display_paths(&base, outputs))
}

fn exit_code(e: &EtlError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn report_failure(e: &EtlError) {
    tracing::error!(
        "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.log_json);

    tracing::info!("Starting bluebutton-etl");
    tracing::debug!("CLI config: {:?}", cli);

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            report_failure(&e);
            std::process::exit(exit_code(&e).max(1));
        }
    };
    if config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    match dispatch(&cli, config).await {
        Ok(outputs) => {
            tracing::info!("✅ ETL process completed successfully!");
            for output in &outputs {
                println!("📁 {}", output);
            }
        }
        Err(e) => {
            report_failure(&e);
            let code = exit_code(&e);
            if code > 0 {
                std::process::exit(code);
            }
        }
    }
}
