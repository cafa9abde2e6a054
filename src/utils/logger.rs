use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("bluebutton_etl=debug,info")
        } else {
            EnvFilter::new("bluebutton_etl=info")
        }
    })
}

/// 初始化 CLI 日誌；`json` 為真時輸出結構化 JSON 行
pub fn init_cli_logger(verbose: bool, json: bool) {
    let registry = tracing_subscriber::registry().with(default_filter(verbose));

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .init();
    }
}
