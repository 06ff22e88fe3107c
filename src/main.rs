use clap::Parser;
use report_ingest::config::LoggingConfig;
use report_ingest::logging::init_tracing;
use report_ingest::{AppConfig, Cli, Lifecycle, ShutdownManager, StartupError};

async fn startup(config: &AppConfig) -> Result<Lifecycle, StartupError> {
    // 先接管中断信号，启动过程中收到的 Ctrl+C 同样会触发排空
    let shutdown_manager = ShutdownManager::new();
    shutdown_manager.start_signal_handler()?;

    Lifecycle::start(config, shutdown_manager).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            tracing::error!("{}", StartupError::from(e));
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);

    let lifecycle = match startup(&config).await {
        Ok(lifecycle) => lifecycle,
        Err(e) => {
            tracing::error!("启动失败: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server: http://{}", lifecycle.local_addr());
    tracing::info!("Report API: POST http://{}/report", lifecycle.local_addr());

    // 排空超时也按正常退出处理
    let outcome = lifecycle.run().await;
    tracing::info!("shutting down ({:?})", outcome);
    std::process::exit(0);
}
