use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// 初始化全局日志；设置了 RUST_LOG 时以环境变量为准
pub fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = result {
        eprintln!("日志初始化失败: {e}");
    }
}
