use clap::Parser;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 命令行参数
///
/// 除 `--config` 外均为可选：未显式给出时依次回落到环境变量、配置文件与内置默认值，
/// 因此零参数即可启动。
#[derive(Debug, Clone, Parser)]
#[command(name = "report-ingest", version, about = "构建报告采集服务")]
pub struct Cli {
    /// 配置文件路径（文件不存在时忽略）
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// 监听地址
    #[arg(long)]
    pub bind_address: Option<String>,

    /// 监听端口
    #[arg(long)]
    pub bind_port: Option<u16>,

    /// 优雅退出时等待在途请求完成的最长时间，例如 15s、1m、1m30s
    #[arg(long, value_parser = parse_duration)]
    pub graceful_timeout: Option<Duration>,

    /// 数据库驱动（目前支持 sqlite3）
    #[arg(long)]
    pub database_driver: Option<String>,

    /// 数据库连接串：文件路径或 sqlite: URL
    #[arg(long)]
    pub database_uri: Option<String>,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 等待在途请求完成的宽限时间（毫秒）
    #[serde(default = "ShutdownConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ShutdownConfig {
    fn default_timeout_ms() -> u64 {
        15_000
    }

    /// 获取宽限时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

/// 支持的数据库驱动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Sqlite,
}

impl DatabaseDriver {
    /// 解析驱动名，`sqlite3` 与 `sqlite` 等价
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 驱动名
    #[serde(default = "DatabaseConfig::default_driver")]
    pub driver: String,
    /// 连接串
    #[serde(default = "DatabaseConfig::default_uri")]
    pub uri: String,
    /// 连接池上限
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
    /// 是否启用 WAL
    #[serde(default = "DatabaseConfig::default_wal")]
    pub wal: bool,
}

impl DatabaseConfig {
    fn default_driver() -> String {
        "sqlite3".to_string()
    }
    fn default_uri() -> String {
        "./xan.db".to_string()
    }
    fn default_max_connections() -> u32 {
        8
    }
    fn default_wal() -> bool {
        true
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: Self::default_driver(),
            uri: Self::default_uri(),
            max_connections: Self::default_max_connections(),
            wal: Self::default_wal(),
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter 指令；设置了 RUST_LOG 时以环境变量为准
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    fn default_level() -> String {
        "report_ingest=info,tower_http=info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

/// 应用配置
///
/// 启动时构建一次，之后只读，并以引用形式显式传给需要它的组件。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 按 内置默认值 → 配置文件 → 环境变量 → 命令行 的顺序叠加配置
    ///
    /// 环境变量示例：`APP_SERVER__PORT=9000`、`APP_DATABASE__URI=/data/xan.db`。
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(ConfigBuilder::try_from(&AppConfig::default())?)
            .add_source(File::from(cli.config.as_path()).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(host) = &cli.bind_address {
            builder = builder.set_override("server.host", host.as_str())?;
        }
        if let Some(port) = cli.bind_port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(timeout) = cli.graceful_timeout {
            let ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            builder = builder.set_override("shutdown.timeout_ms", ms)?;
        }
        if let Some(driver) = &cli.database_driver {
            builder = builder.set_override("database.driver", driver.as_str())?;
        }
        if let Some(uri) = &cli.database_uri {
            builder = builder.set_override("database.uri", uri.as_str())?;
        }

        builder.build()?.try_deserialize()
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 解析形如 `500ms`、`15s`、`1m30s`、`2h` 的时长；单独的 `0` 表示零
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("时长不能为空".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("无效的时长 {input:?}：缺少数值"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| format!("无效的时长 {input:?}：{e}"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "" => return Err(format!("无效的时长 {input:?}：缺少单位（ms/s/m/h）")),
            other => return Err(format!("无效的时长 {input:?}：未知单位 {other:?}")),
        };
        total = total.saturating_add(part);
    }
    Ok(total)
}
