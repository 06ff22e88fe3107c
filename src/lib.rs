/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 日志初始化
pub mod logging;

/// 功能聚合模块
pub mod features;

/// 应用状态聚合模块
pub mod state;

/// 优雅退出管理模块
pub mod shutdown;

/// HTTP 服务器
pub mod server;

/// 进程生命周期控制
pub mod lifecycle;

// 导出常用类型供外部使用
pub use config::{AppConfig, Cli};
pub use error::{PersistError, ReportError, StartupError, ValidationError};
pub use lifecycle::{Lifecycle, LifecyclePhase};
pub use server::{DrainOutcome, HttpServer, ServerTimeouts};
pub use shutdown::{ShutdownManager, ShutdownReason};
