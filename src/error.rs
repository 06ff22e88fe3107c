use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::shutdown::ShutdownError;

/// 单次上报请求的错误
///
/// 三类错误都在处理器内部消化：转换为响应后返回给调用方，不影响其他请求。
#[derive(Error, Debug)]
pub enum ReportError {
    /// 请求体不是合法 JSON 或字段类型不匹配
    #[error("请求体解码失败: {0}")]
    Decode(String),

    /// 必填字段缺失或为空
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// 写入存储失败
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// 字段校验错误，列出所有缺失的必填字段
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("参数校验失败: 必填字段缺失或为空: {}", .missing.join(", "))]
pub struct ValidationError {
    pub missing: Vec<&'static str>,
}

/// 持久化错误
#[derive(Error, Debug)]
pub enum PersistError {
    /// 数据库执行失败
    #[error("存储写入失败: {0}")]
    Database(#[from] sqlx::Error),

    /// 存储已关闭（通常发生在退出阶段）
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 启动阶段错误，均为致命错误：进程在处理任何流量前以非零状态退出
#[derive(Error, Debug)]
pub enum StartupError {
    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    /// 不支持的数据库驱动
    #[error("不支持的数据库驱动: {0}")]
    UnsupportedDriver(String),

    /// 无法打开数据库
    #[error("无法打开数据库 {uri}: {source}")]
    StoreOpen {
        uri: String,
        #[source]
        source: sqlx::Error,
    },

    /// 建表失败
    #[error("初始化表结构失败: {0}")]
    Migrate(#[source] sqlx::Error),

    /// 端口绑定失败
    #[error("绑定地址 {addr} 失败: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 信号处理器注册失败
    #[error("信号处理器启动失败: {0}")]
    Signal(#[from] ShutdownError),
}

impl ReportError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReportError::Decode(_) => StatusCode::BAD_REQUEST,
            ReportError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReportError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 响应体即错误描述原文，不附加结构化错误码
        let mut res = (status, self.to_string()).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}
