//! 优雅退出管理模块
//!
//! `ShutdownManager` 是一次性的取消令牌：接入循环与主控制流都等待它，
//! 第一次触发即进入排空流程，之后的重复触发被忽略。

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, info};

/// 优雅退出管理器
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    /// 退出信号通知器
    notify: Notify,
    /// 首次触发的退出原因
    reason: Mutex<Option<ShutdownReason>>,
    /// 是否已经开始优雅退出
    shutting_down: AtomicBool,
}

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断信号 (Ctrl+C / SIGINT)
    Interrupt,
    /// 应用内部请求退出（测试或嵌入场景）
    Application,
}

impl ShutdownManager {
    /// 创建新的优雅退出管理器
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                notify: Notify::new(),
                reason: Mutex::new(None),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// 等待退出信号
    ///
    /// 先登记等待再检查标志位，避免在两者之间触发导致通知丢失。
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if !self.is_shutting_down() {
            debug!("等待退出信号...");
            notified.await;
        }
        self.reason()
    }

    fn reason(&self) -> ShutdownReason {
        self.inner
            .reason
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .unwrap_or(ShutdownReason::Application)
    }

    /// 触发优雅退出，只有第一次调用生效
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        // 原因先于标志位写入，观察到标志位的等待方一定能读到原因
        let first = match self.inner.reason.lock() {
            Ok(mut guard) if guard.is_none() => {
                *guard = Some(reason);
                true
            }
            Ok(_) => false,
            Err(_) => !self.is_shutting_down(),
        };

        if first {
            info!("触发优雅退出: {:?}", reason);
            self.inner.shutting_down.store(true, Ordering::SeqCst);
            self.inner.notify.notify_waiters();
        } else {
            debug!("重复的退出信号被忽略");
        }
    }

    /// 检查是否正在关闭
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// 启动信号处理器
    ///
    /// 只监听中断信号（Ctrl+C / SIGINT），不处理其他信号。
    pub fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        #[cfg(unix)]
        {
            self.start_unix_signal_handler()
        }

        #[cfg(not(unix))]
        {
            self.start_ctrl_c_handler()
        }
    }

    #[cfg(unix)]
    fn start_unix_signal_handler(&self) -> Result<(), ShutdownError> {
        use tokio::signal::unix::{SignalKind, signal};

        info!("启动Unix信号处理器");

        // 在此处同步注册，保证返回后信号已被接管
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;

        let manager = self.clone();
        tokio::spawn(async move {
            while sigint.recv().await.is_some() {
                info!("接收到SIGINT信号 (Ctrl+C)");
                manager.trigger_shutdown(ShutdownReason::Interrupt);
            }
        });

        Ok(())
    }

    #[cfg(not(unix))]
    fn start_ctrl_c_handler(&self) -> Result<(), ShutdownError> {
        info!("启动Ctrl+C信号处理器");

        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("监听Ctrl+C信号失败: {}", e);
                    return;
                }
                info!("接收到Ctrl+C信号");
                manager.trigger_shutdown(ShutdownReason::Interrupt);
            }
        });

        Ok(())
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 优雅退出错误类型
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("信号设置失败: {0}")]
    SignalSetup(String),
}
