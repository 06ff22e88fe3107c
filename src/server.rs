//! HTTP 服务器
//!
//! 接入循环与连接驱动：每个连接一个任务，固定的读/写/空闲超时，
//! 以及“停止接入 → 通知连接收尾 → 在期限内等待全部连接结束”的协作式关闭。

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{Router, body::Body, extract::Request, middleware::Next, response::Response};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    time::Instant,
};
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, trace};

use crate::error::StartupError;
use crate::features::report::create_report_router;
use crate::shutdown::ShutdownManager;
use crate::state::AppState;

/// 读取请求头/请求体的期限
pub const READ_TIMEOUT: Duration = Duration::from_secs(15);
/// 处理请求并写回响应的期限
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(15);
/// 保持连接在没有请求时的最长空闲时间
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// 连接级超时，与优雅退出的宽限时间无关
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read: READ_TIMEOUT,
            write: WRITE_TIMEOUT,
            idle: IDLE_TIMEOUT,
        }
    }
}

/// 排空结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// 所有连接都在宽限时间内结束
    Completed,
    /// 宽限时间耗尽时仍有连接未结束
    TimedOut { abandoned: usize },
}

/// 请求日志中间件：无论结果如何都记录请求路径
pub async fn log_request_middleware(req: Request, next: Next) -> Response {
    info!(method = %req.method(), "{}", req.uri());
    next.run(req).await
}

/// 组装路由：`POST /report`，外层依次为写超时与请求日志
pub fn build_app(state: AppState, timeouts: &ServerTimeouts) -> Router {
    create_report_router()
        .with_state(state)
        .layer(TimeoutLayer::new(timeouts.write))
        .layer(axum::middleware::from_fn(log_request_middleware))
}

pub struct HttpServer {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
    timeouts: ServerTimeouts,
}

impl HttpServer {
    /// 绑定监听地址；失败属于启动错误
    pub async fn bind(
        addr: &str,
        app: Router,
        timeouts: ServerTimeouts,
    ) -> Result<Self, StartupError> {
        let bind_err = |source| StartupError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self {
            listener,
            app,
            local_addr,
            timeouts,
        })
    }

    /// 实际监听地址（绑定 0 端口时由系统分配）
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 接入并服务连接，直到 `shutdown` 触发；随后停止接入并在 `grace` 内等待在途连接结束
    pub async fn run(self, shutdown: ShutdownManager, grace: Duration) -> DrainOutcome {
        let Self {
            listener,
            app,
            local_addr,
            timeouts,
        } = self;

        // signal：通知各连接进入收尾；close：各连接持有一个接收端，全部释放即排空完成
        let (signal_tx, signal_rx) = watch::channel(());
        let (close_tx, close_rx) = watch::channel(());

        let shutdown_signal = shutdown.wait_for_shutdown();
        tokio::pin!(shutdown_signal);

        debug!("开始接入连接: {}", local_addr);
        loop {
            let (stream, remote) = tokio::select! {
                biased;
                _ = &mut shutdown_signal => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        handle_accept_error(e).await;
                        continue;
                    }
                },
            };
            trace!(%remote, "接受连接");

            tokio::spawn(serve_connection(
                stream,
                app.clone(),
                timeouts,
                signal_rx.clone(),
                close_rx.clone(),
            ));
        }

        // 释放监听套接字后，新的连接请求会被系统直接拒绝
        drop(listener);
        drop(close_rx);
        let _ = signal_tx.send(());
        drop(signal_rx);

        info!(
            open_connections = close_tx.receiver_count(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "停止接入新连接，等待在途请求完成"
        );

        match tokio::time::timeout(grace, close_tx.closed()).await {
            Ok(()) => DrainOutcome::Completed,
            Err(_) => DrainOutcome::TimedOut {
                abandoned: close_tx.receiver_count(),
            },
        }
    }
}

fn is_connection_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}

async fn handle_accept_error(e: std::io::Error) {
    if is_connection_error(&e) {
        return;
    }
    // 多为文件描述符耗尽，稍后重试，避免空转
    error!("接受连接失败: {}", e);
    tokio::time::sleep(Duration::from_secs(1)).await;
}

async fn serve_connection(
    stream: TcpStream,
    app: Router,
    timeouts: ServerTimeouts,
    mut signal_rx: watch::Receiver<()>,
    close_rx: watch::Receiver<()>,
) {
    let activity = ConnActivity::new();
    let service = {
        let activity = activity.clone();
        hyper::service::service_fn(move |req: hyper::Request<Incoming>| {
            let guard = activity.begin();
            let app = app.clone();
            async move {
                let res = app.oneshot(req.map(Body::new)).await;
                drop(guard);
                res
            }
        })
    };

    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read);

    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!("连接异常结束: {}", e);
                }
                break;
            }
            _ = signal_rx.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = activity.idle(timeouts.idle), if !closing => {
                debug!("连接空闲超时，关闭");
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }

    drop(close_rx);
}

/// 单个连接的活动状态：在途请求数与最近一次活动时间
#[derive(Debug)]
struct ConnActivity {
    in_flight: AtomicUsize,
    last_active: Mutex<Instant>,
}

struct ActivityGuard(Arc<ConnActivity>);

impl ConnActivity {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            last_active: Mutex::new(Instant::now()),
        })
    }

    fn begin(self: &Arc<Self>) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActivityGuard(self.clone())
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_active.lock() {
            *last = Instant::now();
        }
    }

    fn last_active(&self) -> Instant {
        self.last_active
            .lock()
            .map(|last| *last)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// 在没有在途请求且空闲时间达到 `timeout` 时完成
    async fn idle(&self, timeout: Duration) {
        loop {
            let now = Instant::now();
            let deadline = if self.in_flight.load(Ordering::SeqCst) > 0 {
                now + timeout
            } else {
                self.last_active() + timeout
            };
            if deadline <= now {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
