//! 进程生命周期：Starting → Serving → Draining → Stopped
//!
//! 只有一条转移路径，不重试、不重启。启动阶段的任何失败都是致命的；
//! 排空超时不视为错误，只记录告警。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{AppConfig, DatabaseConfig, DatabaseDriver};
use crate::error::StartupError;
use crate::features::report::{ReportStore, SqliteReportStore};
use crate::server::{DrainOutcome, HttpServer, ServerTimeouts, build_app};
use crate::shutdown::ShutdownManager;
use crate::state::AppState;

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Starting,
    Serving,
    Draining,
    Stopped,
}

/// 生命周期控制器：持有已绑定的服务器，驱动其余的阶段转移
pub struct Lifecycle {
    server: HttpServer,
    shutdown: ShutdownManager,
    grace: Duration,
    phase_tx: watch::Sender<LifecyclePhase>,
}

impl Lifecycle {
    /// 启动阶段：打开数据库、建表、绑定端口
    pub async fn start(config: &AppConfig, shutdown: ShutdownManager) -> Result<Self, StartupError> {
        let store = open_store(&config.database).await?;
        Self::start_with_store(config, shutdown, Arc::new(store), ServerTimeouts::default()).await
    }

    /// 使用外部提供的持久化网关启动（测试或嵌入场景）
    pub async fn start_with_store(
        config: &AppConfig,
        shutdown: ShutdownManager,
        store: Arc<dyn ReportStore>,
        timeouts: ServerTimeouts,
    ) -> Result<Self, StartupError> {
        let (phase_tx, _) = watch::channel(LifecyclePhase::Starting);

        let app = build_app(AppState::new(store), &timeouts);
        let addr = config.server_addr();
        let server = HttpServer::bind(&addr, app, timeouts).await?;

        Ok(Self {
            server,
            shutdown,
            grace: config.shutdown.timeout_duration(),
            phase_tx,
        })
    }

    /// 实际监听地址
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// 订阅阶段变化
    pub fn phases(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase_tx.subscribe()
    }

    /// 服务直到收到退出信号，然后在宽限时间内排空
    ///
    /// 无论排空是否在宽限时间内完成都正常返回，由调用方以成功状态退出。
    pub async fn run(self) -> DrainOutcome {
        let Self {
            server,
            shutdown,
            grace,
            phase_tx,
        } = self;

        phase_tx.send_replace(LifecyclePhase::Serving);
        info!("服务已就绪: http://{}", server.local_addr());

        let serving = server.run(shutdown.clone(), grace);
        tokio::pin!(serving);

        // 两者观察同一个令牌；优先处理退出信号，保证先进入 Draining 再等待排空
        let reason = tokio::select! {
            biased;
            reason = shutdown.wait_for_shutdown() => reason,
            outcome = &mut serving => return finish(&phase_tx, outcome),
        };

        phase_tx.send_replace(LifecyclePhase::Draining);
        info!(
            "接收到退出信号: {:?}，开始优雅关闭，宽限时间 {:?}",
            reason, grace
        );

        let outcome = serving.await;
        finish(&phase_tx, outcome)
    }
}

fn finish(phase_tx: &watch::Sender<LifecyclePhase>, outcome: DrainOutcome) -> DrainOutcome {
    match outcome {
        DrainOutcome::Completed => info!("在途请求已全部完成"),
        // 超时按正常退出处理，仅记录被放弃的连接数
        DrainOutcome::TimedOut { abandoned } => {
            warn!("优雅退出超时，放弃 {} 个未完成的连接", abandoned)
        }
    }
    phase_tx.send_replace(LifecyclePhase::Stopped);
    outcome
}

/// 校验驱动、打开数据库并确保表结构存在
pub async fn open_store(config: &DatabaseConfig) -> Result<SqliteReportStore, StartupError> {
    let Some(DatabaseDriver::Sqlite) = DatabaseDriver::parse(&config.driver) else {
        return Err(StartupError::UnsupportedDriver(config.driver.clone()));
    };

    let store = SqliteReportStore::connect(config)
        .await
        .map_err(|source| StartupError::StoreOpen {
            uri: config.uri.clone(),
            source,
        })?;
    store.init_schema().await.map_err(StartupError::Migrate)?;

    info!("数据库已就绪: {}", config.uri);
    Ok(store)
}
