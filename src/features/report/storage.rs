use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous},
};

use crate::config::DatabaseConfig;
use crate::error::PersistError;

use super::models::{Record, StoredRecord};

/// 持久化网关：处理器只依赖该接口
///
/// 并发写入的安全性由实现方（及其底层存储）负责，调用方不额外加锁。
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// 写入一条上报，返回存储分配的标识与时间戳
    async fn create(&self, record: &Record) -> Result<StoredRecord, PersistError>;
}

/// 基于 SQLite 的持久化实现
#[derive(Clone)]
pub struct SqliteReportStore {
    pub pool: SqlitePool,
}

impl SqliteReportStore {
    /// 打开数据库；`uri` 可以是文件路径、`:memory:` 或 `sqlite:` URL
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let uri = config.uri.trim();
        let opt = if uri.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(uri)?
        } else if uri == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new().filename(Path::new(uri))
        };

        let mut opt = opt
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        if config.wal {
            opt = opt.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(opt)
            .await?;
        Ok(Self { pool })
    }

    /// 确保表结构存在；可重复执行
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        let ddl = r#"
        CREATE TABLE IF NOT EXISTS stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            app_name TEXT NOT NULL,
            job_name TEXT NOT NULL,
            version TEXT NOT NULL,
            build_number TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_stats_app_job ON stats(app_name, job_name, created_at);
        "#;
        sqlx::query(ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// 按标识读回一条上报
    pub async fn find(&self, id: i64) -> Result<Option<StoredRecord>, PersistError> {
        let row = sqlx::query(
            "SELECT id, app_name, job_name, version, build_number, created_at, updated_at FROM stats WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(stored_from_row).transpose()
    }

    /// 当前行数
    pub async fn count(&self) -> Result<i64, PersistError> {
        let row = sqlx::query("SELECT COUNT(*) FROM stats")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// 关闭连接池，之后的写入会失败
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn create(&self, record: &Record) -> Result<StoredRecord, PersistError> {
        let now = Utc::now();
        let ts = now.to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO stats(app_name, job_name, version, build_number, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.app_name)
        .bind(&record.job_name)
        .bind(&record.version)
        .bind(&record.build_number)
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(StoredRecord {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            record: record.clone(),
        })
    }
}

fn map_sqlx_error(e: sqlx::Error) -> PersistError {
    match e {
        sqlx::Error::PoolClosed => PersistError::Unavailable("连接池已关闭".to_string()),
        sqlx::Error::PoolTimedOut => PersistError::Unavailable("获取数据库连接超时".to_string()),
        other => PersistError::Database(other),
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, PersistError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn stored_from_row(row: &SqliteRow) -> Result<StoredRecord, PersistError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(StoredRecord {
        id: row.try_get("id")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        record: Record {
            app_name: row.try_get("app_name")?,
            job_name: row.try_get("job_name")?,
            version: row.try_get("version")?,
            build_number: row.try_get("build_number")?,
        },
    })
}
