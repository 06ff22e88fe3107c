#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use report_ingest::PersistError;
use report_ingest::config::DatabaseConfig;
use report_ingest::features::report::{Record, ReportStore, SqliteReportStore, StoredRecord};
use tokio::sync::Notify;

pub const VALID_BODY: &str =
    r#"{"app_name":"svc","job_name":"build","version":"1.0.0","build_number":"42"}"#;

pub fn sample_record() -> Record {
    Record {
        app_name: "svc".into(),
        job_name: "build".into(),
        version: "1.0.0".into(),
        build_number: "42".into(),
    }
}

/// 临时目录中的 SQLite 存储（目录随返回值一起释放）
pub async fn temp_sqlite() -> (tempfile::TempDir, SqliteReportStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = DatabaseConfig {
        uri: dir.path().join("reports.db").to_string_lossy().into_owned(),
        ..DatabaseConfig::default()
    };
    let store = SqliteReportStore::connect(&config).await.expect("connect sqlite");
    store.init_schema().await.expect("init schema");
    (dir, store)
}

/// 内存存储
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create(&self, record: &Record) -> Result<StoredRecord, PersistError> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        let stored = StoredRecord {
            id: rows.len() as i64 + 1,
            created_at: now,
            updated_at: now,
            record: record.clone(),
        };
        rows.push(stored.clone());
        Ok(stored)
    }
}

/// 前 `failures` 次写入失败，之后委托给内存存储
pub struct FlakyStore {
    pub failures: AtomicUsize,
    pub inner: MemoryStore,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            inner: MemoryStore::default(),
        }
    }
}

#[async_trait]
impl ReportStore for FlakyStore {
    async fn create(&self, record: &Record) -> Result<StoredRecord, PersistError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PersistError::Unavailable("database is unreachable".into()));
        }
        self.inner.create(record).await
    }
}

/// 在真正写入前等待 `delay`，并在进入时发出通知
pub struct SlowStore<S> {
    pub inner: S,
    pub delay: Duration,
    pub entered: Notify,
    pub calls: AtomicUsize,
}

impl<S> SlowStore<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// 等待至少 `n` 次写入已开始
    pub async fn wait_entered(&self, n: usize) {
        loop {
            let notified = self.entered.notified();
            if self.calls.load(Ordering::SeqCst) >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl<S: ReportStore> ReportStore for SlowStore<S> {
    async fn create(&self, record: &Record) -> Result<StoredRecord, PersistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_waiters();
        tokio::time::sleep(self.delay).await;
        self.inner.create(record).await
    }
}
