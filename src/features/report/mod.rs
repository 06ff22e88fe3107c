pub mod handler;
pub mod models;
pub mod storage;
pub mod validator;

pub use handler::{create_report_router, post_report};
pub use models::{Record, StoredRecord};
pub use storage::{ReportStore, SqliteReportStore};
pub use validator::validate;
