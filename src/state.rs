use std::sync::Arc;

use crate::features::report::ReportStore;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 所有请求共享同一个持久化网关
    pub store: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }
}
