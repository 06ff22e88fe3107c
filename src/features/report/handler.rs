use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::post,
};

use crate::{error::ReportError, state::AppState};

use super::{models::Record, validator::validate};

/// 接收一条构建上报：解码 → 校验 → 落库
///
/// 任一步失败即短路返回错误描述，后续步骤不再执行；成功时返回空响应体。
/// 请求体按 JSON 解析，不要求 `Content-Type`。
pub async fn post_report(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ReportError> {
    let record = Record::from_json(&body).map_err(|e| {
        tracing::warn!("解码请求体失败: {}", e);
        ReportError::Decode(e.to_string())
    })?;

    validate(&record).inspect_err(|e| {
        tracing::warn!("校验上报数据失败: {}", e);
    })?;

    let stored = state.store.create(&record).await.inspect_err(|e| {
        tracing::error!("保存上报数据失败: {}", e);
    })?;

    tracing::debug!(
        id = stored.id,
        app_name = %record.app_name,
        job_name = %record.job_name,
        "上报已保存"
    );
    Ok(StatusCode::OK)
}

pub fn create_report_router() -> Router<AppState> {
    Router::new().route("/report", post(post_report))
}
