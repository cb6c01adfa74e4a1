use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_typed_multipart::TypedMultipart;
use log::info;
use tokio::task::spawn_blocking;
use utoipa::OpenApi;

use super::ApiDoc;
use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::metrics;
use crate::service::MatchResult;

/// 查找与上传图片最匹配的设计
#[utoipa::path(
    post,
    path = "/match",
    request_body(content = MatchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = MatchResult),
        (status = 400, description = "无法处理上传的图片"),
    )
)]
pub async fn match_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<MatchRequest>,
) -> Result<Json<MatchResult>> {
    let file_name = data.file.metadata.file_name.unwrap_or_default();
    info!("正在匹配上传图片 {:?}", file_name);

    let image = data.file.contents;
    let result = spawn_blocking(move || state.service.match_image(&image))
        .await?
        .map_err(AppError::bad_request)?;

    Ok(Json(result))
}

/// 健康检查，正在进行的匹配数量达到阈值时返回 404
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "服务健康"),
        (status = 404, description = "正在进行的匹配过多"),
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.service.is_healthy() { StatusCode::OK } else { StatusCode::NOT_FOUND }
}

/// 导出 prometheus 指标
pub async fn metrics_handler() -> String {
    metrics::gather_text()
}

pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
