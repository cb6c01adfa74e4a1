use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API错误类型
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    /// 由请求内容导致的错误，例如无法解析的图片
    pub fn bad_request<E: Into<anyhow::Error>>(err: E) -> Self {
        Self { status: StatusCode::BAD_REQUEST, error: err.into() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, format!("Something went wrong: {:#}", self.error)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, error: err.into() }
    }
}
