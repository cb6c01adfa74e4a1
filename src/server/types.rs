use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use utoipa::ToSchema;

/// 匹配请求参数
#[derive(TryFromMultipart)]
pub struct MatchRequest {
    #[form_data(limit = "10MiB")]
    pub file: FieldData<Bytes>,
}

/// 匹配表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct MatchForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}
