use std::sync::Arc;

use crate::service::MatchService;

/// 应用状态
pub struct AppState {
    /// 匹配服务
    pub service: MatchService,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(service: MatchService) -> Arc<Self> {
        Arc::new(AppState { service })
    }
}
