use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::MatchEngine;
use crate::metadata::MetadataStore;
use crate::metrics;
use crate::thumbnail::ThumbnailStore;

/// 正在进行的匹配数量
#[derive(Debug, Default)]
pub struct PendingMatches(AtomicUsize);

impl PendingMatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// 计数加一，返回的守卫在析构时减一
    pub fn enter(&self) -> PendingGuard<'_> {
        let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_pending_matches(n);
        PendingGuard(self)
    }
}

/// 无论匹配成功、失败还是 panic，离开作用域时都会减少计数
pub struct PendingGuard<'a>(&'a PendingMatches);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let n = self.0.0.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_pending_matches(n);
    }
}

/// 匹配接口的返回结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MatchResult {
    /// 设计 ID，没有找到任何设计时为 null
    pub id: Option<usize>,
    pub design_url: Option<String>,
    pub title: String,
    pub artist: String,
    /// 设计上架日期
    pub added: String,
    pub artist_url: String,
    /// 置信度，范围 [0, 1]
    pub confidence: f32,
    /// 匹配耗时，单位为秒
    pub elapsed: f32,
    /// base64 编码的设计缩略图
    pub thumbnail: Option<String>,
    pub width: u32,
    pub height: u32,
    /// 最佳匹配偏离候选均值的标准差倍数
    pub std_away: f32,
    pub match_count: usize,
}

/// 匹配服务：统计正在进行的匹配数量，并为结果补充元数据
pub struct MatchService {
    engine: MatchEngine,
    metadata: MetadataStore,
    thumbnails: ThumbnailStore,
    design_url: String,
    pending: PendingMatches,
    healthy_threshold: usize,
}

impl MatchService {
    /// 创建匹配服务
    ///
    /// # Arguments
    ///
    /// * `design_url` - 设计页面地址前缀，后接设计 ID
    /// * `healthy_threshold` - 正在进行的匹配数量达到该值时服务视为不健康
    pub fn new(
        engine: MatchEngine,
        metadata: MetadataStore,
        thumbnails: ThumbnailStore,
        design_url: String,
        healthy_threshold: usize,
    ) -> Self {
        Self {
            engine,
            metadata,
            thumbnails,
            design_url,
            pending: PendingMatches::new(),
            healthy_threshold,
        }
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    /// 正在进行的匹配数量
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// 正在进行的匹配数量小于阈值时健康
    ///
    /// 仅供负载均衡参考，不健康时依然会处理请求。
    pub fn is_healthy(&self) -> bool {
        self.pending.get() < self.healthy_threshold
    }

    /// 匹配一张图片
    pub fn match_image(&self, image: &[u8]) -> Result<MatchResult> {
        let _guard = self.pending.enter();
        debug!("开始匹配，当前 {} 个匹配进行中", self.pending.get());

        let outcome = match self.engine.find_best_match(image) {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::inc_match_failed();
                return Err(e);
            }
        };
        let elapsed = outcome.elapsed.as_secs_f32();
        let best = outcome.best;
        metrics::observe_match(elapsed, best.confidence);

        let mut result = MatchResult {
            id: best.design_id,
            design_url: None,
            title: String::new(),
            artist: String::new(),
            added: String::new(),
            artist_url: String::new(),
            confidence: best.confidence,
            elapsed,
            thumbnail: None,
            width: 0,
            height: 0,
            std_away: best.std_away,
            match_count: best.match_count(),
        };

        if let Some(id) = best.design_id {
            let info = self.metadata.lookup(id);
            result.design_url = Some(format!("{}{}", self.design_url, id));
            result.title = info.title;
            result.artist = info.artist;
            result.added = info.added;
            result.artist_url = info.artist_url;

            match self.thumbnails.load(id) {
                Ok(thumbnail) => {
                    result.thumbnail = Some(thumbnail.data);
                    result.width = thumbnail.width;
                    result.height = thumbnail.height;
                }
                Err(e) => warn!("设计 {} 缺少缩略图: {:#}", id, e),
            }
        }

        Ok(result)
    }
}
