use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use log::{debug, info};

use crate::config::{ExtractOptions, MatchOptions};
use crate::corpus::Corpus;
use crate::descriptor::DescriptorSet;
use crate::extract::FeatureExtractor;
use crate::refine::{ConfidenceBounds, refine};
use crate::search::{CoarseSearch, PotentialMatch};

/// 匹配参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    /// 粗搜索查询特征点上限
    pub coarse_features: usize,
    /// 精搜索查询特征点上限
    pub refine_features: usize,
    /// 进入精搜索的候选数量
    pub candidates: usize,
    pub ratio: f32,
    pub refine_ratio: f32,
    pub bounds: ConfidenceBounds,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            coarse_features: 80,
            refine_features: 300,
            candidates: 80,
            ratio: 0.75,
            refine_ratio: 0.75,
            bounds: ConfidenceBounds::default(),
        }
    }
}

impl MatchParams {
    pub fn from_options(extract: &ExtractOptions, matching: &MatchOptions) -> Result<Self> {
        matching.validate()?;
        Ok(Self {
            coarse_features: extract.coarse_features,
            refine_features: extract.refine_features,
            candidates: matching.candidates,
            ratio: matching.ratio,
            refine_ratio: matching.refine_ratio,
            bounds: matching.confidence_bounds()?,
        })
    }
}

/// 一次完整匹配的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub best: PotentialMatch,
    pub elapsed: Duration,
}

/// 匹配引擎：粗搜索 + 精搜索
///
/// 除共享的只读描述符库外没有任何状态，可以被多个请求同时调用。
pub struct MatchEngine {
    corpus: Arc<Corpus>,
    extractor: Arc<dyn FeatureExtractor>,
    search: CoarseSearch,
    params: MatchParams,
}

impl MatchEngine {
    pub fn new(
        corpus: Arc<Corpus>,
        extractor: Arc<dyn FeatureExtractor>,
        search: CoarseSearch,
        params: MatchParams,
    ) -> Self {
        Self { corpus, extractor, search, params }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    /// 提取查询描述符并检查维度是否与描述符库一致
    fn extract(&self, image: &[u8], max_features: usize) -> Result<DescriptorSet> {
        let query = self.extractor.extract(image, max_features)?;
        if let Some(dim) = self.corpus.dim() {
            if !query.is_empty() && query.dim() != dim {
                bail!("查询描述符维度为 {}，描述符库为 {}", query.dim(), dim);
            }
        }
        Ok(query)
    }

    /// 粗搜索，返回匹配数量最多的前 N 个候选
    pub fn find_best_matches(&self, image: &[u8]) -> Result<Vec<PotentialMatch>> {
        let query = self.extract(image, self.params.coarse_features)?;
        debug!("粗搜索查询描述符数量: {}", query.len());

        let mut matches = self.search.search(&query, &self.corpus, self.params.ratio);
        matches.truncate(self.params.candidates);
        Ok(matches)
    }

    /// 使用更多特征点重新提取查询描述符，在候选中选出唯一的最佳匹配
    pub fn refine(&self, image: &[u8], candidates: &[PotentialMatch]) -> Result<PotentialMatch> {
        let query = self.extract(image, self.params.refine_features)?;
        debug!("精搜索查询描述符数量: {}", query.len());

        Ok(refine(&query, candidates, &self.corpus, self.params.refine_ratio, &self.params.bounds))
    }

    /// 查找与图片最匹配的设计，并统计耗时
    pub fn find_best_match(&self, image: &[u8]) -> Result<MatchOutcome> {
        let start = Instant::now();
        let candidates = self.find_best_matches(image)?;
        let best = self.refine(image, &candidates)?;
        let elapsed = start.elapsed();

        info!(
            "最佳匹配 {:?}: {} 个匹配, 置信度 {:.3}, 耗时 {:.3}s",
            best.design_id,
            best.match_count(),
            best.confidence,
            elapsed.as_secs_f32()
        );
        Ok(MatchOutcome { best, elapsed })
    }
}
