use anyhow::{Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::descriptor::DescriptorSet;
use crate::matcher::compare;
use crate::search::PotentialMatch;

/// 置信度的线性映射区间
///
/// 默认值来自测试数据：正确匹配平均偏离约 20 个标准差，
/// 偏离 1 个标准差的匹配与噪声无异。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBounds {
    /// 低于该值时置信度为 0
    pub low: f32,
    /// 高于该值时置信度为 1
    pub high: f32,
}

impl Default for ConfidenceBounds {
    fn default() -> Self {
        Self { low: 1.0, high: 25.0 }
    }
}

impl ConfidenceBounds {
    pub fn new(low: f32, high: f32) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            bail!("无效的置信度区间: [{}, {}]", low, high);
        }
        Ok(Self { low, high })
    }

    /// 将标准差倍数线性映射到 [0, 1]
    pub fn confidence(&self, std_away: f32) -> f32 {
        ((std_away - self.low) / (self.high - self.low)).clamp(0., 1.)
    }
}

/// 计算 `count` 偏离 `counts` 均值的标准差倍数（总体标准差）
///
/// `counts` 为空或标准差为 0 时返回 `None`。
pub fn standard_deviations_away(count: usize, counts: &[usize]) -> Option<f32> {
    if counts.is_empty() {
        return None;
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    let variance = counts.iter().map(|&c| (c as f64 - mean).powi(2)).sum::<f64>() / n;
    let deviation = variance.sqrt();
    if deviation == 0. {
        return None;
    }
    Some(((count as f64 - mean) / deviation) as f32)
}

/// 使用更多特征点的查询描述符重新检查候选设计，选出唯一的最佳匹配
///
/// 最佳匹配初始为第一个候选（保留其粗搜索结果），之后只有精搜索匹配数量
/// 严格更多的候选才会取代它。置信度使用候选的**粗搜索**匹配数量分布计算。
///
/// # Arguments
///
/// * `query` - 精搜索使用的查询描述符
/// * `candidates` - 粗搜索得到的前 N 个候选，按匹配数量降序
/// * `corpus` - 描述符库
/// * `ratio` - 比率测试阈值
/// * `bounds` - 置信度区间
pub fn refine(
    query: &DescriptorSet,
    candidates: &[PotentialMatch],
    corpus: &Corpus,
    ratio: f32,
    bounds: &ConfidenceBounds,
) -> PotentialMatch {
    let candidates = candidates.iter().filter(|m| m.design_id.is_some()).collect::<Vec<_>>();
    let Some(&&first) = candidates.first() else {
        return PotentialMatch::default();
    };

    let mut best = first;
    let mut coarse_counts = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        coarse_counts.push(candidate.match_count());
        let Some(design) = candidate.design_id.and_then(|id| corpus.get(id)) else {
            continue;
        };
        let details = compare(query, design, ratio);
        if details.match_count > best.details.match_count {
            best.design_id = candidate.design_id;
            best.details = details;
        }
    }

    match standard_deviations_away(best.match_count(), &coarse_counts) {
        Some(std_away) => {
            best.std_away = std_away;
            best.confidence = bounds.confidence(std_away);
        }
        None => {
            debug!("候选匹配数量没有差异，置信度为 0");
            best.std_away = 0.;
            best.confidence = 0.;
        }
    }
    best
}
