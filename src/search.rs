use std::cmp::Ordering;
use std::time::Instant;

use anyhow::Result;
use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::corpus::Corpus;
use crate::descriptor::DescriptorSet;
use crate::matcher::{MatchDetails, compare};

/// 一个候选匹配
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PotentialMatch {
    /// 设计 ID，`None` 表示没有匹配
    pub design_id: Option<usize>,
    pub details: MatchDetails,
    /// 匹配数量偏离候选均值的标准差倍数
    pub std_away: f32,
    /// 置信度，范围 [0, 1]
    pub confidence: f32,
}

impl Default for PotentialMatch {
    fn default() -> Self {
        Self { design_id: None, details: MatchDetails::default(), std_away: 0., confidence: 0. }
    }
}

impl PotentialMatch {
    pub fn new(design_id: usize, details: MatchDetails) -> Self {
        Self { design_id: Some(design_id), details, ..Default::default() }
    }

    pub fn match_count(&self) -> usize {
        self.details.match_count
    }

    /// 按匹配数量比较强弱，只看匹配数量
    pub fn cmp_strength(&self, other: &Self) -> Ordering {
        self.details.match_count.cmp(&other.details.match_count)
    }
}

/// 粗搜索：将查询描述符与描述符库中的每个设计逐一比较
pub struct CoarseSearch {
    pool: Option<ThreadPool>,
}

impl CoarseSearch {
    /// 创建粗搜索
    ///
    /// # Arguments
    ///
    /// * `threads` - 工作线程数量，0 表示使用全部 CPU，1 表示单线程
    pub fn new(threads: usize) -> Result<Self> {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        if threads == 1 {
            return Ok(Self::single_threaded());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("coarse-search-{i}"))
            .build()?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn single_threaded() -> Self {
        Self { pool: None }
    }

    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(1, ThreadPool::current_num_threads)
    }

    /// 在描述符库中搜索，返回每个设计的匹配结果，按匹配数量降序排列
    ///
    /// 匹配数量相同时按设计 ID 升序。描述符为空的设计不参与比较，
    /// 其结果保持为 [`PotentialMatch::default`]。
    pub fn search(&self, query: &DescriptorSet, corpus: &Corpus, ratio: f32) -> Vec<PotentialMatch> {
        let start = Instant::now();

        let score = |(id, candidate): (usize, &DescriptorSet)| {
            if candidate.is_empty() {
                return PotentialMatch::default();
            }
            PotentialMatch::new(id, compare(query, candidate, ratio))
        };

        // 每个任务只写入属于自己下标的结果
        let mut results: Vec<PotentialMatch> = match &self.pool {
            Some(pool) => {
                let designs = corpus.iter().collect::<Vec<_>>();
                pool.install(|| designs.into_par_iter().map(score).collect())
            }
            None => corpus.iter().map(score).collect(),
        };

        debug!(
            "compared {} designs in {:.3}s with {} threads",
            corpus.len(),
            start.elapsed().as_secs_f32(),
            self.threads()
        );

        // 稳定排序，保证同分时按 ID 升序
        results.sort_by(|a, b| b.cmp_strength(a));
        results
    }
}
