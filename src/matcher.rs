use serde::Serialize;

use crate::descriptor::DescriptorSet;

/// 一次两两比较的匹配统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchDetails {
    /// 通过比率测试和歧义过滤的匹配数量
    pub match_count: usize,
    /// 所有匹配的最近邻距离之和
    pub total_distance: f32,
    /// 平均距离，没有匹配时为 `f32::INFINITY`
    pub average_distance: f32,
}

impl Default for MatchDetails {
    fn default() -> Self {
        Self { match_count: 0, total_distance: 0., average_distance: f32::INFINITY }
    }
}

impl MatchDetails {
    fn from_distances(distances: impl Iterator<Item = f32>) -> Self {
        let mut details = Self::default();
        for distance in distances {
            details.match_count += 1;
            details.total_distance += distance;
        }
        if details.match_count > 0 {
            details.average_distance = details.total_distance / details.match_count as f32;
        }
        details
    }

    /// 平均距离，没有匹配时返回 `None`
    pub fn average(&self) -> Option<f32> {
        (self.match_count > 0).then_some(self.average_distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

#[inline(always)]
fn l2_squared(va: &[f32], vb: &[f32]) -> f32 {
    va.iter().zip(vb).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// 在候选集合中查找与 `query` 最近的两个描述符
///
/// 距离相同时保留下标较小的一个，候选不足两个时返回 `None`。
pub fn knn2(query: &[f32], candidate: &DescriptorSet) -> Option<(Neighbor, Neighbor)> {
    if candidate.len() < 2 {
        return None;
    }
    let mut best = (usize::MAX, f32::INFINITY);
    let mut second = (usize::MAX, f32::INFINITY);
    for (i, line) in candidate.iter_lines().enumerate() {
        let d = l2_squared(query, line);
        if d < best.1 {
            second = best;
            best = (i, d);
        } else if d < second.1 {
            second = (i, d);
        }
    }
    Some((
        Neighbor { index: best.0, distance: best.1.sqrt() },
        Neighbor { index: second.0, distance: second.1.sqrt() },
    ))
}

/// 比率测试：最近距离与次近距离之比不超过阈值时接受
///
/// 两者都为 0 时无法区分，视为歧义匹配。
#[inline]
fn passes_ratio(nearest: f32, second: f32, ratio: f32) -> bool {
    if second <= 0. {
        return false;
    }
    nearest / second <= ratio
}

/// 比较查询图片与候选设计的描述符，返回匹配统计
///
/// 对每个查询描述符找到候选中最近的两个描述符并执行比率测试。
/// 通过测试的匹配中，若多个查询描述符指向同一个候选描述符，
/// 则这些匹配**全部**丢弃，而不是只保留其中一个。
///
/// 结果不对称：`compare(a, b)` 与 `compare(b, a)` 一般不相等。
///
/// # Panics
///
/// 两个集合都非空且维度不同时 panic。
pub fn compare(query: &DescriptorSet, candidate: &DescriptorSet, ratio: f32) -> MatchDetails {
    if query.is_empty() || candidate.len() < 2 {
        return MatchDetails::default();
    }
    assert_eq!(query.dim(), candidate.dim(), "descriptor dimensionality mismatch");

    let good = query
        .iter_lines()
        .filter_map(|line| knn2(line, candidate))
        .filter(|(m, n)| passes_ratio(m.distance, n.distance, ratio))
        .map(|(m, _)| m)
        .collect::<Vec<_>>();

    let mut hits = vec![0u32; candidate.len()];
    for m in &good {
        hits[m.index] += 1;
    }

    MatchDetails::from_distances(
        good.iter().filter(|m| hits[m.index] <= 1).map(|m| m.distance),
    )
}
