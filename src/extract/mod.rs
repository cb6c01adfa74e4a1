//! 特征提取接口
//!
//! 匹配引擎只依赖 [`FeatureExtractor`]，具体如何从图片得到描述符由实现决定。

#[cfg(feature = "opencv")]
mod sift;

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::Array2;
use ndarray_npy::ReadNpyExt;

use crate::config::{ExtractOptions, ExtractorKind};
use crate::descriptor::DescriptorSet;
#[cfg(feature = "opencv")]
pub use self::sift::SiftExtractor;

/// 从图片数据中提取描述符
pub trait FeatureExtractor: Send + Sync {
    /// 提取最多 `max_features` 个描述符
    fn extract(&self, image: &[u8], max_features: usize) -> Result<DescriptorSet>;
}

/// 读取预先计算好的描述符，输入为 `f32` 类型的 `.npy` 二维数组
///
/// 特征点数量上限通过只保留前 `max_features` 行实现，
/// 因此输入应当按特征点响应强度降序排列。
#[derive(Debug, Default, Clone, Copy)]
pub struct NpyExtractor;

impl FeatureExtractor for NpyExtractor {
    fn extract(&self, image: &[u8], max_features: usize) -> Result<DescriptorSet> {
        let array = Array2::<f32>::read_npy(Cursor::new(image)).context("无法读取 npy 描述符")?;
        let mut set = DescriptorSet::from_array(&array);
        set.truncate(max_features);
        Ok(set)
    }
}

/// 根据配置创建特征提取器
pub fn create_extractor(opts: &ExtractOptions) -> Result<Arc<dyn FeatureExtractor>> {
    match opts.extractor {
        ExtractorKind::Npy => Ok(Arc::new(NpyExtractor)),
        #[cfg(feature = "opencv")]
        ExtractorKind::Sift => Ok(Arc::new(SiftExtractor::from(opts))),
        #[cfg(not(feature = "opencv"))]
        ExtractorKind::Sift => Err(anyhow::anyhow!("SIFT 特征提取需要启用 opencv 特性")),
    }
}
