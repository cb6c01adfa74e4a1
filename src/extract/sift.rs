use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use anyhow::{Result, bail};
use opencv::core::{KeyPoint, Mat, Ptr, Vector};
use opencv::features2d::SIFT;
use opencv::imgcodecs;
use opencv::prelude::*;

use super::FeatureExtractor;
use crate::config::ExtractOptions;
use crate::descriptor::DescriptorSet;

thread_local! {
    // OpenCV 的检测器不能跨线程共享，每个线程按特征点数量各缓存一份
    static SIFT_CACHE: RefCell<HashMap<usize, Ptr<SIFT>>> = RefCell::new(HashMap::new());
}

/// 使用 OpenCV SIFT 提取描述符
#[derive(Debug, Clone)]
pub struct SiftExtractor {
    octaves: i32,
    contrast_threshold: f64,
    edge_threshold: f64,
    sigma: f64,
}

impl From<&ExtractOptions> for SiftExtractor {
    fn from(opts: &ExtractOptions) -> Self {
        Self {
            octaves: opts.octaves as i32,
            contrast_threshold: opts.contrast_threshold as f64,
            edge_threshold: opts.edge_threshold as f64,
            sigma: opts.sigma as f64,
        }
    }
}

impl FeatureExtractor for SiftExtractor {
    fn extract(&self, image: &[u8], max_features: usize) -> Result<DescriptorSet> {
        let buf = Mat::from_slice(image)?;
        let img = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_GRAYSCALE)?;
        if img.empty() {
            bail!("无法解码图片");
        }

        SIFT_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            let sift = match cache.entry(max_features) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(SIFT::create(
                    max_features as i32,
                    self.octaves,
                    self.contrast_threshold,
                    self.edge_threshold,
                    self.sigma,
                    false,
                )?),
            };
            let mask = Mat::default();
            let mut keypoints = Vector::<KeyPoint>::new();
            let mut descriptors = Mat::default();
            sift.detect_and_compute(&img, &mask, &mut keypoints, &mut descriptors, false)?;
            mat_to_descriptors(&descriptors)
        })
    }
}

fn mat_to_descriptors(mat: &Mat) -> Result<DescriptorSet> {
    if mat.rows() == 0 {
        return Ok(DescriptorSet::default());
    }
    let data = mat.data_typed::<f32>()?.to_vec();
    DescriptorSet::from_vec(mat.cols() as usize, data)
}
