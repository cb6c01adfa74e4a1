use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::info;
use rayon::prelude::*;
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractOptions, Opts};
use crate::extract::{FeatureExtractor, create_extractor};
use crate::store::DescriptorStore;
use crate::utils::{design_id_from_path, has_suffix, pb_style_speed};

#[derive(Parser, Debug, Clone)]
pub struct GenerateCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg")]
    pub suffix: String,
    /// 重新生成已存在的描述符
    #[arg(long)]
    pub overwrite: bool,
}

impl SubCommandExtend for GenerateCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        opts.data_dir.check()?;
        let designs = opts.data_dir.designs();
        let store = DescriptorStore::new(opts.data_dir.descriptors(&self.extract));
        let extractor = create_extractor(&self.extract)?;

        let images = WalkDir::new(&designs)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_suffix(path, &self.suffix))
            .collect::<Vec<_>>();
        info!("在 {} 中找到 {} 张设计图", designs.display(), images.len());

        let max_features = self.extract.generate_features;
        let overwrite = self.overwrite;
        let (added, skipped, failed) = spawn_blocking(move || {
            generate(&images, &store, extractor.as_ref(), max_features, overwrite)
        })
        .await?;

        info!("描述符生成完成：新增 {added}，跳过 {skipped}，失败 {failed}");
        Ok(())
    }
}

/// 为每张设计图提取描述符并保存，返回 (新增, 跳过, 失败) 数量
fn generate(
    images: &[PathBuf],
    store: &DescriptorStore,
    extractor: &dyn FeatureExtractor,
    max_features: usize,
    overwrite: bool,
) -> (usize, usize, usize) {
    let pb = ProgressBar::new(images.len() as u64).with_style(pb_style_speed());
    let added = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    images.par_iter().progress_with(pb.clone()).for_each(|path| {
        let Some(id) = design_id_from_path(path) else {
            pb.println(format!("[SKIP] {}: 文件名不是设计 ID", path.display()));
            skipped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if !overwrite && store.exists(id) {
            skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let result = fs::read(path)
            .with_context(|| format!("无法读取 {}", path.display()))
            .and_then(|image| extractor.extract(&image, max_features))
            .and_then(|descriptors| store.save(id, &descriptors));
        match result {
            Ok(()) => {
                added.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                pb.println(format!("[ERR] {}: {:#}", path.display(), e));
                failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
    pb.finish_and_clear();

    (added.into_inner(), skipped.into_inner(), failed.into_inner())
}
