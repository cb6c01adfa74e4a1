use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use rayon::prelude::*;
use regex::Regex;

use crate::corpus::Corpus;
use crate::descriptor::DescriptorSet;
use crate::utils::pb_style;

static DESCRIPTOR_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.npy$").expect("failed to build regex"));

/// 磁盘上的描述符库，每个设计一个 `<id>.npy` 文件
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dir: PathBuf,
}

impl DescriptorStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 返回设计描述符文件的路径
    pub fn path(&self, id: usize) -> PathBuf {
        self.dir.join(format!("{id}.npy"))
    }

    pub fn exists(&self, id: usize) -> bool {
        self.path(id).exists()
    }

    /// 保存设计的描述符
    ///
    /// 先写入临时文件再重命名，中途失败不会留下损坏的描述符文件。
    pub fn save(&self, id: usize, descriptors: &DescriptorSet) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(id);
        let tmp_file = self.dir.join(format!("{id}.npy.tmp"));
        write_npy(&tmp_file, &descriptors.to_array())
            .with_context(|| format!("无法写入 {}", tmp_file.display()))?;
        fs::rename(&tmp_file, &path)?;
        Ok(())
    }

    /// 读取单个设计的描述符
    pub fn read(&self, id: usize) -> Result<DescriptorSet> {
        let path = self.path(id);
        let array: Array2<f32> =
            read_npy(&path).with_context(|| format!("无法读取 {}", path.display()))?;
        Ok(DescriptorSet::from_array(&array))
    }

    /// 列出目录中所有设计 ID，并检查 ID 是否从 0 开始连续
    pub fn ids(&self) -> Result<Vec<usize>> {
        if !self.dir.is_dir() {
            bail!("描述符目录 {} 不存在", self.dir.display());
        }

        let mut ids = vec![];
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".tmp") {
                warn!("忽略未完成的描述符文件 {}", name);
                continue;
            }
            let id = DESCRIPTOR_FILE
                .captures(&name)
                .and_then(|caps| caps[1].parse::<usize>().ok())
                .with_context(|| format!("无效的描述符文件名: {}", name))?;
            ids.push(id);
        }

        ids.sort_unstable();
        for (expected, &id) in ids.iter().enumerate() {
            if id != expected {
                if expected > 0 && id == ids[expected - 1] {
                    bail!("设计 {} 存在多个描述符文件", id);
                }
                bail!("描述符编号不连续：缺少设计 {}", expected);
            }
        }
        Ok(ids)
    }

    /// 加载完整的描述符库
    ///
    /// 大型描述符库可能需要数十秒，应当在开始提供服务之前完成。
    pub fn load(&self) -> Result<Corpus> {
        let start = Instant::now();
        let ids = self.ids()?;
        if ids.is_empty() {
            warn!("描述符目录 {} 为空", self.dir.display());
        }

        info!("正在加载 {} 个设计的描述符: {}", ids.len(), self.dir.display());
        let pb = ProgressBar::new(ids.len() as u64).with_style(pb_style());
        let designs = ids
            .par_iter()
            .progress_with(pb.clone())
            .map(|&id| self.read(id))
            .collect::<Result<Vec<_>>>()?;
        pb.finish_and_clear();

        let corpus = Corpus::new(designs)?;
        info!(
            "描述符加载完成：{} 个设计，{} 个描述符，耗时 {:.1}s",
            corpus.len(),
            corpus.total_descriptors(),
            start.elapsed().as_secs_f32()
        );
        Ok(corpus)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn set(rows: usize) -> DescriptorSet {
        DescriptorSet::from_vec(4, (0..rows * 4).map(|x| x as f32).collect()).unwrap()
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = DescriptorStore::new(dir.path());
        store.save(0, &set(3)).unwrap();
        store.save(1, &DescriptorSet::default()).unwrap();
        store.save(2, &set(5)).unwrap();

        let corpus = store.load().unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.get(0), Some(&set(3)));
        assert!(corpus.get(1).unwrap().is_empty());
        assert_eq!(corpus.get(2).unwrap().len(), 5);
        assert_eq!(corpus.dim(), Some(4));
    }

    #[test]
    fn gap_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = DescriptorStore::new(dir.path());
        store.save(0, &set(2)).unwrap();
        store.save(2, &set(2)).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("缺少设计 1"));
    }

    #[test]
    fn non_numeric_name_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = DescriptorStore::new(dir.path());
        store.save(0, &set(2)).unwrap();
        fs::write(dir.path().join("cover.npy"), b"").unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("cover.npy"));
    }

    #[test]
    fn duplicate_id_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = DescriptorStore::new(dir.path());
        store.save(0, &set(2)).unwrap();
        store.save(1, &set(2)).unwrap();
        fs::copy(store.path(1), dir.path().join("01.npy")).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("多个描述符文件"));
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = DescriptorStore::new(dir.path().join("nope"));
        assert!(store.load().is_err());
    }
}
