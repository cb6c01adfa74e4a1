use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::refine::ConfidenceBounds;

static DATA_DIR: LazyLock<DataDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "design-match", "design-match").expect("failed to get project dir");
    DataDir { path: proj_dirs.data_dir().to_path_buf() }
});

fn default_data_dir() -> &'static str {
    DATA_DIR.path().to_str().expect("project dir is not valid utf-8")
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// 上传内容为预先计算好的 npy 描述符矩阵
    Npy,
    /// 使用 OpenCV SIFT 从图片中提取（需要 opencv 特性）
    Sift,
}

#[derive(Parser, Debug, Clone)]
pub struct ExtractOptions {
    /// 特征提取方式
    #[arg(long, value_enum, default_value_t = ExtractorKind::Npy)]
    pub extractor: ExtractorKind,
    /// 粗搜索时查询图片的最大特征点数量
    #[arg(long, value_name = "N", default_value_t = 80)]
    pub coarse_features: usize,
    /// 精搜索时查询图片的最大特征点数量
    #[arg(long, value_name = "N", default_value_t = 300)]
    pub refine_features: usize,
    /// 生成描述符库时每张设计图的最大特征点数量
    #[arg(long, value_name = "N", default_value_t = 3500)]
    pub generate_features: usize,
    /// SIFT 每组金字塔的层数
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub octaves: u32,
    /// SIFT 对比度阈值
    #[arg(long, value_name = "THRESHOLD", default_value_t = 0.04)]
    pub contrast_threshold: f32,
    /// SIFT 边缘阈值
    #[arg(long, value_name = "THRESHOLD", default_value_t = 10.)]
    pub edge_threshold: f32,
    /// SIFT 高斯模糊 sigma
    #[arg(long, value_name = "SIGMA", default_value_t = 3.)]
    pub sigma: f32,
}

#[derive(Parser, Debug, Clone)]
pub struct MatchOptions {
    /// 粗搜索后进入精搜索的候选数量
    #[arg(short = 'N', long, value_name = "COUNT", default_value_t = 80)]
    pub candidates: usize,
    /// 粗搜索比率测试阈值
    #[arg(long, value_name = "RATIO", default_value_t = 0.75)]
    pub ratio: f32,
    /// 精搜索比率测试阈值
    #[arg(long, value_name = "RATIO", default_value_t = 0.75)]
    pub refine_ratio: f32,
    /// 粗搜索工作线程数量，0 表示使用全部 CPU
    #[arg(short = 'j', long, value_name = "N", default_value_t = 0)]
    pub threads: usize,
    /// 不并行执行粗搜索
    #[arg(long)]
    pub single_threaded: bool,
    /// 置信度为 0 时偏离的标准差倍数
    #[arg(long, value_name = "STD", default_value_t = 1.0)]
    pub confidence_low: f32,
    /// 置信度为 1 时偏离的标准差倍数
    #[arg(long, value_name = "STD", default_value_t = 25.0)]
    pub confidence_high: f32,
}

impl MatchOptions {
    /// 实际使用的粗搜索线程数量
    pub fn threads(&self) -> usize {
        if self.single_threaded { 1 } else { self.threads }
    }

    pub fn confidence_bounds(&self) -> Result<ConfidenceBounds> {
        ConfidenceBounds::new(self.confidence_low, self.confidence_high)
    }

    /// 检查参数是否合法
    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [("ratio", self.ratio), ("refine-ratio", self.refine_ratio)] {
            if !(ratio > 0. && ratio <= 1.) {
                bail!("--{} 必须位于 (0, 1] 区间: {}", name, ratio);
            }
        }
        self.confidence_bounds()?;
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "design-match", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 数据目录，包含设计图、描述符库与元数据
    #[arg(short, long, default_value = default_data_dir())]
    pub data_dir: DataDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 为所有设计图生成描述符
    Generate(GenerateCommand),
    /// 查找与图片最匹配的设计
    Match(MatchCommand),
    /// 使用已标注的测试图片评估准确率
    Evaluate(EvaluateCommand),
    /// 启动 HTTP 匹配服务
    Serve(ServeCommand),
}

#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回设计原图目录
    pub fn designs(&self) -> PathBuf {
        self.path.join("designs")
    }

    /// 返回缩略图目录
    pub fn thumbnails(&self) -> PathBuf {
        self.path.join("thumbnails")
    }

    /// 返回描述符库目录，目录名包含生成参数
    pub fn descriptors(&self, opts: &ExtractOptions) -> PathBuf {
        self.path.join(format!("descriptors-{}-{}", opts.generate_features, opts.sigma))
    }

    /// 返回设计元数据文件路径
    pub fn metadata(&self) -> PathBuf {
        self.path.join("designs.json")
    }

    /// 返回测试图片目录，文件名即正确的设计 ID
    pub fn test_images(&self) -> PathBuf {
        self.path.join("test_images")
    }

    /// 检查数据目录是否存在
    pub fn check(&self) -> Result<()> {
        if !self.path.is_dir() {
            bail!("数据目录 {} 不存在", self.path.display());
        }
        Ok(())
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
