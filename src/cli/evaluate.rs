use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressIterator};
use log::{info, warn};
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::{ExtractOptions, MatchOptions, Opts};
use crate::engine::MatchEngine;
use crate::utils::{design_id_from_path, has_suffix, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct EvaluateCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    #[command(flatten)]
    pub matching: MatchOptions,
    /// 测试图片目录，默认为数据目录下的 test_images
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg")]
    pub suffix: String,
    /// 最多评估的图片数量，0 表示不限制
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

/// 评估统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Evaluation {
    pub total: usize,
    pub correct: usize,
    pub elapsed: Duration,
    /// 正确匹配的 std_away
    pub correct_std_away: Vec<f32>,
    /// 错误匹配的 std_away
    pub incorrect_std_away: Vec<f32>,
}

impl Evaluation {
    /// 记录一次匹配结果
    pub fn record(&mut self, expected: usize, actual: Option<usize>, std_away: f32, elapsed: Duration) {
        self.total += 1;
        self.elapsed += elapsed;
        if actual == Some(expected) {
            self.correct += 1;
            self.correct_std_away.push(std_away);
        } else {
            self.incorrect_std_away.push(std_away);
        }
    }

    pub fn accuracy(&self) -> f32 {
        if self.total == 0 { 0. } else { self.correct as f32 / self.total as f32 }
    }

    pub fn average_time(&self) -> Duration {
        if self.total == 0 { Duration::ZERO } else { self.elapsed / self.total as u32 }
    }

    fn mean(values: &[f32]) -> Option<f32> {
        (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
    }

    pub fn mean_correct_std_away(&self) -> Option<f32> {
        Self::mean(&self.correct_std_away)
    }

    pub fn mean_incorrect_std_away(&self) -> Option<f32> {
        Self::mean(&self.incorrect_std_away)
    }
}

impl SubCommandExtend for EvaluateCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let dir = self.path.clone().unwrap_or_else(|| opts.data_dir.test_images());
        let mut images = WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_suffix(path, &self.suffix))
            .collect::<Vec<_>>();
        if self.limit > 0 {
            images.truncate(self.limit);
        }
        info!("在 {} 中找到 {} 张测试图片", dir.display(), images.len());

        let engine = open_engine(&opts.data_dir, &self.extract, &self.matching).await?;
        let evaluation = spawn_blocking(move || evaluate(&engine, &images)).await??;

        println!("images:\t{}", evaluation.total);
        println!("accuracy:\t{:.2}%", evaluation.accuracy() * 100.);
        println!("average time:\t{:.3}s", evaluation.average_time().as_secs_f32());
        if let Some(v) = evaluation.mean_correct_std_away() {
            println!("mean std_away (correct):\t{:.2}", v);
        }
        if let Some(v) = evaluation.mean_incorrect_std_away() {
            println!("mean std_away (incorrect):\t{:.2}", v);
        }
        Ok(())
    }
}

fn evaluate(engine: &MatchEngine, images: &[PathBuf]) -> Result<Evaluation> {
    let pb = ProgressBar::new(images.len() as u64).with_style(pb_style());
    let mut evaluation = Evaluation::default();

    for path in images.iter().progress_with(pb.clone()) {
        let Some(expected) = design_id_from_path(path) else {
            warn!("跳过 {}: 文件名不是设计 ID", path.display());
            continue;
        };
        let image = fs::read(path).with_context(|| format!("无法读取 {}", path.display()))?;
        let outcome = match engine.find_best_match(&image) {
            Ok(outcome) => outcome,
            Err(e) => {
                pb.println(format!("[ERR] {}: {:#}", path.display(), e));
                continue;
            }
        };
        let best = outcome.best;
        if best.design_id != Some(expected) {
            pb.println(format!(
                "[MISS] {}: 匹配到 {:?}，std_away {:.2}",
                path.display(),
                best.design_id,
                best.std_away
            ));
        }
        evaluation.record(expected, best.design_id, best.std_away, outcome.elapsed);
    }
    pb.finish_and_clear();

    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_and_std_away_split() {
        let mut evaluation = Evaluation::default();
        evaluation.record(1, Some(1), 4., Duration::from_millis(100));
        evaluation.record(2, Some(2), 6., Duration::from_millis(300));
        evaluation.record(3, Some(5), 1., Duration::from_millis(200));
        evaluation.record(4, None, 0., Duration::from_millis(200));

        assert_eq!(evaluation.total, 4);
        assert_eq!(evaluation.accuracy(), 0.5);
        assert_eq!(evaluation.average_time(), Duration::from_millis(200));
        assert_eq!(evaluation.mean_correct_std_away(), Some(5.));
        assert_eq!(evaluation.mean_incorrect_std_away(), Some(0.5));
    }

    #[test]
    fn empty_evaluation() {
        let evaluation = Evaluation::default();
        assert_eq!(evaluation.accuracy(), 0.);
        assert_eq!(evaluation.average_time(), Duration::ZERO);
        assert_eq!(evaluation.mean_correct_std_away(), None);
    }
}
