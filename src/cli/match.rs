use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::task::spawn_blocking;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::{ExtractOptions, MatchOptions, Opts};
use crate::search::PotentialMatch;

#[derive(Parser, Debug, Clone)]
pub struct MatchCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    #[command(flatten)]
    pub matching: MatchOptions,
    /// 待匹配的图片路径
    pub image: PathBuf,
    /// 输出粗搜索的前 N 个候选，而不是精搜索后的唯一结果
    #[arg(long)]
    pub coarse: bool,
    /// 输出格式
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for MatchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let image =
            fs::read(&self.image).with_context(|| format!("无法读取 {}", self.image.display()))?;
        let engine = open_engine(&opts.data_dir, &self.extract, &self.matching).await?;

        let coarse = self.coarse;
        let result = spawn_blocking(move || -> Result<Vec<PotentialMatch>> {
            if coarse {
                engine.find_best_matches(&image)
            } else {
                Ok(vec![engine.find_best_match(&image)?.best])
            }
        })
        .await??;

        print_result(&result, self.output_format)
    }
}

fn print_result(result: &[PotentialMatch], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for m in result {
                let id = m.design_id.map_or_else(|| "-".to_string(), |id| id.to_string());
                println!("{}\t{}\t{:.3}\t{:.2}", id, m.match_count(), m.confidence, m.std_away);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
