mod evaluate;
mod generate;
mod r#match;
pub mod serve;

use std::sync::Arc;

use anyhow::Result;
pub use evaluate::*;
pub use generate::*;
pub use r#match::*;
pub use serve::*;
use tokio::task::spawn_blocking;

use crate::config::{DataDir, ExtractOptions, MatchOptions, Opts};
use crate::engine::{MatchEngine, MatchParams};
use crate::extract::create_extractor;
use crate::search::CoarseSearch;
use crate::store::DescriptorStore;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 加载描述符库并创建匹配引擎
///
/// 描述符库加载完成之前不会返回。
pub async fn open_engine(
    data_dir: &DataDir,
    extract: &ExtractOptions,
    matching: &MatchOptions,
) -> Result<MatchEngine> {
    data_dir.check()?;
    let params = MatchParams::from_options(extract, matching)?;
    let extractor = create_extractor(extract)?;
    let search = CoarseSearch::new(matching.threads())?;

    let store = DescriptorStore::new(data_dir.descriptors(extract));
    let corpus = spawn_blocking(move || store.load()).await??;

    Ok(MatchEngine::new(Arc::new(corpus), extractor, search, params))
}
