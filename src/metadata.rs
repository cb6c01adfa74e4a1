use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

/// 设计的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignInfo {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub artist_url: String,
    #[serde(default)]
    pub title: String,
    /// 设计上架日期
    #[serde(default)]
    pub added: String,
}

/// 设计 ID 到元数据的映射，启动时从 JSON 文件加载
#[derive(Debug, Default)]
pub struct MetadataStore {
    designs: HashMap<usize, DesignInfo>,
}

impl MetadataStore {
    /// 从 JSON 文件加载，格式为 `{"<id>": {"artist": ..., "title": ...}}`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data =
            fs::read(path).with_context(|| format!("无法读取元数据文件 {}", path.display()))?;
        let designs: HashMap<usize, DesignInfo> = serde_json::from_slice(&data)
            .with_context(|| format!("元数据文件格式错误: {}", path.display()))?;
        info!("已加载 {} 个设计的元数据", designs.len());
        Ok(Self { designs })
    }

    pub fn from_map(designs: HashMap<usize, DesignInfo>) -> Self {
        Self { designs }
    }

    /// 查询设计元数据，未知设计返回空的元数据
    pub fn lookup(&self, id: usize) -> DesignInfo {
        self.designs.get(&id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }
}
