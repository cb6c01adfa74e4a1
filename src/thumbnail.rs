use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use base64::prelude::*;

/// 编码后的缩略图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// base64 编码的图片文件内容
    pub data: String,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    /// 从图片文件内容构造缩略图，尺寸从图片文件头中读取
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let size = imagesize::blob_size(bytes).map_err(|e| anyhow!("无法识别图片尺寸: {e:?}"))?;
        Ok(Self {
            data: BASE64_STANDARD.encode(bytes),
            width: size.width as u32,
            height: size.height as u32,
        })
    }
}

/// 设计缩略图目录，文件名为 `<id>.<ext>`
#[derive(Debug, Clone)]
pub struct ThumbnailStore {
    dir: PathBuf,
    ext: String,
}

impl ThumbnailStore {
    pub fn new<P: AsRef<Path>>(dir: P, ext: &str) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), ext: ext.trim_start_matches('.').to_string() }
    }

    pub fn path(&self, id: usize) -> PathBuf {
        self.dir.join(format!("{}.{}", id, self.ext))
    }

    /// 读取并编码设计缩略图
    pub fn load(&self, id: usize) -> Result<Thumbnail> {
        let path = self.path(id);
        let bytes = fs::read(&path).with_context(|| format!("无法读取缩略图 {}", path.display()))?;
        Thumbnail::from_bytes(&bytes).with_context(|| format!("无效的缩略图 {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    /// 1x1 像素的 PNG
    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
        0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn load_png_thumbnail() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("5.png"), PNG_1X1).unwrap();

        let store = ThumbnailStore::new(dir.path(), ".png");
        let thumb = store.load(5).unwrap();
        assert_eq!((thumb.width, thumb.height), (1, 1));
        assert_eq!(BASE64_STANDARD.decode(&thumb.data).unwrap(), PNG_1X1);
    }

    #[test]
    fn missing_or_invalid_thumbnail() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2.jpg"), b"plain text").unwrap();

        let store = ThumbnailStore::new(dir.path(), "jpg");
        assert!(store.load(1).is_err());
        assert!(store.load(2).is_err());
    }
}
