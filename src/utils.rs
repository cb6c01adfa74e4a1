use std::path::Path;

use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
        .expect("failed to build progress style")
}

pub fn pb_style_speed() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} ({per_sec}) {msg}")
        .expect("failed to build progress style")
}

/// 从文件名中解析设计 ID，例如 `designs/42.jpg` -> 42
pub fn design_id_from_path(path: &Path) -> Option<usize> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// 根据逗号分隔的后缀列表判断文件是否需要处理，不区分大小写
pub fn has_suffix(path: &Path, suffixes: &str) -> bool {
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
        return false;
    };
    suffixes.split(',').map(str::trim).any(|suf| suf.eq_ignore_ascii_case(ext))
}
