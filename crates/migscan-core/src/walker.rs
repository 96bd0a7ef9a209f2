//! 文件遍历：按扩展名（不区分大小写）递归枚举
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 扩展名集合；统一为小写并带前导点（"pkg" 与 ".PKG" 等价）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extensions(Vec<String>);

impl Extensions {
    pub fn new<I, S>(exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let v = exts
            .into_iter()
            .map(|e| {
                let e = e.as_ref().trim_start_matches('*').to_lowercase();
                if e.starts_with('.') { e } else { format!(".{e}") }
            })
            .collect();
        Self(v)
    }

    /// 文件名（小写）的后缀是否命中任一扩展名
    pub fn matches(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|s| s.to_str()) {
            Some(s) => s.to_lowercase(),
            None => return false,
        };
        self.0.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

/// 递归枚举 `root` 下扩展名命中的文件
/// - 无法读取的子目录（权限等）被跳过，不中断整个遍历
/// - 遍历顺序取决于文件系统，下游不得依赖
pub fn enumerate<'a>(root: &Path, exts: &'a Extensions) -> impl Iterator<Item = PathBuf> + 'a {
    walk(WalkDir::new(root), exts)
}

/// 同 [`enumerate`]，但同一目录内按文件名排序，使发现顺序可复现
pub fn enumerate_sorted<'a>(root: &Path, exts: &'a Extensions) -> impl Iterator<Item = PathBuf> + 'a {
    walk(WalkDir::new(root).sort_by_file_name(), exts)
}

fn walk(walker: WalkDir, exts: &Extensions) -> impl Iterator<Item = PathBuf> + '_ {
    walker
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                debug!(path = ?err.path(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(move |p| exts.matches(p))
}
