//! 补充检查：文件格式版本合规与文件位置检查（单线程遍历）
use anyhow::Result;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::walker::{enumerate_sorted, Extensions};

/// 版本问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionIssue {
    /// 声明的版本不满足要求前缀
    Outdated(String),
    /// 未找到版本声明
    Unknown,
    /// 读取失败（附错误文本）
    Unreadable(String),
}

impl fmt::Display for VersionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outdated(v) => write!(f, "Version {v}"),
            Self::Unknown => f.write_str("Version Unknown"),
            Self::Unreadable(e) => write!(f, "Error reading file: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityIssue {
    pub file: PathBuf,
    pub issue: VersionIssue,
}

/// 工程/硬件文件版本检查
#[derive(Debug, Clone)]
pub struct VersionCheck {
    pattern: Regex,
    required_prefix: String,
    extensions: Extensions,
}

impl VersionCheck {
    pub fn new(required_prefix: &str, extensions: Extensions) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r#"AutomationStudio Version="?([\d.]+)"#)?,
            required_prefix: required_prefix.to_string(),
            extensions,
        })
    }

    /// 单个文件的内容判定；合规返回 None
    pub fn inspect(&self, content: &str) -> Option<VersionIssue> {
        match self.pattern.captures(content).and_then(|c| c.get(1)) {
            Some(m) if m.as_str().starts_with(&self.required_prefix) => None,
            Some(m) => Some(VersionIssue::Outdated(m.as_str().to_string())),
            None => Some(VersionIssue::Unknown),
        }
    }

    /// 遍历 `root`，列出所有不合规文件（按发现顺序）
    pub fn run(&self, root: &Path) -> Vec<CompatibilityIssue> {
        enumerate_sorted(root, &self.extensions)
            .filter_map(|file| {
                let issue = match std::fs::read_to_string(&file) {
                    Ok(content) => self.inspect(&content)?,
                    Err(e) => VersionIssue::Unreadable(e.to_string()),
                };
                Some(CompatibilityIssue { file, issue })
            })
            .collect()
    }
}

/// 列出不在 `required_dir`（相对路径后缀）下的文件，按发现顺序
pub fn find_misplaced(root: &Path, extensions: &Extensions, required_dir: &Path) -> Vec<PathBuf> {
    enumerate_sorted(root, extensions)
        .filter(|file| !file.parent().is_some_and(|dir| dir.ends_with(required_dir)))
        .collect()
}
