//! 扫描选项与统计信息（模块）
use std::path::PathBuf;

/// 扫描选项
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
    /// 规则文件路径（TOML）；为空则使用内置规则表
    pub rules_path: Option<PathBuf>,
    /// 是否在终端显示单行进度
    pub show_progress: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threads: None,
            rules_path: None,
            show_progress: true,
        }
    }
}

impl ScanOptions {
    /// 实际使用的工作线程数（至少为 1）
    pub fn worker_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// 单次分发的统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    /// 枚举到的候选文件数（进度分母）
    pub files_total: usize,
    /// 成功分析的文件数
    pub files_scanned: usize,
    /// 软失败（读取/解码失败）的文件数
    pub soft_failures: usize,
    /// 收集到的命中数
    pub findings: usize,
}

impl ScanStats {
    pub(crate) fn merge(&mut self, other: &ScanStats) {
        self.files_total += other.files_total;
        self.files_scanned += other.files_scanned;
        self.soft_failures += other.soft_failures;
        self.findings += other.findings;
    }
}
