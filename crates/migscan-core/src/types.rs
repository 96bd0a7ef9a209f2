//! 公共类型（对外暴露）
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::analyzers::Analyzer;
use crate::options::ScanStats;
use crate::rules::RuleSet;
use crate::walker::Extensions;

/// 单次命中：由一个分析器在一个文件上产生，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Finding {
    /// 命中的规则标识（库名、功能块名、函数名或硬件型号）
    pub token: String,
    /// 规则给出的原因
    pub reason: String,
    /// 来源文件
    pub file: PathBuf,
    /// 附加上下文（依赖命中时为所属库名）
    pub context: Option<String>,
}

impl Finding {
    pub fn new(token: impl Into<String>, reason: impl Into<String>, file: &Path) -> Self {
        Self {
            token: token.into(),
            reason: reason.into(),
            file: file.to_path_buf(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// 报告使用的确定性排序：token → reason → 文件路径 → 上下文
pub(crate) fn cmp_findings(a: &Finding, b: &Finding) -> Ordering {
    a.token
        .cmp(&b.token)
        .then_with(|| a.reason.cmp(&b.reason))
        .then_with(|| a.file.cmp(&b.file))
        .then_with(|| a.context.cmp(&b.context))
}

/// 单个规则类别的扫描请求（构造后不可变）
#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    pub root: &'a Path,
    pub extensions: &'a Extensions,
    pub analyzer: &'a Analyzer,
    pub rules: &'a RuleSet,
}

/// 一次分发的结果。`findings` 按任务完成顺序排列，而非遍历顺序；
/// 需要确定性输出的阶段必须自行排序。
#[derive(Debug, Default, Clone)]
pub struct ScanResult {
    pub findings: Vec<Finding>,
    pub stats: ScanStats,
}
