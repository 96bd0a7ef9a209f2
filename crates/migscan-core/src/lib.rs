//! 工程迁移兼容性扫描核心库
//!
//! 设计要点：
//! - 规则表是外部 TOML 数据，启动时加载一次，之后只读并在线程间共享。
//! - 每个规则类别对应一次扫描请求：先枚举文件，再由 Rayon 线程池逐文件并行分析。
//! - 分析器是一组封闭的提取策略，分发器与进度、聚合逻辑只写一次。
//! - 单文件失败只计为软失败；报告按固定类别顺序确定性渲染，同时写入日志文件与控制台。

mod analyzers;
mod audit;
mod checks;
mod error;
mod options;
mod progress;
mod report;
mod rules;
mod scan;
mod types;
mod walker;

pub use analyzers::Analyzer;
pub use audit::{collect_results, run_audit, AuditSummary, ProjectRoot, REPORT_FILE_NAME};
pub use checks::{find_misplaced, CompatibilityIssue, VersionCheck, VersionIssue};
pub use error::{AnalyzeError, ConfigError};
pub use options::{ScanOptions, ScanStats};
pub use progress::{ConsoleProgress, NoProgress, Progress};
pub use report::{render, AuditResults, Category, ReportWriter};
pub use rules::{RuleBook, RuleEntry, RuleSet, RuleShape, BUILTIN_RULES};
pub use scan::dispatch;
pub use types::{Finding, ScanRequest, ScanResult};
pub use walker::{enumerate, enumerate_sorted, Extensions};
