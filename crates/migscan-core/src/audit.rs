//! 编排：校验工程目录 → 按类别依次分发扫描 → 补充检查 → 渲染并双路输出报告
use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::analyzers::Analyzer;
use crate::checks::{find_misplaced, VersionCheck};
use crate::error::ConfigError;
use crate::options::{ScanOptions, ScanStats};
use crate::progress::Progress;
use crate::report::{affected_files, render, AuditResults, Category, ReportWriter};
use crate::rules::{RuleBook, RuleSet};
use crate::scan::dispatch;
use crate::types::ScanRequest;
use crate::walker::Extensions;

/// 报告文件名（写在工程根目录下）
pub const REPORT_FILE_NAME: &str = "AS6_migration_result.txt";

const LOGICAL: &str = "Logical";
const LIBRARIES: &str = "Libraries";
const PHYSICAL: &str = "Physical";

const START_BANNER: &str = "Scanning started... Please wait while the tool analyzes your project files.";

/// 已校验的工程根目录
#[derive(Debug, Clone)]
pub struct ProjectRoot {
    path: PathBuf,
    project_file: PathBuf,
}

impl ProjectRoot {
    /// 目录必须存在，且顶层含有 `.apj` 工程文件（按文件名取第一个）
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(ConfigError::NotADirectory(path.to_path_buf()));
        }
        let apj = Extensions::new([".apj"]);
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(|_| ConfigError::MissingProjectFile(path.to_path_buf()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && apj.matches(p))
            .collect();
        candidates.sort();
        match candidates.into_iter().next() {
            Some(project_file) => Ok(Self { path: path.to_path_buf(), project_file }),
            None => Err(ConfigError::MissingProjectFile(path.to_path_buf())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_file(&self) -> &Path {
        &self.project_file
    }

    pub fn report_path(&self) -> PathBuf {
        self.path.join(REPORT_FILE_NAME)
    }
}

/// 一次运行的摘要（便于 CLI 打印）
#[derive(Debug, Clone, Default)]
pub struct AuditSummary {
    pub stats: ScanStats,
    pub compatibility_issues: usize,
    pub misplaced_files: usize,
    pub elapsed: Duration,
}

/// 单个类别的扫描计划
struct CategoryScan<'a> {
    category: Category,
    root: PathBuf,
    extensions: Extensions,
    analyzer: Analyzer,
    rules: &'a RuleSet,
}

fn plan<'a>(root: &Path, rules: &'a RuleBook) -> Result<Vec<CategoryScan<'a>>> {
    let logical = root.join(LOGICAL);
    let libraries = logical.join(LIBRARIES);
    let physical = root.join(PHYSICAL);

    let scan = |category, root: &Path, exts: &[&str], analyzer, rules| CategoryScan {
        category,
        root: root.to_path_buf(),
        extensions: Extensions::new(exts),
        analyzer,
        rules,
    };

    Ok(vec![
        scan(Category::Hardware, &physical, &[".hw"], Analyzer::attribute_membership("Module", "Type")?, &rules.hardware),
        scan(Category::Libraries, &libraries, &[".pkg"], Analyzer::element_value()?, &rules.libraries),
        scan(Category::Dependencies, &libraries, &[".lby"], Analyzer::dependency("Dependency", "ObjectName")?, &rules.libraries),
        scan(Category::FunctionBlocks, &logical, &[".var", ".typ"], Analyzer::declaration()?, &rules.function_blocks),
        scan(Category::Functions, &logical, &[".st", ".c", ".cpp"], Analyzer::word_boundary(), &rules.functions),
        scan(Category::DeprecatedString, &logical, &[".st"], Analyzer::word_boundary(), &rules.deprecated_string),
        scan(Category::DeprecatedMath, &logical, &[".st"], Analyzer::call_site(), &rules.deprecated_math),
        scan(Category::Reinstall, &libraries, &[".pkg"], Analyzer::element_value()?, &rules.reinstall_libraries),
    ])
}

/// 执行全部类别扫描与补充检查，返回渲染所需结果（不产生报告输出）
pub fn collect_results(
    project: &ProjectRoot,
    rules: &RuleBook,
    opts: &ScanOptions,
    progress: &mut dyn Progress,
) -> Result<(AuditResults, ScanStats)> {
    let root = project.path();
    let mut results = AuditResults { required_version: rules.required_version.clone(), ..Default::default() };
    let mut stats = ScanStats::default();

    // 类别之间顺序执行；每个类别内部并行
    for cat in plan(root, rules)? {
        if cat.rules.is_empty() {
            debug!(category = cat.category.label(), "no rules configured, skipping");
            results.findings.insert(cat.category, Vec::new());
            continue;
        }
        let req = ScanRequest { root: &cat.root, extensions: &cat.extensions, analyzer: &cat.analyzer, rules: cat.rules };
        let res = dispatch(&req, opts, cat.category.label(), progress)?;
        stats.merge(&res.stats);
        results.findings.insert(cat.category, res.findings);
    }

    results.compatibility = VersionCheck::new(&rules.required_version, Extensions::new([".apj", ".hw"]))?.run(root);
    let required_dir = Path::new("Connectivity").join("OpcUA");
    results.misplaced = find_misplaced(&root.join(PHYSICAL), &Extensions::new([".uad"]), &required_dir);

    Ok((results, stats))
}

/// 完整运行并输出报告
///
/// 渲染阶段的内部错误会作为 `[ERROR]` 行追加到报告（日志逐行 flush，已写内容不受影响），
/// 然后原样返回给调用方。
pub fn run_audit<L: Write, C: Write>(
    project: &ProjectRoot,
    rules: &RuleBook,
    opts: &ScanOptions,
    progress: &mut dyn Progress,
    out: &mut ReportWriter<L, C>,
) -> Result<AuditSummary> {
    let started = Instant::now();
    out.emit(START_BANNER)?;

    match audit_body(project, rules, opts, progress, out, started) {
        Ok(summary) => Ok(summary),
        Err(err) => {
            error!(error = %format!("{err:#}"), "audit failed");
            let _ = out.emit("");
            let _ = out.emit(&format!("[ERROR] An unexpected error occurred: {err:#}"));
            Err(err)
        }
    }
}

fn audit_body<L: Write, C: Write>(
    project: &ProjectRoot,
    rules: &RuleBook,
    opts: &ScanOptions,
    progress: &mut dyn Progress,
    out: &mut ReportWriter<L, C>,
    started: Instant,
) -> Result<AuditSummary> {
    let (results, stats) = collect_results(project, rules, opts, progress)?;

    for category in [Category::DeprecatedString, Category::DeprecatedMath] {
        for file in affected_files(results.category(category)) {
            debug!(category = category.label(), file = %file.display(), "deprecated functions used");
        }
    }

    out.emit_all(render(&results))?;

    let elapsed = started.elapsed();
    out.emit_all(["", ""])?;
    out.emit(&format!("Scanning completed successfully in {:.2} seconds.", elapsed.as_secs_f64()))?;

    info!(
        files = stats.files_total,
        findings = stats.findings,
        soft_failures = stats.soft_failures,
        "audit finished"
    );
    Ok(AuditSummary {
        stats,
        compatibility_issues: results.compatibility.len(),
        misplaced_files: results.misplaced.len(),
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use std::io;

    /// 控制台在写完 `lines_left` 行之后开始报错
    struct FailingConsole {
        lines_left: usize,
    }

    impl Write for FailingConsole {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.lines_left == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "console closed"));
            }
            let lines = buf.iter().filter(|&&b| b == b'\n').count();
            self.lines_left = self.lines_left.saturating_sub(lines);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn project(dir: &Path) -> ProjectRoot {
        fs::write(dir.join("Project.apj"), r#"<?AutomationStudio Version="4.12.5.95"?><Project />"#).unwrap();
        ProjectRoot::open(dir).unwrap()
    }

    #[test]
    fn test_open_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(ProjectRoot::open(&missing), Err(ConfigError::NotFound(_))));

        let file = dir.path().join("file.txt");
        fs::write(&file, "").unwrap();
        assert!(matches!(ProjectRoot::open(&file), Err(ConfigError::NotADirectory(_))));
    }

    #[test]
    fn test_open_requires_project_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Logical")).unwrap();
        fs::write(dir.path().join("Logical/Nested.apj"), "").unwrap();
        assert!(matches!(ProjectRoot::open(dir.path()), Err(ConfigError::MissingProjectFile(_))));

        fs::write(dir.path().join("B.apj"), "").unwrap();
        fs::write(dir.path().join("A.APJ"), "").unwrap();
        let project = ProjectRoot::open(dir.path()).unwrap();
        assert_eq!(project.project_file(), dir.path().join("A.APJ"));
        assert_eq!(project.report_path(), dir.path().join(REPORT_FILE_NAME));
    }

    #[test]
    fn test_run_audit_appends_error_line_and_keeps_flushed_log() {
        let dir = tempfile::tempdir().unwrap();
        let root = project(dir.path());
        let rules = RuleBook::from_toml_str("").unwrap();
        let opts = ScanOptions { threads: Some(1), show_progress: false, ..ScanOptions::default() };
        let mut out = ReportWriter::new(Vec::<u8>::new(), FailingConsole { lines_left: 1 });

        let err = run_audit(&root, &rules, &opts, &mut NoProgress, &mut out).unwrap_err();
        assert!(format!("{err:#}").contains("console closed"));

        let (log, _) = out.into_parts();
        let log = String::from_utf8(log).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.first(), Some(&START_BANNER));
        assert_eq!(lines.last(), Some(&"[ERROR] An unexpected error occurred: console closed"));
        assert!(!log.contains("Scanning completed successfully"));
    }

    #[test]
    fn test_run_audit_summary_counts_supplementary_checks() {
        let dir = tempfile::tempdir().unwrap();
        let root = project(dir.path());
        let config = dir.path().join("Physical/Config1");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("Hardware.hw"), r#"<?AutomationStudio Version="4.9"?><Hardware />"#).unwrap();
        fs::write(config.join("Map.uad"), "<OpcUaSource />").unwrap();

        let rules = RuleBook::from_toml_str("required_version = \"4.12\"\n").unwrap();
        let opts = ScanOptions { threads: Some(2), show_progress: false, ..ScanOptions::default() };
        let mut out = ReportWriter::new(Vec::<u8>::new(), Vec::<u8>::new());

        let summary = run_audit(&root, &rules, &opts, &mut NoProgress, &mut out).unwrap();
        assert_eq!(summary.compatibility_issues, 1);
        assert_eq!(summary.misplaced_files, 1);
        assert_eq!(summary.stats.soft_failures, 0);
    }

    #[test]
    fn test_plan_covers_every_category_in_order() {
        let book = RuleBook::builtin().unwrap();
        let cats: Vec<Category> = plan(Path::new("/p"), &book).unwrap().iter().map(|c| c.category).collect();
        assert_eq!(cats, Category::ALL.to_vec());
    }
}
