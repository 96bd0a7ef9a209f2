//! 报告聚合与输出
//!
//! `render` 是纯函数：同一组命中（与到达顺序无关）总是渲染出逐字节相同的文本。
//! `ReportWriter` 把每一行同时写入日志文件与控制台，日志逐行 flush，
//! 中途失败时已写出的部分仍然保留。
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

use crate::analyzers::parent_name;
use crate::checks::CompatibilityIssue;
use crate::types::{cmp_findings, Finding};

/// 规则类别；声明顺序即报告中的固定顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Hardware,
    Libraries,
    Dependencies,
    FunctionBlocks,
    Functions,
    DeprecatedString,
    DeprecatedMath,
    Reinstall,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Hardware,
        Category::Libraries,
        Category::Dependencies,
        Category::FunctionBlocks,
        Category::Functions,
        Category::DeprecatedString,
        Category::DeprecatedMath,
        Category::Reinstall,
    ];

    /// 进度与日志里使用的短名称
    pub fn label(self) -> &'static str {
        match self {
            Category::Hardware => "Hardware",
            Category::Libraries => "Libraries",
            Category::Dependencies => "Dependencies",
            Category::FunctionBlocks => "Function blocks",
            Category::Functions => "Functions",
            Category::DeprecatedString => "AsString functions",
            Category::DeprecatedMath => "AsMath functions",
            Category::Reinstall => "Reinstall libraries",
        }
    }
}

/// 一次运行的全部结果（渲染输入）
#[derive(Debug, Clone, Default)]
pub struct AuditResults {
    pub required_version: String,
    pub compatibility: Vec<CompatibilityIssue>,
    pub misplaced: Vec<PathBuf>,
    pub findings: BTreeMap<Category, Vec<Finding>>,
}

impl AuditResults {
    pub fn category(&self, category: Category) -> &[Finding] {
        self.findings.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

const NONE: &str = "- None";

/// 渲染全部报告段落（不含开始/结束横幅）
pub fn render(results: &AuditResults) -> Vec<String> {
    let mut out = Vec::new();

    section(&mut out, "Checking project and hardware files for compatibility...");
    if results.compatibility.is_empty() {
        out.push(NONE.to_string());
    } else {
        for c in &results.compatibility {
            out.push(format!("- {}: {}", c.file.display(), c.issue));
        }
        out.push(String::new());
        out.push(format!(
            "Please ensure these files are saved at least once with Automation Studio {}.",
            results.required_version
        ));
    }

    section(&mut out, "Checking for misplaced .uad files...");
    if results.misplaced.is_empty() {
        out.push(NONE.to_string());
    } else {
        out.push("The following .uad files are not located in the required Connectivity/OpcUA directory:".to_string());
        for file in &results.misplaced {
            out.push(format!("- {}", file.display()));
        }
        out.push(String::new());
        out.push("Please create (via AS412) and move these files to the required directory: Connectivity/OpcUA.".to_string());
    }

    section(&mut out, "The following unsupported hardware were found:");
    render_hardware(&mut out, results.category(Category::Hardware));

    section(&mut out, "The following invalid libraries were found in .pkg files:");
    render_flat(&mut out, results.category(Category::Libraries), |f| {
        format!("- {}: {} (Found in: {})", f.token, f.reason, f.file.display())
    });

    section(&mut out, "The following obsolete dependencies were found in .lby files:");
    render_flat(&mut out, results.category(Category::Dependencies), |f| {
        format!(
            "- {}: Has dependency to {} ({}) (Found in: {})",
            f.context.as_deref().unwrap_or(""),
            f.token,
            f.reason,
            f.file.display()
        )
    });

    section(&mut out, "The following invalid function blocks were found in .var and .typ files:");
    render_flat(&mut out, results.category(Category::FunctionBlocks), |f| {
        format!("- {}: {} (Found in: {})", f.token, f.reason, f.file.display())
    });

    section(&mut out, "The following invalid functions were found in .st, .c and .cpp files:");
    let before = out.len();
    for f in sorted(results.category(Category::Functions)) {
        out.push(format!("- {}: {} (Found in: {})", f.token, f.reason, f.file.display()));
    }
    if !results.category(Category::DeprecatedString).is_empty() {
        out.push("- Deprecated AsString functions detected in the project: Consider replacing them with their AsBrStr equivalents.".to_string());
    }
    if !results.category(Category::DeprecatedMath).is_empty() {
        out.push("- Deprecated AsMath functions detected in the project: Consider replacing them with their AsBrMath equivalents.".to_string());
    }
    if out.len() == before {
        out.push(NONE.to_string());
    }

    section(&mut out, "The following libraries must be reinstalled:");
    render_flat(&mut out, results.category(Category::Reinstall), |f| {
        format!("- {}: {} (Found in: {})", f.token, f.reason, f.file.display())
    });

    out
}

/// 命中所在文件去重后的有序列表（用于调试输出）
pub fn affected_files(findings: &[Finding]) -> Vec<&Path> {
    findings
        .iter()
        .map(|f| f.file.as_path())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn section(out: &mut Vec<String>, title: &str) {
    out.push(String::new());
    out.push(String::new());
    out.push(title.to_string());
}

fn sorted(findings: &[Finding]) -> Vec<&Finding> {
    let mut v: Vec<&Finding> = findings.iter().collect();
    v.sort_by(|a, b| cmp_findings(a, b));
    v
}

fn render_flat(out: &mut Vec<String>, findings: &[Finding], line: impl Fn(&Finding) -> String) {
    if findings.is_empty() {
        out.push(NONE.to_string());
        return;
    }
    out.extend(sorted(findings).into_iter().map(line));
}

/// 按硬件配置（文件上级目录名）分组；组内按 (型号, 原因) 去重并排序
fn render_hardware(out: &mut Vec<String>, findings: &[Finding]) {
    if findings.is_empty() {
        out.push(NONE.to_string());
        return;
    }
    let mut groups: BTreeMap<String, BTreeSet<(&str, &str)>> = BTreeMap::new();
    for f in findings {
        groups
            .entry(parent_name(&f.file))
            .or_default()
            .insert((f.token.as_str(), f.reason.as_str()));
    }
    for (config, entries) in groups {
        out.push(String::new());
        out.push(format!("Hardware configuration: {config}"));
        for (token, reason) in entries {
            out.push(format!("- {token}: {reason}"));
        }
    }
}

/// 双路输出：日志文件 + 控制台
///
/// 持有 `&mut self` 的单一写者，逐行写入，不会在一行内交错。
pub struct ReportWriter<L: Write, C: Write> {
    log: L,
    console: C,
}

impl ReportWriter<File, Stdout> {
    /// 创建（覆盖）报告文件，控制台为 stdout
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?, io::stdout()))
    }
}

impl<L: Write, C: Write> ReportWriter<L, C> {
    pub fn new(log: L, console: C) -> Self {
        Self { log, console }
    }

    /// 写一行到两个输出，并立即 flush 日志
    pub fn emit(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.log, "{line}")?;
        self.log.flush()?;
        writeln!(self.console, "{line}")?;
        Ok(())
    }

    pub fn emit_all<I, S>(&mut self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.emit(line.as_ref())?;
        }
        Ok(())
    }

    pub fn into_parts(self) -> (L, C) {
        (self.log, self.console)
    }
}
