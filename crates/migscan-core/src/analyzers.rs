//! 分析器：（文件内容, 规则集）→ 命中列表
//!
//! 五种提取策略共用一个入口，分发器只需实现一次：
//! - ElementValue：`>value<` 之间的元素值，精确匹配（库引用，.pkg）
//! - Declaration：`name : Identifier ;` 声明中的类型标识（功能块，.var/.typ）
//! - WordBoundary：原始文本中的整词出现，单文件内按规则去重（函数，.st/.c/.cpp）
//! - AttributeMembership：指定元素上的属性值，分组成员匹配，单文件内按 (值, 原因) 去重（硬件，.hw）
//! - Dependency：依赖声明元素上的属性值，附带所属库名（目录名）作为上下文（.lby）
//!
//! 去重策略按分析器区分：ElementValue 与 Declaration 每次出现都输出一条。
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

use crate::error::AnalyzeError;
use crate::rules::RuleSet;
use crate::types::Finding;

/// 分析器（封闭的变体集合）
#[derive(Debug, Clone)]
pub enum Analyzer {
    ElementValue { pattern: Regex },
    Declaration { pattern: Regex },
    WordBoundary { call_only: bool },
    AttributeMembership { pattern: Regex },
    Dependency { pattern: Regex },
}

impl Analyzer {
    pub fn element_value() -> Result<Self> {
        Ok(Self::ElementValue { pattern: Regex::new(r">([^<]+)<")? })
    }

    pub fn declaration() -> Result<Self> {
        Ok(Self::Declaration { pattern: Regex::new(r":\s*([A-Za-z0-9_]+)\s*;")? })
    }

    /// 整词匹配
    pub fn word_boundary() -> Self {
        Self::WordBoundary { call_only: false }
    }

    /// 整词且其后（可有空白）紧跟 `(`，即只匹配调用点
    pub fn call_site() -> Self {
        Self::WordBoundary { call_only: true }
    }

    /// 提取 `<element ... attribute="value"` 中的 value
    pub fn attribute_membership(element: &str, attribute: &str) -> Result<Self> {
        Ok(Self::AttributeMembership { pattern: attribute_regex(element, attribute, false)? })
    }

    /// 提取依赖声明元素的属性值（元素/属性名不区分大小写）
    pub fn dependency(element: &str, attribute: &str) -> Result<Self> {
        Ok(Self::Dependency { pattern: attribute_regex(element, attribute, true)? })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ElementValue { .. } => "element-value",
            Self::Declaration { .. } => "declaration",
            Self::WordBoundary { call_only: false } => "word-boundary",
            Self::WordBoundary { call_only: true } => "call-site",
            Self::AttributeMembership { .. } => "attribute-membership",
            Self::Dependency { .. } => "dependency",
        }
    }

    /// 全函数版本：读取或解码失败时记录日志并返回空结果
    pub fn analyze(&self, path: &Path, rules: &RuleSet) -> Vec<Finding> {
        match self.try_analyze(path, rules) {
            Ok(findings) => findings,
            Err(err) => {
                debug!(path = %path.display(), analyzer = self.name(), error = %err, "soft failure");
                Vec::new()
            }
        }
    }

    /// 读取单个文件并分析；错误交由调用方降级处理
    pub fn try_analyze(&self, path: &Path, rules: &RuleSet) -> Result<Vec<Finding>, AnalyzeError> {
        let content = read_text(path)?;
        Ok(self.analyze_content(path, &content, rules))
    }

    /// 在已解码的内容上运行提取策略
    pub fn analyze_content(&self, path: &Path, content: &str, rules: &RuleSet) -> Vec<Finding> {
        match self {
            Self::ElementValue { pattern } | Self::Declaration { pattern } => pattern
                .captures_iter(content)
                .filter_map(|caps| caps.get(1))
                .filter_map(|m| rules.lookup(m.as_str()))
                .map(|entry| Finding::new(&entry.token, &entry.reason, path))
                .collect(),
            Self::WordBoundary { call_only } => word_findings(path, content, rules, *call_only),
            Self::AttributeMembership { pattern } => {
                let mut seen: HashSet<(&str, &str)> = HashSet::new();
                let mut findings = Vec::new();
                for caps in pattern.captures_iter(content) {
                    let value = match caps.get(1) { Some(m) => m.as_str(), None => continue };
                    if let Some(entry) = rules.lookup(value) {
                        if seen.insert((entry.token.as_str(), entry.reason.as_str())) {
                            findings.push(Finding::new(&entry.token, &entry.reason, path));
                        }
                    }
                }
                findings
            }
            Self::Dependency { pattern } => {
                let owner = parent_name(path);
                pattern
                    .captures_iter(content)
                    .filter_map(|caps| caps.get(1))
                    .filter_map(|m| rules.lookup(m.as_str()).map(|entry| (m.as_str(), entry)))
                    .map(|(dependency, entry)| {
                        Finding::new(dependency, &entry.reason, path).with_context(owner.clone())
                    })
                    .collect()
            }
        }
    }
}

fn attribute_regex(element: &str, attribute: &str, case_insensitive: bool) -> Result<Regex> {
    let flags = if case_insensitive { "(?i)" } else { "" };
    let pat = format!(
        r#"{flags}<{}\s(?:[^>]*?\s)?{}="([^"]+)""#,
        regex::escape(element),
        regex::escape(attribute)
    );
    Ok(Regex::new(&pat)?)
}

/// 文件所在目录名（硬件配置名或所属库名）
pub(crate) fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// 整词扫描：自动机定位所有候选，再校验两侧边界；同一规则在单文件内只输出一次
fn word_findings(path: &Path, content: &str, rules: &RuleSet, call_only: bool) -> Vec<Finding> {
    let entries = rules.entries();
    let mut seen: HashSet<usize> = HashSet::new();
    let mut findings = Vec::new();

    for m in rules.matcher().find_overlapping_iter(content) {
        let idx = m.pattern().as_usize();
        if seen.contains(&idx) {
            continue;
        }
        let before = content[..m.start()].chars().next_back();
        let after = content[m.end()..].chars().next();
        if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
            continue;
        }
        if call_only && !content[m.end()..].trim_start().starts_with('(') {
            continue;
        }
        seen.insert(idx);
        let entry = &entries[idx];
        findings.push(Finding::new(&entry.token, &entry.reason, path));
    }

    findings
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// 读取文件为 UTF-8 文本；疑似二进制或非法 UTF-8 视为解码失败
fn read_text(path: &Path) -> Result<String, AnalyzeError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    if is_probably_binary(&buf) {
        return Err(AnalyzeError::Binary);
    }
    Ok(String::from_utf8(buf)?)
}

/// 判定缓冲区是否“明显是二进制”
/// - 只要包含任何 NUL 字节即认为二进制；
/// - 否则可打印字符（含 tab/CR/LF 及非 ASCII 字节）占比低于 25% 也认为二进制。
fn is_probably_binary(buf: &[u8]) -> bool {
    if buf.is_empty() { return false; }
    if buf.contains(&0) { return true; }
    let printable = buf
        .iter()
        .filter(|&&b| matches!(b, 0x09 | 0x0A | 0x0D) || (0x20..=0x7E).contains(&b) || b >= 0x80)
        .count();
    (printable as f32 / buf.len() as f32) < 0.25
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn exact(pairs: &[(&str, &str)]) -> RuleSet {
        RuleSet::exact(pairs.iter().copied()).unwrap()
    }

    fn tokens(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.token.as_str()).collect()
    }

    #[test]
    fn test_element_value_matches_case_insensitively_per_occurrence() {
        let rules = exact(&[("AsTPU", "Supports SG3 only")]);
        let content = r#"<Objects>
  <Object Type="Library">astpu</Object>
  <Object Type="Library">AsTPU</Object>
  <Object Type="Library">AsBrStr</Object>
</Objects>"#;
        let f = Analyzer::element_value().unwrap().analyze_content(Path::new("Package.pkg"), content, &rules);
        assert_eq!(tokens(&f), vec!["AsTPU", "AsTPU"]);
        assert_eq!(f[0].reason, "Supports SG3 only");
    }

    #[test]
    fn test_declaration_matches_type_not_variable_name() {
        let rules = exact(&[("SysconfInfo", "replaced"), ("fbInfo", "variable name")]);
        let content = "VAR\n  fbInfo : SysconfInfo;\n  other:sysconfinfo ;\n  x : INT := 5;\nEND_VAR";
        let f = Analyzer::declaration().unwrap().analyze_content(Path::new("a.var"), content, &rules);
        assert_eq!(tokens(&f), vec!["SysconfInfo", "SysconfInfo"]);
    }

    #[test]
    fn test_word_boundary_rejects_identifier_prefix() {
        let rules = exact(&[("foo", "old")]);
        let analyzer = Analyzer::word_boundary();
        assert!(analyzer.analyze_content(Path::new("a.st"), "x := fooBar(1);", &rules).is_empty());
        assert!(analyzer.analyze_content(Path::new("a.st"), "x := my_foo(1);", &rules).is_empty());
        assert_eq!(analyzer.analyze_content(Path::new("a.st"), "x := foo(1);", &rules).len(), 1);
    }

    #[test]
    fn test_word_boundary_one_finding_per_pattern_and_file() {
        let rules = exact(&[("foo", "old"), ("bar", "older")]);
        let content = "foo(1); foo(2); bar; foo;";
        let f = Analyzer::word_boundary().analyze_content(Path::new("a.st"), content, &rules);
        assert_eq!(tokens(&f), vec!["foo", "bar"]);
    }

    #[test]
    fn test_word_boundary_is_case_sensitive() {
        let rules = exact(&[("PV_info", "old")]);
        let f = Analyzer::word_boundary().analyze_content(Path::new("a.c"), "pv_info(x);", &rules);
        assert!(f.is_empty());
    }

    #[test]
    fn test_word_boundary_overlapping_keys() {
        let rules = exact(&[("MEM", "a"), ("MEM_alloc", "b")]);
        let f = Analyzer::word_boundary().analyze_content(Path::new("a.c"), "p = MEM_alloc(4);", &rules);
        assert_eq!(tokens(&f), vec!["MEM_alloc"]);
    }

    #[test]
    fn test_call_site_requires_parenthesis() {
        let rules = exact(&[("pow", "math")]);
        let analyzer = Analyzer::call_site();
        assert!(analyzer.analyze_content(Path::new("a.st"), "pow := 3;", &rules).is_empty());
        assert_eq!(analyzer.analyze_content(Path::new("a.st"), "y := pow  (x, 2);", &rules).len(), 1);
    }

    #[test]
    fn test_attribute_membership_dedups_within_file() {
        let rules = RuleSet::grouped([("Legacy", vec!["X20CP1301"])]).unwrap();
        let content = r#"
<Module Name="A" Type="X20CP1301" Version="1.0" />
<Module Name="B" Type="X20CP1301" Version="1.0" />
<Module Name="C" Type="X20CP1301" />
<Module Name="D" SubType="X20CP1301" Type="X20DI9371" />
<Connector Type="X20CP1301" />"#;
        let analyzer = Analyzer::attribute_membership("Module", "Type").unwrap();
        let f = analyzer.analyze_content(Path::new("Config1/Hardware.hw"), content, &rules);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].token, "X20CP1301");
        assert_eq!(f[0].reason, "Legacy");
    }

    #[test]
    fn test_dependency_carries_owning_library() {
        let rules = exact(&[("AsTPU", "Supports SG3 only")]);
        let content = r#"<Dependencies>
  <Dependency ObjectName="astpu" />
  <Dependency ObjectName="AsBrStr" />
</Dependencies>"#;
        let path = PathBuf::from("Logical/Libraries/MyLib/MyLib.lby");
        let f = Analyzer::dependency("Dependency", "ObjectName").unwrap().analyze_content(&path, content, &rules);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].token, "astpu");
        assert_eq!(f[0].context.as_deref(), Some("MyLib"));
    }

    #[test]
    fn test_undecodable_file_is_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.st");
        std::fs::write(&path, [0x66, 0x6f, 0x6f, 0xff, 0xfe, 0x28]).unwrap();
        let rules = exact(&[("foo", "old")]);
        let analyzer = Analyzer::word_boundary();
        assert!(matches!(analyzer.try_analyze(&path, &rules), Err(AnalyzeError::Decode(_))));
        assert!(analyzer.analyze(&path, &rules).is_empty());
    }

    #[test]
    fn test_binary_file_is_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.st");
        std::fs::write(&path, b"foo(\0\0\0)").unwrap();
        let rules = exact(&[("foo", "old")]);
        assert!(matches!(Analyzer::word_boundary().try_analyze(&path, &rules), Err(AnalyzeError::Binary)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let rules = exact(&[("foo", "old")]);
        let res = Analyzer::word_boundary().try_analyze(Path::new("/nonexistent/x.st"), &rules);
        assert!(matches!(res, Err(AnalyzeError::Io(_))));
    }
}
