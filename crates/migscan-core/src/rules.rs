//! 规则文件加载（TOML）与规则集
//!
//! 规则表是外部数据：进程启动时加载一次，之后只读，可在工作线程间无锁共享。
//! 内置默认表随 crate 一同编译（`rules/default.toml`），`--rules` 可整体替换。
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use anyhow::Result;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::ConfigError;

/// 内置默认规则表
pub const BUILTIN_RULES: &str = include_str!("../rules/default.toml");

const DEFAULT_REQUIRED_VERSION: &str = "4.12";
const STRING_FUNCTION_REASON: &str = "Deprecated AsString function";
const MATH_FUNCTION_REASON: &str = "Deprecated AsMath function";

fn default_required_version() -> String {
    DEFAULT_REQUIRED_VERSION.to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DeprecatedFunctions {
    #[serde(default)]
    string: Vec<String>,
    #[serde(default)]
    math: Vec<String>,
}

/// 顶层规则文件结构
#[derive(Debug, Clone, Deserialize)]
struct RuleFile {
    #[serde(default = "default_required_version")]
    required_version: String,
    #[serde(default)]
    libraries: BTreeMap<String, String>,
    #[serde(default)]
    reinstall_libraries: BTreeMap<String, String>,
    #[serde(default)]
    function_blocks: BTreeMap<String, String>,
    #[serde(default)]
    functions: BTreeMap<String, String>,
    #[serde(default)]
    hardware: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    deprecated_functions: DeprecatedFunctions,
}

/// 单条规则：标识 → 原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub token: String,
    pub reason: String,
}

/// 规则集形态
/// - Exact：精确表，token → reason，查找不区分大小写
/// - Grouped：分组成员表，类别 → token 集合；token 的原因即所属类别，查找区分大小写
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleShape {
    Exact,
    Grouped,
}

/// 只读规则集
///
/// 同时持有按 token 的索引与一个 Aho-Corasick 自动机（模式下标与 `entries` 一一对应），
/// 后者供整词分析器在原始文本上一次性定位所有候选。
#[derive(Debug, Clone)]
pub struct RuleSet {
    shape: RuleShape,
    entries: Vec<RuleEntry>,
    index: HashMap<String, usize>,
    matcher: AhoCorasick,
}

impl RuleSet {
    /// 构建精确表；大小写不同的重复 token 只保留第一条
    pub fn exact<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(token, reason)| RuleEntry { token: token.into(), reason: reason.into() });
        Self::build(RuleShape::Exact, entries)
    }

    /// 构建分组成员表；同一 token 出现在多个类别时，先出现的类别生效
    pub fn grouped<I, G, T, S>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (G, T)>,
        G: Into<String>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries = Vec::new();
        for (label, tokens) in groups {
            let label: String = label.into();
            for token in tokens {
                entries.push(RuleEntry { token: token.into(), reason: label.clone() });
            }
        }
        Self::build(RuleShape::Grouped, entries)
    }

    fn build(shape: RuleShape, raw: impl IntoIterator<Item = RuleEntry>) -> Result<Self> {
        let mut entries = Vec::new();
        let mut index = HashMap::new();
        for entry in raw {
            let key = normalize(shape, &entry.token).into_owned();
            if index.contains_key(&key) {
                continue;
            }
            index.insert(key, entries.len());
            entries.push(entry);
        }
        let matcher = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(entries.iter().map(|e| e.token.as_str()))?;
        Ok(Self { shape, entries, index, matcher })
    }

    pub fn shape(&self) -> RuleShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    /// 按规则集形态查找 token
    pub fn lookup(&self, token: &str) -> Option<&RuleEntry> {
        self.index
            .get(normalize(self.shape, token).as_ref())
            .map(|&i| &self.entries[i])
    }

    /// 区分大小写的多模式自动机（模式下标即 `entries` 下标）
    pub(crate) fn matcher(&self) -> &AhoCorasick {
        &self.matcher
    }
}

fn normalize(shape: RuleShape, token: &str) -> Cow<'_, str> {
    match shape {
        RuleShape::Exact => Cow::Owned(token.to_lowercase()),
        RuleShape::Grouped => Cow::Borrowed(token),
    }
}

/// 一次运行所需的全部规则表
#[derive(Debug, Clone)]
pub struct RuleBook {
    /// 工程/硬件文件必须声明的版本前缀
    pub required_version: String,
    pub libraries: RuleSet,
    pub reinstall_libraries: RuleSet,
    pub function_blocks: RuleSet,
    pub functions: RuleSet,
    pub hardware: RuleSet,
    pub deprecated_string: RuleSet,
    pub deprecated_math: RuleSet,
}

impl RuleBook {
    /// 使用内置默认规则表
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    /// 指定了规则文件则加载之，否则使用内置表
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin().map_err(|e| ConfigError::Rules {
                path: Path::new("rules/default.toml").to_path_buf(),
                message: format!("{e:#}"),
            }),
        }
    }

    /// 从 TOML 规则文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let rules_error = |message: String| ConfigError::Rules { path: path.to_path_buf(), message };
        let txt = std::fs::read_to_string(path).map_err(|e| rules_error(e.to_string()))?;
        Self::from_toml_str(&txt).map_err(|e| rules_error(format!("{e:#}")))
    }

    /// 从 TOML 文本解析并归一化为规则集
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let parsed: RuleFile = toml::from_str(txt)?;
        let with_reason = |names: Vec<String>, reason: &str| {
            let reason = reason.to_string();
            RuleSet::exact(names.into_iter().map(move |n| (n, reason.clone())))
        };

        Ok(Self {
            required_version: parsed.required_version,
            libraries: RuleSet::exact(parsed.libraries)?,
            reinstall_libraries: RuleSet::exact(parsed.reinstall_libraries)?,
            function_blocks: RuleSet::exact(parsed.function_blocks)?,
            functions: RuleSet::exact(parsed.functions)?,
            hardware: RuleSet::grouped(parsed.hardware)?,
            deprecated_string: with_reason(parsed.deprecated_functions.string, STRING_FUNCTION_REASON)?,
            deprecated_math: with_reason(parsed.deprecated_functions.math, MATH_FUNCTION_REASON)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_load() {
        let book = RuleBook::builtin().unwrap();
        assert_eq!(book.required_version, "4.12");
        assert!(book.libraries.lookup("AsARCNET").is_some());
        assert!(book.hardware.lookup("X20CP1301").is_some());
        assert!(!book.deprecated_string.is_empty());
        assert!(!book.deprecated_math.is_empty());
    }

    #[test]
    fn test_exact_lookup_is_case_insensitive() {
        let set = RuleSet::exact([("OldLib", "deprecated")]).unwrap();
        assert_eq!(set.shape(), RuleShape::Exact);
        let hit = set.lookup("oldlib").unwrap();
        assert_eq!(hit.token, "OldLib");
        assert_eq!(hit.reason, "deprecated");
        assert!(set.lookup("OldLibX").is_none());
    }

    #[test]
    fn test_grouped_lookup_is_exact() {
        let set = RuleSet::grouped([("Legacy CPUs", vec!["X20CP1301", "X20CP1483"])]).unwrap();
        assert_eq!(set.lookup("X20CP1301").unwrap().reason, "Legacy CPUs");
        assert!(set.lookup("x20cp1301").is_none());
    }

    #[test]
    fn test_grouped_first_group_wins() {
        let set = RuleSet::grouped([("A", vec!["T1"]), ("B", vec!["T1", "T2"])]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.lookup("T1").unwrap().reason, "A");
    }

    #[test]
    fn test_partial_rule_file_defaults() {
        let book = RuleBook::from_toml_str("[libraries]\nOldLib = \"deprecated\"\n").unwrap();
        assert_eq!(book.required_version, "4.12");
        assert_eq!(book.libraries.len(), 1);
        assert!(book.hardware.is_empty());
        assert!(book.functions.is_empty());
    }

    #[test]
    fn test_resolve_prefers_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "required_version = \"6.0\"\n").unwrap();
        assert_eq!(RuleBook::resolve(Some(&path)).unwrap().required_version, "6.0");
        assert_eq!(RuleBook::resolve(None).unwrap().required_version, "4.12");
    }

    #[test]
    fn test_load_reports_bad_toml_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "[libraries\n").unwrap();
        let err = RuleBook::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Rules { .. }));
    }
}
