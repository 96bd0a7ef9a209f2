//! 错误类型
use std::path::PathBuf;
use thiserror::Error;

/// 配置错误：致命，在任何扫描开始前终止
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the provided project path does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("the provided project path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("no .apj file found in the provided path: {}", .0.display())]
    MissingProjectFile(PathBuf),
    #[error("invalid rule file {}: {message}", .path.display())]
    Rules { path: PathBuf, message: String },
}

/// 单文件分析失败：由分发器降级为软失败（零命中 + 日志）
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary content")]
    Binary,
    #[error("not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
}
