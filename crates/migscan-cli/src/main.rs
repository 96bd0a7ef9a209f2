use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migscan_core::{
    run_audit, ConfigError, ConsoleProgress, NoProgress, Progress, ProjectRoot, ReportWriter, RuleBook, ScanOptions,
    BUILTIN_RULES,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "migscan", version, about = "Automation Studio 工程迁移兼容性扫描")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描工程目录并生成兼容性报告
    Scan {
        /// 工程目录（需包含 .apj 文件），默认当前目录
        project: Option<PathBuf>,

        /// 线程数（"auto"=CPU 核心数；1 为串行）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 规则文件路径（TOML），默认使用内置规则表
        #[arg(long)]
        rules: Option<PathBuf>,

        /// 输出调试日志（包括弃用函数所在文件列表）
        #[arg(short = 'v', long = "debug", alias = "verbose")]
        debug: bool,

        /// 不显示进度行
        #[arg(long)]
        no_progress: bool,
    },
    /// 打印内置规则表（可修改后通过 --rules 传入）
    Rules,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { project, threads, rules, debug, no_progress } => {
            init_tracing(debug);

            let project = match project {
                Some(p) => p,
                None => std::env::current_dir().context("resolve current directory")?,
            };
            let root = match ProjectRoot::open(&project) {
                Ok(root) => root,
                Err(e) => return Ok(usage_error(&e)),
            };
            info!(project = %root.path().display(), project_file = %root.project_file().display(), "project path validated");

            let opts = ScanOptions { threads: parse_threads(&threads), rules_path: rules, show_progress: !no_progress };
            let book = match RuleBook::resolve(opts.rules_path.as_deref()) {
                Ok(book) => book,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return Ok(ExitCode::FAILURE);
                }
            };
            let mut progress: Box<dyn Progress> =
                if opts.show_progress { Box::new(ConsoleProgress::new()) } else { Box::new(NoProgress) };

            let report_path = root.report_path();
            let mut out = ReportWriter::create(&report_path)
                .with_context(|| format!("create report file {}", report_path.display()))?;

            let outcome = run_audit(&root, &book, &opts, progress.as_mut(), &mut out);
            println!("\nResults have been saved to {}\n", report_path.display());

            match outcome {
                Ok(summary) => {
                    info!(
                        files_scanned = summary.stats.files_scanned,
                        findings = summary.stats.findings,
                        soft_failures = summary.stats.soft_failures,
                        compatibility_issues = summary.compatibility_issues,
                        misplaced_files = summary.misplaced_files,
                        elapsed_ms = summary.elapsed.as_millis() as u64,
                        "scan finished"
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!(error = %format!("{e:#}"), "scan aborted");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Rules => {
            print!("{BUILTIN_RULES}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级；--debug 时默认 debug
    let default_level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 配置错误：打印用法并以非零状态退出
fn usage_error(err: &ConfigError) -> ExitCode {
    eprintln!("Error: {err}");
    eprintln!();
    eprintln!("Please specify a valid Automation Studio 4 project path.");
    eprintln!("If the path contains spaces, wrap it in quotes.");
    eprintln!();
    eprintln!("Example usage:");
    eprintln!("1. To scan a specific project directory:");
    eprintln!("   migscan scan {}", Path::new("path").join("to").join("project").display());
    eprintln!("2. To scan the current directory:");
    eprintln!("   migscan scan");
    ExitCode::FAILURE
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") { return None; }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}
