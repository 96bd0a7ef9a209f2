//! 扫描分发与并行调度
//!
//! 流程：
//! 1) 先完整枚举候选文件并计数（进度分母）；
//! 2) 每个文件一个分析任务，提交到按线程数限定的 Rayon 线程池；
//! 3) worker 经通道把结果交给当前线程的收集循环，收集循环独占结果列表与进度显示；
//! 4) 全部完成后结束进度并返回。
//!
//! 返回的命中按任务完成顺序排列。单个文件的读取/解码失败只计为软失败，不影响其他任务。
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::AnalyzeError;
use crate::options::ScanOptions;
use crate::progress::Progress;
use crate::types::{Finding, ScanRequest, ScanResult};
use crate::walker::enumerate;

/// 执行一个扫描请求
pub fn dispatch(req: &ScanRequest<'_>, opts: &ScanOptions, label: &str, progress: &mut dyn Progress) -> Result<ScanResult> {
    let files: Vec<PathBuf> = enumerate(req.root, req.extensions).collect();
    let total = files.len();
    debug!(root = %req.root.display(), analyzer = req.analyzer.name(), total, "files enumerated");

    let mut result = ScanResult::default();
    result.stats.files_total = total;
    progress.start(label, total);

    // 决策：线程数>1 且文件不止一个时走并行调度；否则串行
    let threads = opts.worker_count();
    if threads > 1 && total > 1 {
        dispatch_parallel(req, &files, threads, &mut result, progress)?;
    } else {
        for (i, path) in files.iter().enumerate() {
            collect(&mut result, path, req.analyzer.try_analyze(path, req.rules));
            progress.update(i + 1, total);
        }
    }

    progress.finish();
    info!(
        category = label,
        files = total,
        findings = result.stats.findings,
        soft_failures = result.stats.soft_failures,
        "scan finished"
    );
    Ok(result)
}

/// 并行调度：
/// - 线程池在作用域线程内执行，worker 只通过通道提交结果
/// - 收集循环保持在当前线程，按到达顺序追加并推进进度
fn dispatch_parallel(
    req: &ScanRequest<'_>,
    files: &[PathBuf],
    threads: usize,
    result: &mut ScanResult,
    progress: &mut dyn Progress,
) -> Result<()> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("build worker pool")?;

    type Msg<'a> = (&'a Path, Result<Vec<Finding>, AnalyzeError>);
    let (tx, rx) = channel::bounded::<Msg<'_>>(256);

    let analyzer = req.analyzer;
    let rules = req.rules;
    let total = files.len();

    std::thread::scope(|s| {
        s.spawn(move || {
            pool.install(|| {
                files.par_iter().for_each_with(tx, |tx, path| {
                    let _ = tx.send((path.as_path(), analyzer.try_analyze(path, rules)));
                });
            });
            // 结束后 Sender 全部被丢弃，Receiver 将收到关闭信号
        });

        let mut done = 0usize;
        for (path, res) in rx.iter() {
            collect(result, path, res);
            done += 1;
            progress.update(done, total);
        }
    });

    Ok(())
}

fn collect(result: &mut ScanResult, path: &Path, res: Result<Vec<Finding>, AnalyzeError>) {
    match res {
        Ok(findings) => {
            result.stats.files_scanned += 1;
            result.stats.findings += findings.len();
            result.findings.extend(findings);
        }
        Err(err) => {
            result.stats.soft_failures += 1;
            debug!(path = %path.display(), error = %err, "soft failure, file contributes no findings");
        }
    }
}
