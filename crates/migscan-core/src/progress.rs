//! 进度显示
//!
//! 只有分发器的收集线程调用进度接口，工作线程从不直接写终端，
//! 因此显示值天然单调不减。
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const RUNNING_TEMPLATE: &str = "{msg}: processing file {pos}/{len}...";
const DONE_TEMPLATE: &str = "{msg}";
const DONE_MESSAGE: &str = "Processing complete";

/// 进度上报能力
pub trait Progress {
    /// 开始一轮扫描（total 为已知分母）
    fn start(&mut self, label: &str, total: usize);
    /// 已完成 current / total
    fn update(&mut self, current: usize, total: usize);
    /// 本轮结束
    fn finish(&mut self);
}

/// 静默实现（测试与 `--no-progress`）
#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&mut self, _label: &str, _total: usize) {}
    fn update(&mut self, _current: usize, _total: usize) {}
    fn finish(&mut self) {}
}

/// 终端单行进度（stderr，非终端时自动隐藏）
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Progress for ConsoleProgress {
    fn start(&mut self, label: &str, total: usize) {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        set_template(&bar, RUNNING_TEMPLATE);
        bar.set_message(label.to_string());
        self.bar = Some(bar);
    }

    fn update(&mut self, current: usize, _total: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(current as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            finish_bar(&bar);
        }
    }
}

fn set_template(bar: &ProgressBar, template: &str) {
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style);
    }
}

/// 结束行只保留消息本身，不再带计数模板
fn finish_bar(bar: &ProgressBar) {
    set_template(bar, DONE_TEMPLATE);
    bar.finish_with_message(DONE_MESSAGE);
}

/// 记录调用序列，供测试断言
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingProgress {
    pub(crate) started: Vec<(String, usize)>,
    pub(crate) updates: Vec<(usize, usize)>,
    pub(crate) finished: usize,
}

#[cfg(test)]
impl Progress for RecordingProgress {
    fn start(&mut self, label: &str, total: usize) {
        self.started.push((label.to_string(), total));
    }
    fn update(&mut self, current: usize, total: usize) {
        self.updates.push((current, total));
    }
    fn finish(&mut self) {
        self.finished += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_progress_lifecycle_without_terminal() {
        let mut p = ConsoleProgress::new();
        p.update(1, 2);
        p.start("Hardware", 2);
        p.update(1, 2);
        p.update(2, 2);
        p.finish();
        assert!(p.bar.is_none());
        p.finish();
    }

    #[test]
    fn test_finish_line_is_plain_message() {
        assert!(ProgressStyle::with_template(DONE_TEMPLATE).is_ok());
        assert!(!DONE_TEMPLATE.contains("{pos}"));

        let bar = ProgressBar::with_draw_target(Some(3), ProgressDrawTarget::hidden());
        set_template(&bar, RUNNING_TEMPLATE);
        bar.set_message("Hardware");
        bar.set_position(3);
        finish_bar(&bar);
        assert!(bar.is_finished());
        assert_eq!(bar.message(), DONE_MESSAGE);
    }
}
