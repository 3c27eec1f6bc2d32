//! Terminal rendering of a deployment run.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use sideload_core::deploy::{DeployEvent, LogLevel, LogRecord};
use sideload_core::types::Progress;

/// Progress bar plus the log pane printed above it.
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// A display that tracks state without drawing anything.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let bar_style = ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(bar_style);
        Self { bar }
    }

    pub fn handle(&self, event: &DeployEvent) {
        match event {
            DeployEvent::RunStarted { progress } | DeployEvent::Progress { progress } => {
                self.set_progress(*progress);
            }
            DeployEvent::TaskStarted { task } => {
                self.bar
                    .set_message(format!("{} -> {}", task.package.display_name(), task.device));
            }
            DeployEvent::Log { record } => {
                self.bar.println(format_record(record));
            }
            DeployEvent::RunComplete { .. } => {
                self.bar.finish_and_clear();
            }
            _ => {}
        }
    }

    fn set_progress(&self, progress: Progress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.completed as u64);
    }

    #[cfg(test)]
    pub fn position(&self) -> (u64, Option<u64>) {
        (self.bar.position(), self.bar.length())
    }

    /// Abandon on error
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// One log-pane line: local time, severity marker, message.
pub fn format_record(record: &LogRecord) -> String {
    let time = record.at.with_timezone(&chrono::Local).format("%H:%M:%S");
    let marker = match record.level {
        LogLevel::Info => style("•").dim(),
        LogLevel::Warn => style("!").yellow(),
        LogLevel::Error => style("✗").red(),
    };
    format!("{time} {marker} {}", record.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_events_move_the_bar() {
        let display = ProgressDisplay::hidden();
        display.handle(&DeployEvent::RunStarted {
            progress: Progress::new(0, 4),
        });
        display.handle(&DeployEvent::Progress {
            progress: Progress::new(3, 4),
        });
        assert_eq!(display.position(), (3, Some(4)));
    }

    #[test]
    fn record_line_keeps_message() {
        let line = format_record(&LogRecord::error("Failed: Could not install bar.apk on D1."));
        assert!(line.ends_with("Failed: Could not install bar.apk on D1."));
    }
}
