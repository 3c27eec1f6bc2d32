//! Run events and the observer interface frontends implement.
//!
//! The dispatcher reports everything through [`DeployObserver`]. Nothing in
//! the core touches presentation state; a frontend either implements the
//! trait directly, records events with [`EventLog`], or forwards them to its
//! own thread with [`EventForwarder`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{DeviceId, InstallOutcome, InstallTask, PackageInput, Progress, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line for the user-facing log pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Package-level milestones that are not tied to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PackageEvent {
    Resolved {
        files: Vec<PathBuf>,
        working_dir: Option<PathBuf>,
    },
    ResolutionFailed {
        tag: String,
        reason: String,
    },
    /// Zero devices with retain set: extracted, nothing installed.
    SavedNotInstalled {
        working_dir: Option<PathBuf>,
    },
    CleanedUp {
        working_dir: PathBuf,
    },
    CleanupFailed {
        working_dir: PathBuf,
        reason: String,
    },
}

/// Serializable record of one observer callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DeployEvent {
    RunStarted {
        progress: Progress,
    },
    Log {
        record: LogRecord,
    },
    Progress {
        progress: Progress,
    },
    TaskStarted {
        task: InstallTask,
    },
    TaskRetry {
        task: InstallTask,
        diagnostic: String,
    },
    TaskOutcome {
        task: InstallTask,
        outcome: InstallOutcome,
    },
    Package {
        package: PackageInput,
        detail: PackageEvent,
    },
    RunComplete {
        summary: RunSummary,
    },
}

/// Sink for everything a run reports, in emission order.
pub trait DeployObserver {
    fn on_log(&mut self, record: &LogRecord);

    fn on_progress(&mut self, progress: Progress);

    fn on_task_outcome(&mut self, task: &InstallTask, outcome: &InstallOutcome);

    fn on_run_complete(&mut self, summary: &RunSummary);

    fn on_run_started(&mut self, _progress: Progress) {}

    fn on_task_started(&mut self, _task: &InstallTask) {}

    fn on_task_retry(&mut self, _task: &InstallTask, _diagnostic: &str) {}

    fn on_package(&mut self, _package: &PackageInput, _event: &PackageEvent) {}
}

/// Turns every callback into a [`DeployEvent`] and hands it to a closure.
///
/// Typically wraps the sending half of a channel so another thread can
/// consume the run as a stream of events.
pub struct EventForwarder<F> {
    forward: F,
}

impl<F: FnMut(DeployEvent)> EventForwarder<F> {
    pub fn new(forward: F) -> Self {
        Self { forward }
    }
}

impl<F> std::fmt::Debug for EventForwarder<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventForwarder").finish_non_exhaustive()
    }
}

impl<F: FnMut(DeployEvent)> DeployObserver for EventForwarder<F> {
    fn on_log(&mut self, record: &LogRecord) {
        (self.forward)(DeployEvent::Log {
            record: record.clone(),
        });
    }

    fn on_progress(&mut self, progress: Progress) {
        (self.forward)(DeployEvent::Progress { progress });
    }

    fn on_task_outcome(&mut self, task: &InstallTask, outcome: &InstallOutcome) {
        (self.forward)(DeployEvent::TaskOutcome {
            task: task.clone(),
            outcome: outcome.clone(),
        });
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        (self.forward)(DeployEvent::RunComplete {
            summary: summary.clone(),
        });
    }

    fn on_run_started(&mut self, progress: Progress) {
        (self.forward)(DeployEvent::RunStarted { progress });
    }

    fn on_task_started(&mut self, task: &InstallTask) {
        (self.forward)(DeployEvent::TaskStarted { task: task.clone() });
    }

    fn on_task_retry(&mut self, task: &InstallTask, diagnostic: &str) {
        (self.forward)(DeployEvent::TaskRetry {
            task: task.clone(),
            diagnostic: diagnostic.to_string(),
        });
    }

    fn on_package(&mut self, package: &PackageInput, event: &PackageEvent) {
        (self.forward)(DeployEvent::Package {
            package: package.clone(),
            detail: event.clone(),
        });
    }
}

/// Forwarder over a standard channel; a closed receiver is ignored.
pub fn channel_observer(
    sender: std::sync::mpsc::Sender<DeployEvent>,
) -> EventForwarder<impl FnMut(DeployEvent) + Send + 'static> {
    EventForwarder::new(move |event| {
        let _ = sender.send(event);
    })
}

/// Append-only in-memory record of a run.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<DeployEvent>,
    progress: Progress,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[DeployEvent] {
        &self.events
    }

    /// Latest `(completed, total)` reported.
    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|event| match event {
            DeployEvent::Log { record } => Some(record.message.as_str()),
            _ => None,
        })
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.events.iter().find_map(|event| match event {
            DeployEvent::RunComplete { summary } => Some(summary),
            _ => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.summary().is_some()
    }

    /// Terminal outcomes in emission order.
    pub fn outcomes(&self) -> Vec<(&InstallTask, &InstallOutcome)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DeployEvent::TaskOutcome { task, outcome } => Some((task, outcome)),
                _ => None,
            })
            .collect()
    }

    /// Sub-event sequence of one task, e.g. `["start", "retry", "failed"]`.
    pub fn task_steps(&self, package: &Path, device: &DeviceId) -> Vec<&'static str> {
        let is_task = |task: &InstallTask| task.package.path() == package && &task.device == device;
        self.events
            .iter()
            .filter_map(|event| match event {
                DeployEvent::TaskStarted { task } if is_task(task) => Some("start"),
                DeployEvent::TaskRetry { task, .. } if is_task(task) => Some("retry"),
                DeployEvent::TaskOutcome { task, outcome } if is_task(task) => {
                    Some(outcome.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Package-level events for the input at `package`.
    pub fn package_events(&self, package: &Path) -> Vec<&PackageEvent> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DeployEvent::Package { package: input, detail } if input.path() == package => {
                    Some(detail)
                }
                _ => None,
            })
            .collect()
    }

    /// Record an event received from elsewhere, e.g. off a channel.
    pub fn push(&mut self, event: DeployEvent) {
        if let DeployEvent::RunStarted { progress } | DeployEvent::Progress { progress } = &event {
            self.progress = *progress;
        }
        self.events.push(event);
    }

    /// Every progress value reported, in order.
    pub fn progress_history(&self) -> Vec<Progress> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DeployEvent::Progress { progress } => Some(*progress),
                _ => None,
            })
            .collect()
    }
}

impl DeployObserver for EventLog {
    fn on_log(&mut self, record: &LogRecord) {
        self.push(DeployEvent::Log {
            record: record.clone(),
        });
    }

    fn on_progress(&mut self, progress: Progress) {
        self.push(DeployEvent::Progress { progress });
    }

    fn on_task_outcome(&mut self, task: &InstallTask, outcome: &InstallOutcome) {
        self.push(DeployEvent::TaskOutcome {
            task: task.clone(),
            outcome: outcome.clone(),
        });
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        self.push(DeployEvent::RunComplete {
            summary: summary.clone(),
        });
    }

    fn on_run_started(&mut self, progress: Progress) {
        self.push(DeployEvent::RunStarted { progress });
    }

    fn on_task_started(&mut self, task: &InstallTask) {
        self.push(DeployEvent::TaskStarted { task: task.clone() });
    }

    fn on_task_retry(&mut self, task: &InstallTask, diagnostic: &str) {
        self.push(DeployEvent::TaskRetry {
            task: task.clone(),
            diagnostic: diagnostic.to_string(),
        });
    }

    fn on_package(&mut self, package: &PackageInput, event: &PackageEvent) {
        self.push(DeployEvent::Package {
            package: package.clone(),
            detail: event.clone(),
        });
    }
}

impl Extend<DeployEvent> for EventLog {
    fn extend<I: IntoIterator<Item = DeployEvent>>(&mut self, events: I) {
        for event in events {
            self.push(event);
        }
    }
}

impl FromIterator<DeployEvent> for EventLog {
    fn from_iter<I: IntoIterator<Item = DeployEvent>>(events: I) -> Self {
        let mut log = Self::new();
        log.extend(events);
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarder_emits_events_in_order() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut observer = channel_observer(tx);
        observer.on_run_started(Progress::new(0, 1));
        observer.on_log(&LogRecord::info("hello"));
        observer.on_progress(Progress::new(1, 1));
        drop(observer);

        let events: Vec<DeployEvent> = rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], DeployEvent::RunStarted { .. }));
        assert!(matches!(&events[1], DeployEvent::Log { record } if record.message == "hello"));
        assert_eq!(
            events[2],
            DeployEvent::Progress {
                progress: Progress::new(1, 1)
            }
        );
    }

    #[test]
    fn forwarder_ignores_closed_channel() {
        let (tx, rx) = std::sync::mpsc::channel();
        drop(rx);
        let mut observer = channel_observer(tx);
        observer.on_log(&LogRecord::warn("nobody listening"));
    }

    #[test]
    fn event_log_tracks_latest_progress() {
        let mut log = EventLog::new();
        log.on_run_started(Progress::new(0, 2));
        log.on_progress(Progress::new(1, 2));
        assert_eq!(log.progress(), Progress::new(1, 2));
        assert!(!log.is_complete());
        log.on_run_complete(&RunSummary::default());
        assert!(log.is_complete());
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = DeployEvent::Progress {
            progress: Progress::new(1, 3),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["progress"]["completed"], 1);
    }

    #[test]
    fn package_event_keeps_outer_tag_and_inner_kind() {
        let mut log = EventLog::new();
        log.on_package(
            &PackageInput::from_path("/tmp/app.apkm"),
            &PackageEvent::CleanedUp {
                working_dir: PathBuf::from("/tmp/out/app"),
            },
        );
        let json = serde_json::to_value(&log.events()[0]).unwrap();
        assert_eq!(json["event"], "package");
        assert_eq!(json["detail"]["kind"], "cleaned-up");
        assert_eq!(json["detail"]["working_dir"], "/tmp/out/app");
        assert_eq!(json["package"]["path"], "/tmp/app.apkm");
    }

    #[test]
    fn collected_events_rebuild_the_log() {
        let events = vec![
            DeployEvent::RunStarted {
                progress: Progress::new(0, 2),
            },
            DeployEvent::Progress {
                progress: Progress::new(2, 2),
            },
            DeployEvent::RunComplete {
                summary: RunSummary::default(),
            },
        ];
        let log: EventLog = events.into_iter().collect();
        assert_eq!(log.progress(), Progress::new(2, 2));
        assert!(log.is_complete());
    }
}
