//! Sideload GUI - Graphical User Interface
//!
//! Iced-based window for picking devices and packages and following a
//! deployment. All run state arrives as `DeployEvent`s from the worker.

use std::path::PathBuf;
use std::sync::Arc;

use iced::futures::channel::{mpsc, oneshot};
use iced::widget::{
    Column, button, checkbox, column, container, horizontal_rule, progress_bar, row, scrollable,
    text, text_input,
};
use iced::{Color, Element, Length, Task, Theme};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sideload_core::bridge::{DeviceBridge, DeviceEntry};
use sideload_core::config::{CONFIG_FILE_NAME, SideloadConfig};
use sideload_core::context::AppContext;
use sideload_core::deploy::{DeployEvent, Deployer, EventForwarder, LogLevel, LogRecord};
use sideload_core::devices::DeviceRegistry;
use sideload_core::types::{DeviceId, Progress, RunSummary};

const TITLE: &str = "Sideload - APKM & APK Installer";

fn main() -> iced::Result {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sideload_gui=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    iced::application(TITLE, SideloadGui::update, SideloadGui::view)
        .theme(|_| Theme::Dark)
        .window_size((560.0, 760.0))
        .run_with(|| SideloadGui::new(config_arg()))
}

/// `--config <PATH>`, as forwarded by `sideload --gui`.
fn config_arg() -> Option<PathBuf> {
    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[derive(Debug, Clone)]
enum Message {
    RefreshDevices,
    DevicesLoaded(Result<Vec<DeviceEntry>, String>),
    DeviceToggled(DeviceId, bool),
    SelectAllToggled(bool),
    RetainToggled(bool),
    PackageInputChanged(String),
    AddPackage,
    RemovePackage(usize),
    ClearPackages,
    Install,
    Deploy(DeployEvent),
    WorkerExited,
}

struct SideloadGui {
    ctx: AppContext,
    deployer: Deployer,
    registry: DeviceRegistry,
    package_input: String,
    packages: Vec<PathBuf>,
    retain: bool,
    progress: Progress,
    log: Vec<LogRecord>,
    running: bool,
    last_summary: Option<RunSummary>,
}

impl SideloadGui {
    fn new(config_path: Option<PathBuf>) -> (Self, Task<Message>) {
        let mut startup_log = Vec::new();
        let ctx = match AppContext::load(config_path) {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "falling back to default configuration");
                startup_log.push(LogRecord::warn(format!(
                    "Could not load configuration, using defaults: {err:#}"
                )));
                AppContext::new(SideloadConfig::default(), PathBuf::from(CONFIG_FILE_NAME))
            }
        };

        let mut gui = Self::with_context(ctx);
        gui.log = startup_log;
        (gui, Task::done(Message::RefreshDevices))
    }

    fn with_context(ctx: AppContext) -> Self {
        Self {
            deployer: ctx.deployer(),
            retain: ctx.config().retain_artifacts,
            ctx,
            registry: DeviceRegistry::new(),
            package_input: String::new(),
            packages: Vec::new(),
            progress: Progress::default(),
            log: Vec::new(),
            running: false,
            last_summary: None,
        }
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::RefreshDevices => {
                return match list_devices_in_background(self.ctx.bridge()) {
                    Ok(listing) => Task::perform(
                        async move {
                            listing
                                .await
                                .unwrap_or_else(|_| Err("device listing stopped".to_string()))
                        },
                        Message::DevicesLoaded,
                    ),
                    Err(err) => {
                        tracing::warn!(error = %err, "could not start device listing");
                        self.log
                            .push(LogRecord::error(format!("Could not list devices: {err}")));
                        Task::none()
                    }
                };
            }
            Message::DevicesLoaded(Ok(entries)) => {
                self.registry.replace_entries(entries);
                tracing::debug!(devices = self.registry.known().len(), "device list updated");
            }
            Message::DevicesLoaded(Err(err)) => {
                self.log
                    .push(LogRecord::error(format!("Could not list devices: {err}")));
            }
            Message::DeviceToggled(device, selected) => {
                if let Err(err) = self.registry.toggle(&device, selected) {
                    self.log.push(LogRecord::warn(err.to_string()));
                }
            }
            Message::SelectAllToggled(selected) => {
                self.registry.select_all(selected);
            }
            Message::RetainToggled(retain) => {
                self.retain = retain;
            }
            Message::PackageInputChanged(value) => {
                self.package_input = value;
            }
            Message::AddPackage => {
                let raw = self.package_input.trim();
                if !raw.is_empty() {
                    let path = PathBuf::from(raw);
                    if !self.packages.contains(&path) {
                        self.packages.push(path);
                    }
                    self.package_input.clear();
                }
            }
            Message::RemovePackage(index) => {
                if index < self.packages.len() {
                    self.packages.remove(index);
                }
            }
            Message::ClearPackages => {
                self.packages.clear();
            }
            Message::Install => return self.start_install(),
            Message::Deploy(event) => self.apply_event(event),
            Message::WorkerExited => {
                if self.running {
                    self.running = false;
                    self.log.push(LogRecord::error(
                        "Deployment worker stopped before finishing.",
                    ));
                }
            }
        }
        Task::none()
    }

    fn start_install(&mut self) -> Task<Message> {
        if !self.can_install() {
            return Task::none();
        }
        let request = self.ctx.run_request(
            self.packages.clone(),
            self.registry.selected().to_vec(),
            Some(self.retain),
        );

        let (sender, receiver) = mpsc::unbounded();
        let observer = EventForwarder::new(move |event| {
            let _ = sender.unbounded_send(event);
        });

        match self.deployer.spawn(request, observer) {
            // The worker is detached; its event stream ends when it drops the sender.
            Ok(_handle) => {
                self.running = true;
                self.progress = Progress::default();
                self.last_summary = None;
                self.log.clear();
                Task::run(receiver, Message::Deploy).chain(Task::done(Message::WorkerExited))
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not start deployment");
                self.log
                    .push(LogRecord::error(format!("Could not start installation: {err}")));
                Task::none()
            }
        }
    }

    fn apply_event(&mut self, event: DeployEvent) {
        match event {
            DeployEvent::RunStarted { progress } | DeployEvent::Progress { progress } => {
                self.progress = progress;
            }
            DeployEvent::Log { record } => self.log.push(record),
            DeployEvent::RunComplete { summary } => {
                self.running = false;
                self.progress = summary.progress;
                self.last_summary = Some(summary);
            }
            DeployEvent::TaskStarted { .. }
            | DeployEvent::TaskRetry { .. }
            | DeployEvent::TaskOutcome { .. }
            | DeployEvent::Package { .. } => {}
        }
    }

    fn can_install(&self) -> bool {
        !self.packages.is_empty() && !self.running
    }

    fn view(&self) -> Element<'_, Message> {
        let devices = Column::with_children(self.registry.known().iter().map(|id| {
            let device = id.clone();
            checkbox(id.to_string(), self.registry.is_selected(id))
                .on_toggle(move |checked| Message::DeviceToggled(device.clone(), checked))
                .into()
        }))
        .spacing(4);

        let device_section = column![
            row![
                text("Select Device(s):").size(16),
                button(text("Refresh devices").size(13)).on_press(Message::RefreshDevices),
            ]
            .spacing(12),
            checkbox("Select All", self.registry.all_selected())
                .on_toggle(Message::SelectAllToggled),
            devices,
        ]
        .spacing(8);

        let package_list = Column::with_children(self.packages.iter().enumerate().map(
            |(index, path)| {
                row![
                    text(path.display().to_string()).size(13).width(Length::Fill),
                    button(text("✕").size(12)).on_press_maybe(
                        (!self.running).then_some(Message::RemovePackage(index))
                    ),
                ]
                .spacing(8)
                .into()
            },
        ))
        .spacing(4);

        let files_label = if self.packages.is_empty() {
            "No files selected".to_string()
        } else {
            format!("Loaded: {} file(s)", self.packages.len())
        };

        let package_section = column![
            row![
                text_input("Path to .apkm or .apk file", &self.package_input)
                    .on_input(Message::PackageInputChanged)
                    .on_submit(Message::AddPackage),
                button("Add").on_press(Message::AddPackage),
                button("Clear").on_press_maybe(
                    (!self.packages.is_empty() && !self.running).then_some(Message::ClearPackages)
                ),
            ]
            .spacing(8),
            text(files_label).size(13),
            package_list,
        ]
        .spacing(8);

        let log_pane = scrollable(
            Column::with_children(self.log.iter().map(|record| {
                text(format_record(record))
                    .size(13)
                    .color(level_color(record.level))
                    .into()
            }))
            .spacing(2),
        )
        .height(Length::Fill);

        let status = match &self.last_summary {
            Some(summary) => format!(
                "All installations are finished. {} installed, {} after replace, {} failed.",
                summary.installed, summary.installed_after_replace, summary.failed
            ),
            None if self.running => format!(
                "Installing... {}/{}",
                self.progress.completed, self.progress.total
            ),
            None => String::new(),
        };

        column![
            text(TITLE).size(22),
            device_section,
            horizontal_rule(1),
            checkbox("Save APK to Output Folder", self.retain).on_toggle(Message::RetainToggled),
            package_section,
            button(text("Install APKs")).on_press_maybe(self.can_install().then_some(Message::Install)),
            progress_bar(0.0..=1.0, self.progress.fraction()),
            text(status).size(13),
            container(log_pane).height(Length::Fill).width(Length::Fill),
        ]
        .padding(20)
        .spacing(12)
        .into()
    }
}

fn format_record(record: &LogRecord) -> String {
    let time = record.at.with_timezone(&chrono::Local).format("%H:%M:%S");
    format!("[{time}] {}", record.message)
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Info => Color::from_rgb8(0xdd, 0xdd, 0xdd),
        LogLevel::Warn => Color::from_rgb8(0xf0, 0xc6, 0x74),
        LogLevel::Error => Color::from_rgb8(0xef, 0x6b, 0x6b),
    }
}

/// The bridge shells out, so the listing runs on its own thread.
fn list_devices_in_background(
    bridge: Arc<dyn DeviceBridge>,
) -> std::io::Result<oneshot::Receiver<Result<Vec<DeviceEntry>, String>>> {
    let (sender, receiver) = oneshot::channel();
    std::thread::Builder::new()
        .name("sideload-devices".to_string())
        .spawn(move || {
            let listing = bridge.list_devices().map_err(|err| format!("{err:#}"));
            let _ = sender.send(listing);
        })?;
    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use sideload_core::bridge::{BridgeOutput, DeviceState};

    #[derive(Debug)]
    struct SlowListing {
        delay: Duration,
    }

    impl DeviceBridge for SlowListing {
        fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>> {
            std::thread::sleep(self.delay);
            Ok(vec![DeviceEntry {
                id: DeviceId::from("D1"),
                state: DeviceState::Ready,
            }])
        }

        fn install_multiple(
            &self,
            _device: &DeviceId,
            _files: &[PathBuf],
            _replace: bool,
        ) -> BridgeOutput {
            BridgeOutput::success()
        }
    }

    fn gui_with_devices(ids: &[&str]) -> SideloadGui {
        let ctx = AppContext::new(SideloadConfig::default(), PathBuf::from(CONFIG_FILE_NAME));
        let mut gui = SideloadGui::with_context(ctx);
        gui.registry = DeviceRegistry::with_devices(ids.iter().map(|id| DeviceId::from(*id)));
        gui
    }

    #[test]
    fn select_all_tracks_individual_checkboxes() {
        let mut gui = gui_with_devices(&["D1", "D2"]);

        let _ = gui.update(Message::DeviceToggled(DeviceId::from("D1"), true));
        assert!(!gui.registry.all_selected());
        let _ = gui.update(Message::DeviceToggled(DeviceId::from("D2"), true));
        assert!(gui.registry.all_selected());

        let _ = gui.update(Message::SelectAllToggled(false));
        assert!(gui.registry.selected().is_empty());
    }

    #[test]
    fn install_needs_packages() {
        let mut gui = gui_with_devices(&["D1"]);
        assert!(!gui.can_install());

        let _ = gui.update(Message::PackageInputChanged("  foo.apkm ".to_string()));
        let _ = gui.update(Message::AddPackage);
        let _ = gui.update(Message::PackageInputChanged("foo.apkm".to_string()));
        let _ = gui.update(Message::AddPackage);

        assert_eq!(gui.packages, vec![PathBuf::from("foo.apkm")]);
        assert!(gui.package_input.is_empty());
        assert!(gui.can_install());
    }

    #[test]
    fn deploy_events_drive_progress_and_log() {
        let mut gui = gui_with_devices(&["D1"]);
        gui.running = true;

        let _ = gui.update(Message::Deploy(DeployEvent::RunStarted {
            progress: Progress::new(0, 2),
        }));
        let _ = gui.update(Message::Deploy(DeployEvent::Log {
            record: LogRecord::info("Starting installation of foo.apkm on D1."),
        }));
        let _ = gui.update(Message::Deploy(DeployEvent::Progress {
            progress: Progress::new(1, 2),
        }));
        assert_eq!(gui.progress, Progress::new(1, 2));
        assert_eq!(gui.log.len(), 1);
        assert!(!gui.can_install());

        let summary = RunSummary {
            progress: Progress::new(2, 2),
            installed: 2,
            ..RunSummary::default()
        };
        let _ = gui.update(Message::Deploy(DeployEvent::RunComplete { summary }));
        let _ = gui.update(Message::WorkerExited);

        assert!(!gui.running);
        assert_eq!(gui.progress, Progress::new(2, 2));
        assert_eq!(gui.log.len(), 1);
    }

    #[test]
    fn worker_exit_without_completion_is_reported() {
        let mut gui = gui_with_devices(&["D1"]);
        gui.running = true;

        let _ = gui.update(Message::WorkerExited);

        assert!(!gui.running);
        assert_eq!(gui.log.last().map(|record| record.level), Some(LogLevel::Error));
    }

    #[test]
    fn device_listing_runs_off_the_calling_thread() {
        let bridge: Arc<dyn DeviceBridge> = Arc::new(SlowListing {
            delay: Duration::from_millis(50),
        });
        let mut listing = list_devices_in_background(bridge).unwrap();
        assert_eq!(listing.try_recv(), Ok(None));

        let mut entries = None;
        for _ in 0..200 {
            if let Some(result) = listing.try_recv().unwrap() {
                entries = Some(result);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let entries = entries.expect("listing never arrived").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, DeviceId::from("D1"));
    }

    #[test]
    fn loaded_devices_replace_the_registry() {
        let mut gui = gui_with_devices(&["OLD"]);
        let _ = gui.update(Message::DevicesLoaded(Ok(vec![DeviceEntry {
            id: DeviceId::from("D1"),
            state: DeviceState::Ready,
        }])));
        assert_eq!(gui.registry.known().len(), 1);

        let _ = gui.update(Message::DevicesLoaded(Err("adb not found".to_string())));
        assert!(gui
            .log
            .iter()
            .any(|record| record.message == "Could not list devices: adb not found"));
    }
}
