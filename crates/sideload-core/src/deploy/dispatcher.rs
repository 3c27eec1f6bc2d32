//! Package × device install loop with the retry-with-replace policy.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::artifact::{ArtifactResolver, Resolved};
use crate::bridge::DeviceBridge;
use crate::error::{DeployError, InstallError};
use crate::types::{
    InstallOutcome, InstallTask, PackageInput, PackageKind, Progress, RunRequest, RunSummary,
};

use super::cleanup::CleanupManager;
use super::events::{DeployObserver, LogRecord, PackageEvent};

/// Runs deployments. Cheap to clone; clones share the single-run guard.
#[derive(Debug, Clone)]
pub struct Deployer {
    bridge: Arc<dyn DeviceBridge>,
    resolver: ArtifactResolver,
    cleanup: CleanupManager,
    active: Arc<AtomicBool>,
}

impl Deployer {
    pub fn new(bridge: Arc<dyn DeviceBridge>, resolver: ArtifactResolver) -> Self {
        Self {
            bridge,
            resolver,
            cleanup: CleanupManager::new(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn resolver(&self) -> &ArtifactResolver {
        &self.resolver
    }

    pub fn bridge(&self) -> &Arc<dyn DeviceBridge> {
        &self.bridge
    }

    /// True while a run holds the guard.
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run a deployment on the calling thread.
    pub fn run(
        &self,
        request: RunRequest,
        observer: &mut dyn DeployObserver,
    ) -> Result<RunSummary, DeployError> {
        let guard = RunGuard::acquire(&self.active)?;
        self.prepare(&request)?;
        let summary = self.dispatch(&request, observer);
        drop(guard);
        finish(&summary, observer);
        Ok(summary)
    }

    /// Run a deployment on a background worker thread.
    ///
    /// Setup errors and a concurrently active run are reported here, before
    /// the worker starts. The worker drops the observer once `on_run_complete`
    /// returns, so a channel-backed observer closes its stream there.
    pub fn spawn<O>(&self, request: RunRequest, observer: O) -> Result<RunHandle, DeployError>
    where
        O: DeployObserver + Send + 'static,
    {
        let guard = RunGuard::acquire(&self.active)?;
        self.prepare(&request)?;

        let deployer = self.clone();
        let handle = std::thread::Builder::new()
            .name("sideload-deploy".to_string())
            .spawn(move || {
                let mut observer = observer;
                let summary = deployer.dispatch(&request, &mut observer);
                drop(guard);
                finish(&summary, &mut observer);
                drop(observer);
                summary
            })
            .map_err(DeployError::Worker)?;

        Ok(RunHandle { handle })
    }

    /// The only fatal step: the output root must exist before bundles extract.
    fn prepare(&self, request: &RunRequest) -> Result<(), DeployError> {
        let needs_root = request
            .packages
            .iter()
            .any(|package| package.kind() == PackageKind::Bundle);
        if !needs_root {
            return Ok(());
        }
        let root = self.resolver.output_root();
        std::fs::create_dir_all(root).map_err(|source| DeployError::Setup {
            path: root.to_path_buf(),
            source,
        })
    }

    fn dispatch(&self, request: &RunRequest, observer: &mut dyn DeployObserver) -> RunSummary {
        let mut run = RunState {
            progress: Progress::new(0, request.task_count()),
            summary: RunSummary::default(),
        };
        tracing::info!(
            packages = request.packages.len(),
            devices = request.devices.len(),
            total = run.progress.total,
            retain = request.retain_artifacts,
            "deployment run started"
        );
        observer.on_run_started(run.progress);
        observer.on_progress(run.progress);

        for package in &request.packages {
            self.deploy_package(package, request, &mut run, observer);
        }

        run.summary.progress = run.progress;
        tracing::info!(
            installed = run.summary.installed,
            installed_after_replace = run.summary.installed_after_replace,
            failed = run.summary.failed,
            skipped = run.summary.packages_skipped,
            "deployment run finished"
        );
        run.summary
    }

    fn deploy_package(
        &self,
        package: &PackageInput,
        request: &RunRequest,
        run: &mut RunState,
        observer: &mut dyn DeployObserver,
    ) {
        let name = package.display_name();
        if package.kind() == PackageKind::Single {
            observer.on_log(&LogRecord::info(format!(
                "Preparing to install single APK: {name}"
            )));
        }

        let resolved = match self.resolver.resolve(package) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(package = %name, error = %err, "package resolution failed");
                observer.on_log(&LogRecord::error(format!(
                    "Error: Failed to extract APK files from {name}: {err}"
                )));
                observer.on_package(
                    package,
                    &PackageEvent::ResolutionFailed {
                        tag: err.tag().to_string(),
                        reason: err.to_string(),
                    },
                );
                run.summary.packages_skipped += 1;
                // Every device slot of a skipped package still counts as done.
                run.advance(request.devices.len(), observer);
                if !request.retain_artifacts {
                    if let Some(dir) = err.working_dir() {
                        self.cleanup_dir(package, dir, observer);
                    }
                }
                return;
            }
        };

        if let Some(dir) = &resolved.working_dir {
            tracing::info!(package = %name, files = resolved.files.len(), dir = %dir.display(), "bundle extracted");
            observer.on_log(&LogRecord::info(format!("Extraction complete for {name}")));
        }
        observer.on_package(
            package,
            &PackageEvent::Resolved {
                files: resolved.files.files().to_vec(),
                working_dir: resolved.working_dir.clone(),
            },
        );

        if request.devices.is_empty() && request.retain_artifacts {
            observer.on_log(&LogRecord::info(format!(
                "Saved APK(s) for {name} to output folder, skipping installation."
            )));
            observer.on_package(
                package,
                &PackageEvent::SavedNotInstalled {
                    working_dir: resolved.working_dir.clone(),
                },
            );
            run.summary.saved_only += 1;
            return;
        }

        self.install_on_devices(package, &resolved, request, run, observer);

        if !request.retain_artifacts {
            if let Some(dir) = &resolved.working_dir {
                self.cleanup_dir(package, dir, observer);
            }
        }
    }

    fn install_on_devices(
        &self,
        package: &PackageInput,
        resolved: &Resolved,
        request: &RunRequest,
        run: &mut RunState,
        observer: &mut dyn DeployObserver,
    ) {
        for device in &request.devices {
            let task = InstallTask {
                package: package.clone(),
                device: device.clone(),
                files: resolved.files.clone(),
            };
            let outcome = self.install_task(&task, observer);
            run.record(&outcome);
            observer.on_task_outcome(&task, &outcome);
            run.advance(1, observer);
        }
    }

    /// One task: a plain attempt, then at most one retry with replace.
    fn install_task(&self, task: &InstallTask, observer: &mut dyn DeployObserver) -> InstallOutcome {
        let name = task.package.display_name();
        let device = &task.device;
        observer.on_task_started(task);
        observer.on_log(&LogRecord::info(format!(
            "Starting installation of {name} on {device}."
        )));

        let outcome = match self.attempt(task, false) {
            Ok(()) => InstallOutcome::Installed,
            Err(first) => {
                tracing::warn!(package = %name, %device, error = %first, "install failed, retrying with replace");
                observer.on_log(&LogRecord::warn(format!(
                    "Normal install failed on {device} for {name}. Retrying with replacement..."
                )));
                observer.on_task_retry(task, first.diagnostic());

                match self.retry_with_replace(task) {
                    Ok(()) => InstallOutcome::InstalledAfterReplace,
                    Err(err) => {
                        tracing::warn!(package = %name, error = %err, "install failed");
                        InstallOutcome::Failed {
                            diagnostic: err.diagnostic().to_string(),
                        }
                    }
                }
            }
        };

        match &outcome {
            InstallOutcome::Failed { diagnostic } => {
                observer.on_log(&LogRecord::error(format!(
                    "Failed: Could not install {name} on {device}. Error: {diagnostic}"
                )));
            }
            _ => {
                tracing::info!(package = %name, %device, outcome = outcome.as_str(), "installed");
                observer.on_log(&LogRecord::info(format!(
                    "Success: {name} installed on {device}."
                )));
            }
        }
        outcome
    }

    fn attempt(&self, task: &InstallTask, replace: bool) -> Result<(), InstallError> {
        let output = self
            .bridge
            .install_multiple(&task.device, task.files.files(), replace);
        if output.is_success() {
            return Ok(());
        }
        Err(InstallError::NonZeroExit {
            device: task.device.clone(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    fn retry_with_replace(&self, task: &InstallTask) -> Result<(), InstallError> {
        self.attempt(task, true).map_err(|second| InstallError::RetryFailed {
            device: task.device.clone(),
            stderr: second.diagnostic().to_string(),
        })
    }

    fn cleanup_dir(&self, package: &PackageInput, dir: &Path, observer: &mut dyn DeployObserver) {
        let name = package.display_name();
        match self.cleanup.cleanup(dir) {
            Ok(_) => {
                observer.on_log(&LogRecord::info(format!(
                    "Cleaned up extracted APK files for {name}"
                )));
                observer.on_package(
                    package,
                    &PackageEvent::CleanedUp {
                        working_dir: dir.to_path_buf(),
                    },
                );
            }
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %format!("{err:#}"), "cleanup failed");
                observer.on_log(&LogRecord::warn(format!(
                    "Could not clean up extracted files for {name}: {err:#}"
                )));
                observer.on_package(
                    package,
                    &PackageEvent::CleanupFailed {
                        working_dir: dir.to_path_buf(),
                        reason: format!("{err:#}"),
                    },
                );
            }
        }
    }
}

fn finish(summary: &RunSummary, observer: &mut dyn DeployObserver) {
    observer.on_log(&LogRecord::info("All installations are finished."));
    observer.on_run_complete(summary);
}

/// Counters owned by one run.
struct RunState {
    progress: Progress,
    summary: RunSummary,
}

impl RunState {
    fn record(&mut self, outcome: &InstallOutcome) {
        match outcome {
            InstallOutcome::Installed => self.summary.installed += 1,
            InstallOutcome::InstalledAfterReplace => self.summary.installed_after_replace += 1,
            InstallOutcome::Failed { .. } => self.summary.failed += 1,
        }
    }

    fn advance(&mut self, steps: usize, observer: &mut dyn DeployObserver) {
        if steps == 0 {
            return;
        }
        self.progress.completed = (self.progress.completed + steps).min(self.progress.total);
        observer.on_progress(self.progress);
    }
}

/// Held for the lifetime of a run; releases the slot on drop.
#[derive(Debug)]
struct RunGuard {
    active: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(active: &Arc<AtomicBool>) -> Result<Self, DeployError> {
        active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| DeployError::RunActive)?;
        Ok(Self {
            active: Arc::clone(active),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Handle to a run executing on the worker thread.
#[derive(Debug)]
pub struct RunHandle {
    handle: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run and get its summary.
    pub fn join(self) -> anyhow::Result<RunSummary> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("deployment worker panicked"))
    }
}
