//! Sideload - Android package deployer
//!
//! Usage:
//!   sideload devices              # List connected devices
//!   sideload install foo.apkm ... # Install on selected devices
//!   sideload extract foo.apkm     # Unpack bundles into the output folder
//!   sideload --gui                # Launch GUI

mod interactive;
mod progress;

use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sideload_core::config::{SideloadConfig, to_toml};
use sideload_core::context::AppContext;
use sideload_core::deploy::{DeployEvent, PackageEvent, channel_observer};
use sideload_core::types::{DeviceId, InstallOutcome, RunRequest, RunSummary};

use crate::interactive::{InteractiveFlow, PrefilledOptions};
use crate::progress::ProgressDisplay;

#[derive(Parser)]
#[command(name = "sideload")]
#[command(about = "Deploy Android packages and split bundles to devices", long_about = None)]
struct Cli {
    /// Launch GUI interface
    #[arg(long, short)]
    gui: bool,

    /// Config file (default: <config dir>/sideload/sideload.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory bundles are extracted into
    #[arg(long, global = true, value_name = "DIR")]
    output_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices reported by the bridge
    Devices {
        /// Also show devices that are not ready (unauthorized, offline)
        #[arg(long)]
        all: bool,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Install packages (.apk) and bundles (.apkm) on devices
    Install(Box<InstallArgs>),

    /// Unpack bundles into the output folder without installing
    Extract {
        /// Bundles to unpack
        #[arg(required = true)]
        packages: Vec<PathBuf>,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the effective configuration
    Config {
        /// Print the config file path only
        #[arg(long)]
        path: bool,

        /// Write the default configuration if no file exists
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq, Debug)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show issues (non-zero exit if problems)
    Quiet,
}

#[derive(Args)]
struct InstallArgs {
    /// Package files to install
    #[arg(required = true)]
    packages: Vec<PathBuf>,
    /// Target device serial (repeatable)
    #[arg(short, long = "device", value_name = "SERIAL")]
    devices: Vec<String>,
    /// Install on every ready device
    #[arg(long, conflicts_with = "devices")]
    all_devices: bool,
    /// Keep extracted split packages in the output folder
    #[arg(long)]
    retain: bool,
    /// Interactive mode - pick devices from a list
    #[arg(short, long)]
    interactive: bool,
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
    /// Output format
    #[arg(short = 'o', long, default_value = "table")]
    format: OutputFormat,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sideload=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if cli.gui {
        return run_gui(&cli);
    }
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let mut ctx = AppContext::load(cli.config)?;
    if let Some(output_root) = cli.output_root {
        ctx = ctx.with_output_root(output_root);
    }
    run_cli(&ctx, command)
}

fn run_cli(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Devices { all, format } => run_devices(ctx, all, format),
        Commands::Install(args) => run_install(ctx, *args),
        Commands::Extract { packages, format } => {
            let request = ctx.run_request(packages, Vec::new(), Some(true));
            let summary = execute_run(ctx, request, format)?;
            if format == OutputFormat::Table {
                println!(
                    "Extracted {} package(s) into {}",
                    summary.saved_only,
                    ctx.config().output_root.display()
                );
            }
            exit_on_failures(&summary);
            Ok(())
        }
        Commands::Config { path, init } => run_config(ctx, path, init),
    }
}

fn run_devices(ctx: &AppContext, all: bool, format: OutputFormat) -> Result<()> {
    let entries: Vec<_> = ctx
        .bridge()
        .list_devices()?
        .into_iter()
        .filter(|entry| all || entry.state.is_ready())
        .collect();

    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No devices connected.");
                return Ok(());
            }
            println!("{:<28} State", "Serial");
            println!("{}", "-".repeat(40));
            for entry in &entries {
                println!("{:<28} {}", entry.id, entry.state);
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = entries
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "serial": entry.id.as_str(),
                        "state": entry.state.to_string(),
                        "ready": entry.state.is_ready(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {
            for entry in &entries {
                println!("{}", entry.id);
            }
        }
    }
    Ok(())
}

fn run_install(ctx: &AppContext, args: InstallArgs) -> Result<()> {
    let devices = if args.interactive {
        let prefilled = PrefilledOptions {
            devices: args
                .devices
                .iter()
                .map(|raw| DeviceId::from(raw.as_str()))
                .collect(),
            all_devices: args.all_devices,
            retain: args.retain,
            yes: args.yes,
        };
        let mut flow = InteractiveFlow::new(ctx.device_registry()?, args.packages.clone(), prefilled);
        let result = flow.collect()?;
        if !result.confirmed {
            println!("Installation cancelled.");
            return Ok(());
        }
        result.devices
    } else {
        select_devices(ctx, &args)?
    };

    if devices.is_empty() {
        anyhow::bail!(
            "No devices selected. Pass --device, --all-devices or -i; use `sideload extract` to only unpack bundles"
        );
    }

    let retain = args.retain.then_some(true);
    let request = ctx.run_request(args.packages, devices, retain);
    let summary = execute_run(ctx, request, args.format)?;
    exit_on_failures(&summary);
    Ok(())
}

/// Device selection from flags, checked against what the bridge reports.
fn select_devices(ctx: &AppContext, args: &InstallArgs) -> Result<Vec<DeviceId>> {
    let mut registry = ctx.device_registry()?;
    if args.all_devices {
        registry.select_all(true);
    } else {
        for raw in &args.devices {
            registry
                .toggle(&DeviceId::from(raw.as_str()), true)
                .with_context(|| format!("Device '{raw}' is not connected or not ready"))?;
        }
    }
    Ok(registry.selected().to_vec())
}

/// Run on the worker thread and render its events as they arrive.
fn execute_run(ctx: &AppContext, request: RunRequest, format: OutputFormat) -> Result<RunSummary> {
    let display = match format {
        OutputFormat::Table => ProgressDisplay::new(),
        OutputFormat::Json | OutputFormat::Quiet => ProgressDisplay::hidden(),
    };

    let (tx, rx) = mpsc::channel();
    let handle = ctx.deployer().spawn(request, channel_observer(tx))?;

    let mut issues = 0usize;
    for event in rx {
        let complete = matches!(event, DeployEvent::RunComplete { .. });
        match format {
            OutputFormat::Table => display.handle(&event),
            OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
            OutputFormat::Quiet => {
                if let Some(line) = issue_line(&event) {
                    issues += 1;
                    println!("{line}");
                }
            }
        }
        if complete {
            break;
        }
    }

    let summary = match handle.join() {
        Ok(summary) => summary,
        Err(err) => {
            display.abandon();
            return Err(err);
        }
    };

    match format {
        OutputFormat::Table => print_summary(&summary),
        OutputFormat::Json => {}
        OutputFormat::Quiet => {
            if issues > 0 {
                println!("{issues} issues found");
            }
        }
    }
    Ok(summary)
}

/// Terminal problems worth reporting in quiet mode. Recovered retries are not.
fn issue_line(event: &DeployEvent) -> Option<String> {
    match event {
        DeployEvent::TaskOutcome {
            task,
            outcome: InstallOutcome::Failed { diagnostic },
        } => Some(format!(
            "✗ {} on {}: {}",
            task.package.display_name(),
            task.device,
            diagnostic
        )),
        DeployEvent::Package {
            package,
            detail: PackageEvent::ResolutionFailed { reason, .. },
        } => Some(format!("✗ {}: {}", package.display_name(), reason)),
        DeployEvent::Package {
            package,
            detail: PackageEvent::CleanupFailed { reason, .. },
        } => Some(format!(
            "! {}: cleanup failed: {}",
            package.display_name(),
            reason
        )),
        _ => None,
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "Summary: {} installed, {} installed after replace, {} failed",
        summary.installed, summary.installed_after_replace, summary.failed
    );
    if summary.packages_skipped > 0 {
        println!("  ⚠ {} package(s) could not be resolved", summary.packages_skipped);
    }
}

fn exit_on_failures(summary: &RunSummary) {
    if summary.has_failures() {
        std::process::exit(1);
    }
}

fn run_config(ctx: &AppContext, path: bool, init: bool) -> Result<()> {
    if path {
        println!("{}", ctx.config_path().display());
        return Ok(());
    }
    if init {
        let store = ctx.config_store();
        if store.exists() {
            println!("Config already exists at {}", store.config_path().display());
        } else {
            store.save(&SideloadConfig::default())?;
            println!("✓ Wrote default configuration to {}", store.config_path().display());
        }
        return Ok(());
    }
    print!("{}", to_toml(ctx.config())?);
    Ok(())
}

/// Start the GUI binary that ships next to this one, falling back to `PATH`.
fn run_gui(cli: &Cli) -> Result<()> {
    let binary = format!("sideload-gui{}", std::env::consts::EXE_SUFFIX);
    let sibling = std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(&binary))
        .filter(|path| path.exists());
    let program = sibling.unwrap_or_else(|| PathBuf::from(&binary));

    let mut command = Command::new(&program);
    if let Some(config) = &cli.config {
        command.arg("--config").arg(config);
    }
    tracing::debug!(program = %program.display(), "launching GUI");
    let status = command
        .status()
        .with_context(|| format!("Failed to launch {}", program.display()))?;
    if !status.success() {
        anyhow::bail!("{} exited with {}", program.display(), status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, OutputFormat, issue_line};
    use std::path::PathBuf;

    use clap::Parser;
    use sideload_core::deploy::{DeployEvent, LogRecord, PackageEvent};
    use sideload_core::types::{
        DeviceId, InstallOutcome, InstallTask, InstallableSet, PackageInput,
    };

    #[test]
    fn install_with_devices_parses() {
        let cli = Cli::try_parse_from([
            "sideload", "install", "foo.apkm", "bar.apk", "-d", "D1", "--device", "D2",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Install(args)) => {
                assert_eq!(args.packages.len(), 2);
                assert_eq!(args.devices, vec!["D1", "D2"]);
                assert!(!args.retain);
                assert_eq!(args.format, OutputFormat::Table);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn install_requires_packages() {
        assert!(Cli::try_parse_from(["sideload", "install", "-d", "D1"]).is_err());
    }

    #[test]
    fn all_devices_conflicts_with_explicit_devices() {
        let result =
            Cli::try_parse_from(["sideload", "install", "foo.apkm", "-d", "D1", "--all-devices"]);
        assert!(result.is_err());
    }

    #[test]
    fn install_interactive_with_retain_parses() {
        let cli =
            Cli::try_parse_from(["sideload", "install", "-i", "--retain", "foo.apkm"]).unwrap();
        match cli.command {
            Some(Commands::Install(args)) => {
                assert!(args.interactive);
                assert!(args.retain);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn global_overrides_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sideload",
            "devices",
            "--config",
            "/tmp/sideload.toml",
            "--output-root",
            "/tmp/out",
            "-o",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/sideload.toml")));
        assert_eq!(cli.output_root.as_deref(), Some(std::path::Path::new("/tmp/out")));
        assert!(matches!(
            cli.command,
            Some(Commands::Devices {
                all: false,
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn config_init_conflicts_with_path() {
        assert!(Cli::try_parse_from(["sideload", "config", "--path", "--init"]).is_err());
        assert!(Cli::try_parse_from(["sideload", "config", "--init"]).is_ok());
    }

    #[test]
    fn gui_flag_parses_without_subcommand() {
        let cli = Cli::try_parse_from(["sideload", "--gui"]).unwrap();
        assert!(cli.gui);
        assert!(cli.command.is_none());
    }

    #[test]
    fn quiet_mode_reports_failed_tasks_only() {
        let task = InstallTask {
            package: PackageInput::from_path("bar.apk"),
            device: DeviceId::from("D1"),
            files: InstallableSet::single("bar.apk"),
        };
        let failed = DeployEvent::TaskOutcome {
            task: task.clone(),
            outcome: InstallOutcome::Failed {
                diagnostic: "INSTALL_FAILED_VERSION_DOWNGRADE".to_string(),
            },
        };
        let installed = DeployEvent::TaskOutcome {
            task,
            outcome: InstallOutcome::Installed,
        };

        assert_eq!(
            issue_line(&failed).as_deref(),
            Some("✗ bar.apk on D1: INSTALL_FAILED_VERSION_DOWNGRADE")
        );
        assert!(issue_line(&installed).is_none());
    }

    #[test]
    fn quiet_mode_skips_recovered_retries() {
        let task = InstallTask {
            package: PackageInput::from_path("bar.apk"),
            device: DeviceId::from("D1"),
            files: InstallableSet::single("bar.apk"),
        };
        let retry_log = DeployEvent::Log {
            record: LogRecord::warn(
                "Normal install failed on D1 for bar.apk. Retrying with replacement...",
            ),
        };
        let retry = DeployEvent::TaskRetry {
            task: task.clone(),
            diagnostic: "INSTALL_FAILED_ALREADY_EXISTS".to_string(),
        };
        let recovered = DeployEvent::TaskOutcome {
            task,
            outcome: InstallOutcome::InstalledAfterReplace,
        };

        assert!(issue_line(&retry_log).is_none());
        assert!(issue_line(&retry).is_none());
        assert!(issue_line(&recovered).is_none());
    }

    #[test]
    fn quiet_mode_reports_package_failures() {
        let bundle = PackageInput::from_path("foo.apkm");
        let unresolved = DeployEvent::Package {
            package: bundle.clone(),
            detail: PackageEvent::ResolutionFailed {
                tag: "extraction-empty".to_string(),
                reason: "no .apk files".to_string(),
            },
        };
        let cleanup = DeployEvent::Package {
            package: bundle,
            detail: PackageEvent::CleanupFailed {
                working_dir: PathBuf::from("out/foo"),
                reason: "permission denied".to_string(),
            },
        };

        assert_eq!(
            issue_line(&unresolved).as_deref(),
            Some("✗ foo.apkm: no .apk files")
        );
        assert_eq!(
            issue_line(&cleanup).as_deref(),
            Some("! foo.apkm: cleanup failed: permission denied")
        );
    }
}
