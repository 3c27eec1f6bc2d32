//! Interactive flow for the install command.
//!
//! Collects the device selection when `-i` is passed, using dialoguer
//! prompts over the device registry.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, MultiSelect, theme::ColorfulTheme};

use sideload_core::devices::DeviceRegistry;
use sideload_core::types::DeviceId;

/// Label of the extra first entry that selects every device.
const SELECT_ALL: &str = "Select All";

/// Values from CLI args that skip prompts.
#[derive(Debug, Clone, Default)]
pub struct PrefilledOptions {
    /// Devices given with `--device`; if non-empty, skip the picker
    pub devices: Vec<DeviceId>,
    /// `--all-devices`
    pub all_devices: bool,
    /// Retain extracted files
    pub retain: bool,
    /// Skip the confirmation
    pub yes: bool,
}

/// Result of the interactive flow.
#[derive(Debug, Clone)]
pub struct InteractiveResult {
    /// Devices in the order they were selected
    pub devices: Vec<DeviceId>,
    /// Whether the user confirmed the run
    pub confirmed: bool,
}

/// Device picker and run confirmation.
pub struct InteractiveFlow<W: Write = io::Stdout> {
    registry: DeviceRegistry,
    packages: Vec<PathBuf>,
    prefilled: PrefilledOptions,
    writer: W,
    theme: ColorfulTheme,
}

impl InteractiveFlow<io::Stdout> {
    pub fn new(registry: DeviceRegistry, packages: Vec<PathBuf>, prefilled: PrefilledOptions) -> Self {
        Self {
            registry,
            packages,
            prefilled,
            writer: io::stdout(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> InteractiveFlow<W> {
    #[cfg(test)]
    pub fn with_writer(
        registry: DeviceRegistry,
        packages: Vec<PathBuf>,
        prefilled: PrefilledOptions,
        writer: W,
    ) -> Self {
        Self {
            registry,
            packages,
            prefilled,
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    /// Run the flow.
    ///
    /// 1. Select devices unless given on the command line
    /// 2. Show summary and confirm
    pub fn collect(&mut self) -> Result<InteractiveResult> {
        self.print_header()?;

        self.prompt_devices()?;
        let devices = self.registry.selected().to_vec();

        let confirmed = self.show_summary_and_confirm(&devices)?;

        Ok(InteractiveResult { devices, confirmed })
    }

    fn print_header(&mut self) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "{}",
            style("  Sideload Install Wizard").bold().cyan()
        )?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn prompt_devices(&mut self) -> Result<()> {
        if self.prefilled.all_devices {
            self.registry.select_all(true);
            return Ok(());
        }
        if !self.prefilled.devices.is_empty() {
            for device in &self.prefilled.devices {
                self.registry.toggle(device, true)?;
            }
            return Ok(());
        }
        if self.registry.known().is_empty() {
            writeln!(self.writer, "  {}", style("No devices connected.").yellow())?;
            return Ok(());
        }

        let mut items = vec![SELECT_ALL.to_string()];
        items.extend(self.registry.known().iter().map(|id| id.to_string()));

        let selections = MultiSelect::with_theme(&self.theme)
            .with_prompt("Target devices (space to toggle, enter to confirm)")
            .items(&items)
            .interact()?;

        if selections.contains(&0) {
            self.registry.select_all(true);
        } else {
            let known = self.registry.known().to_vec();
            for index in selections {
                self.registry.toggle(&known[index - 1], true)?;
            }
        }
        Ok(())
    }

    fn show_summary_and_confirm(&mut self, devices: &[DeviceId]) -> Result<bool> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", style("  Summary").bold())?;
        writeln!(self.writer, "  ───────────────────────────")?;

        for package in &self.packages {
            writeln!(
                self.writer,
                "  Package:  {}",
                style(package.display()).green()
            )?;
        }

        let device_list = if devices.is_empty() {
            "(none)".to_string()
        } else {
            devices
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(self.writer, "  Devices:  {}", style(device_list).green())?;

        let retain = if self.prefilled.retain { "yes" } else { "no" };
        writeln!(self.writer, "  Keep extracted files: {}", style(retain).green())?;
        writeln!(self.writer)?;

        if self.prefilled.yes {
            return Ok(true);
        }

        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt("Proceed with installation?")
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::with_devices(["emulator-5554", "R58M123"].map(DeviceId::from))
    }

    #[test]
    fn prefilled_devices_skip_the_picker() {
        let prefilled = PrefilledOptions {
            devices: vec![DeviceId::from("R58M123")],
            yes: true,
            ..Default::default()
        };

        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(
            registry(),
            vec![PathBuf::from("foo.apkm")],
            prefilled,
            &mut output,
        );
        let result = flow.collect().unwrap();

        assert!(result.confirmed);
        assert_eq!(result.devices, vec![DeviceId::from("R58M123")]);
        let output_str = String::from_utf8(output).unwrap();
        assert!(output_str.contains("Summary"));
        assert!(output_str.contains("foo.apkm"));
        assert!(output_str.contains("R58M123"));
    }

    #[test]
    fn all_devices_selects_every_known_device() {
        let prefilled = PrefilledOptions {
            all_devices: true,
            yes: true,
            ..Default::default()
        };

        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(registry(), vec![], prefilled, &mut output);
        let result = flow.collect().unwrap();

        assert_eq!(
            result.devices,
            vec![DeviceId::from("emulator-5554"), DeviceId::from("R58M123")]
        );
    }

    #[test]
    fn unknown_prefilled_device_is_an_error() {
        let prefilled = PrefilledOptions {
            devices: vec![DeviceId::from("ghost")],
            yes: true,
            ..Default::default()
        };

        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(registry(), vec![], prefilled, &mut output);

        assert!(flow.collect().is_err());
    }
}
