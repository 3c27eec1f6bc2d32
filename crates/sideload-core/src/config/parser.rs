//! TOML parser with helpful error messages

use super::schema::SideloadConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse sideload.toml with detailed error messages
pub fn parse_sideload_toml(path: &Path) -> Result<SideloadConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_sideload_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse sideload.toml content from string
pub fn parse_sideload_toml_str(content: &str) -> Result<SideloadConfig> {
    let config: SideloadConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Attach the offending lines to a TOML error when a location is known
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    let line_num = error
        .span()
        .map(|span| content.get(..span.start).unwrap_or(content).matches('\n').count() + 1);

    match line_num {
        Some(line_num) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            get_line_context(content, line_num),
            message
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &SideloadConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_full_config() {
        let toml = r#"
output_root = "/tmp/sideload-out"
retain_artifacts = true

[bridge]
program = "/opt/platform-tools/adb"
replace_flag = "-r"
install_args = ["-g"]
"#;

        let config = parse_sideload_toml_str(toml).unwrap();
        assert_eq!(config.output_root, PathBuf::from("/tmp/sideload-out"));
        assert!(config.retain_artifacts);
        assert_eq!(config.bridge.program, PathBuf::from("/opt/platform-tools/adb"));
        assert_eq!(config.bridge.install_args, vec!["-g".to_string()]);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_sideload_toml_str("").unwrap();
        assert_eq!(config, SideloadConfig::default());
        assert_eq!(config.bridge.program, PathBuf::from("adb"));
        assert_eq!(config.output_root, PathBuf::from("output"));
    }

    #[test]
    fn partial_bridge_table_keeps_other_defaults() {
        let config = parse_sideload_toml_str("[bridge]\nprogram = \"adb2\"\n").unwrap();
        assert_eq!(config.bridge.program, PathBuf::from("adb2"));
        assert_eq!(config.bridge.replace_flag, "-r");
    }

    #[test]
    fn invalid_toml_reports_line() {
        let toml = "output_root = \"out\"\n[bridge\nprogram = \"adb\"\n";
        let err = parse_sideload_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains("TOML parsing error at line"), "unexpected error: {err}");
        assert!(err.contains("[bridge"), "missing context: {err}");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse_sideload_toml_str("outptu_root = \"x\"\n").is_err());
    }

    #[test]
    fn rejects_bad_replace_flag() {
        let err = parse_sideload_toml_str("[bridge]\nreplace_flag = \"r\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("replace_flag"));
    }

    #[test]
    fn round_trips_through_to_toml() {
        let config = SideloadConfig {
            retain_artifacts: true,
            ..SideloadConfig::default()
        };
        let text = to_toml(&config).unwrap();
        assert_eq!(parse_sideload_toml_str(&text).unwrap(), config);
    }
}
