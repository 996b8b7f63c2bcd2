//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use sysmon::config::DaemonConfig;
use sysmon::error::ExitStatus;

use crate::cli::ConfigFormat;

/// Generates a configuration file holding the defaults.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> ExitStatus {
    let output = output.unwrap_or_else(|| PathBuf::from("-"));

    let content = match render(&DaemonConfig::default(), format, commented) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("❌ Failed to render configuration: {}", e);
            return ExitStatus::Config;
        }
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else if let Err(e) = fs::write(&output, content) {
        eprintln!("❌ Failed to write {}: {}", output.display(), e);
        return ExitStatus::Config;
    } else {
        println!("✅ Configuration written to: {}", output.display());
    }

    ExitStatus::Success
}

fn render(
    config: &DaemonConfig,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)? + "\n",
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => {
            let content = serde_yaml::to_string(config)?;
            if commented {
                add_config_comments(content)
            } else {
                content
            }
        }
    })
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# System Monitor Configuration
# ============================
#
# Values here are overridden by SYSMON_INTERVAL, SYSMON_LOG and SYSMON_PIDFILE,
# which in turn are overridden by command-line flags.
#
# Sampling
# --------
# interval_seconds: 5          # Seconds between samples (>= 1)
# devices: null                # Block device allow-list, regex (e.g. ["sd[a-z]", "nvme\\d+n\\d+"])
# interfaces: null             # Network interface allow-list, regex (e.g. ["eth\\d+"])
# filesystems: true            # Report capacity per mounted filesystem
# proc_root: "/proc"           # procfs mount point
#
# Output
# ------
# log_path: "/var/log/sysmon/metrics.jsonl"  # Metrics records, "-" for stdout
# log_backups: 7               # Daily rotated files to keep (0 = no rotation)
#
# Daemon
# ------
# pid_file: "/run/sysmon.pid"  # Locked while the daemon runs
# daemon_log: "/var/log/sysmon/monitor.log"  # Diagnostics once detached
# max_consecutive_failures: 3  # Failed ticks in a row before giving up
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_formats_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = DaemonConfig::default();

        for (format, name) in [
            (ConfigFormat::Yaml, "monitor.yaml"),
            (ConfigFormat::Json, "monitor.json"),
            (ConfigFormat::Toml, "monitor.toml"),
        ] {
            let content = render(&defaults, format, true).unwrap();
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            let loaded = sysmon::config::load_config(Some(&path)).unwrap();
            assert_eq!(loaded, defaults, "{}", name);
        }
    }
}
