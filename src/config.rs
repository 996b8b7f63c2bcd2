//! Configuration management for the monitor.
//!
//! This module handles loading, merging, and validating configuration from
//! files, environment variables and CLI arguments. Config files may be YAML,
//! JSON, or TOML.
//!
//! Precedence: CLI > environment > config file > default.

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::{access, AccessFlags};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collectors::{Filters, NameFilter, DEFAULT_PROC_ROOT};
use crate::error::ConfigError;

// Default configuration constants
pub const DEFAULT_INTERVAL_SECONDS: u64 = 5;
pub const DEFAULT_LOG_PATH: &str = "/var/log/sysmon/metrics.jsonl";
pub const DEFAULT_DAEMON_LOG: &str = "/var/log/sysmon/monitor.log";
pub const DEFAULT_PID_FILE: &str = "/run/sysmon.pid";
pub const DEFAULT_LOG_BACKUPS: usize = 7;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub const ENV_INTERVAL: &str = "SYSMON_INTERVAL";
pub const ENV_LOG: &str = "SYSMON_LOG";
pub const ENV_PIDFILE: &str = "SYSMON_PIDFILE";
pub const ENV_CONFIG: &str = "SYSMON_CONFIG";

const DEFAULT_CONFIG_PATHS: [&str; 8] = [
    "/etc/sysmon/monitor.yaml",
    "/etc/sysmon/monitor.yml",
    "/etc/sysmon/monitor.json",
    "/etc/sysmon/monitor.toml",
    "./monitor.yaml",
    "./monitor.yml",
    "./monitor.json",
    "./monitor.toml",
];

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Daemon configuration. Loaded once at startup and on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Sampling cadence in seconds
    #[serde(alias = "interval")]
    pub interval_seconds: u64,

    /// Metrics record sink; "-" for standard output
    #[serde(alias = "log-path")]
    pub log_path: PathBuf,

    /// PID file, locked for the daemon's lifetime
    #[serde(alias = "pid-file", alias = "pidfile")]
    pub pid_file: PathBuf,

    /// Diagnostics destination once detached
    #[serde(alias = "daemon-log")]
    pub daemon_log: PathBuf,

    /// Allow-list of block device name patterns (regex)
    pub devices: Option<Vec<String>>,

    /// Allow-list of network interface name patterns (regex)
    pub interfaces: Option<Vec<String>>,

    /// Report filesystem capacity per mount point
    pub filesystems: bool,

    /// Rotated metrics logs to keep (0 disables daily rotation)
    #[serde(alias = "log-backups")]
    pub log_backups: usize,

    /// Consecutive failed ticks before the daemon gives up
    #[serde(alias = "max-consecutive-failures")]
    pub max_consecutive_failures: u32,

    /// procfs mount point
    #[serde(alias = "proc-root")]
    pub proc_root: PathBuf,

    /// off, error, warn, info, debug, trace
    #[serde(alias = "log-level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            daemon_log: PathBuf::from(DEFAULT_DAEMON_LOG),
            devices: None,
            interfaces: None,
            filesystems: true,
            log_backups: DEFAULT_LOG_BACKUPS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            log_level: "info".into(),
        }
    }
}

impl DaemonConfig {
    /// Compiles the device and interface allow-lists.
    pub fn filters(&self) -> Result<Filters, ConfigError> {
        Ok(Filters {
            devices: NameFilter::new("devices", self.devices.as_deref().unwrap_or_default())?,
            interfaces: NameFilter::new(
                "interfaces",
                self.interfaces.as_deref().unwrap_or_default(),
            )?,
        })
    }

    /// True when metrics go to standard output rather than a file.
    pub fn logs_to_stdout(&self) -> bool {
        self.log_path.as_os_str() == "-"
    }

    /// Validates values and that the log and PID file locations are writable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_values()?;

        if !self.logs_to_stdout() {
            check_writable("Metrics log", &self.log_path)?;
        }
        check_writable("PID file", &self.pid_file)?;
        check_writable("Daemon log", &self.daemon_log)?;
        Ok(())
    }

    /// Resolves relative paths against `base`, the directory the daemon was started from.
    pub fn absolutize(&mut self, base: &Path) {
        absolutize(&mut self.log_path, base);
        absolutize(&mut self.pid_file, base);
        absolutize(&mut self.daemon_log, base);
        absolutize(&mut self.proc_root, base);
    }

    /// Creates the parent directories of the log and PID files.
    pub fn create_parent_dirs(&self) -> Result<(), ConfigError> {
        let mut targets = vec![("PID file", &self.pid_file), ("Daemon log", &self.daemon_log)];
        if !self.logs_to_stdout() {
            targets.push(("Metrics log", &self.log_path));
        }
        for (what, path) in targets {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| ConfigError::NotWritable {
                    what,
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Validates everything that does not touch the filesystem.
    pub fn validate_values(&self) -> Result<(), ConfigError> {
        if self.interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "interval_seconds",
                message: "must be at least 1".into(),
            });
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_consecutive_failures",
                message: "must be at least 1".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                name: "log_level",
                message: format!(
                    "'{}', expected one of {}",
                    self.log_level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        for (name, path) in [
            ("log_path", &self.log_path),
            ("pid_file", &self.pid_file),
            ("daemon_log", &self.daemon_log),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    name,
                    message: "must not be empty".into(),
                });
            }
        }
        self.filters()?;
        Ok(())
    }
}

/// Values given on the command line. `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub no_config: bool,
    pub interval_seconds: Option<u64>,
    pub log_path: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Resolves configuration from CLI overrides, the process environment, a config
/// file and defaults.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<DaemonConfig, ConfigError> {
    resolve_config_with_env(overrides, |key| std::env::var(key).ok())
}

/// Same as [`resolve_config`] with an injectable environment lookup.
pub fn resolve_config_with_env<F>(
    overrides: &ConfigOverrides,
    env: F,
) -> Result<DaemonConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if overrides.no_config {
        DaemonConfig::default()
    } else {
        let path = overrides
            .config_path
            .clone()
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from));
        load_config(path.as_deref())?
    };

    // Environment
    if let Some(raw) = env(ENV_INTERVAL) {
        config.interval_seconds =
            raw.trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: "SYSMON_INTERVAL",
                    message: format!("'{}': {}", raw, e),
                })?;
    }
    if let Some(path) = env(ENV_LOG) {
        config.log_path = PathBuf::from(path);
    }
    if let Some(path) = env(ENV_PIDFILE) {
        config.pid_file = PathBuf::from(path);
    }

    // CLI
    if let Some(interval) = overrides.interval_seconds {
        config.interval_seconds = interval;
    }
    if let Some(path) = &overrides.log_path {
        config.log_path = path.clone();
    }
    if let Some(path) = &overrides.pid_file {
        config.pid_file = path.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.log_level = level.clone();
    }

    Ok(config)
}

/// Loads a config file, or the first one found in the default locations.
/// Returns defaults when no file exists.
pub fn load_config(path: Option<&Path>) -> Result<DaemonConfig, ConfigError> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::Read {
                    path: p.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                });
            }
            p.to_path_buf()
        }
        None => match locate_config() {
            Some(p) => p,
            None => return Ok(DaemonConfig::default()),
        },
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let parse_err = |message: String| ConfigError::Parse {
        path: path.clone(),
        message,
    };

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        _ => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// First config file found in the default locations.
pub fn locate_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

/// Joins a relative `path` onto `base`. "-" is left alone.
pub fn absolutize(path: &mut PathBuf, base: &Path) {
    if path.is_relative() && path.as_os_str() != "-" && !path.as_os_str().is_empty() {
        *path = base.join(&*path);
    }
}

/// Checks that `path` can be written, or created in its nearest existing ancestor.
fn check_writable(what: &'static str, path: &Path) -> Result<(), ConfigError> {
    let not_writable = |reason: String| ConfigError::NotWritable {
        what,
        path: path.to_path_buf(),
        reason,
    };

    if path.is_dir() {
        return Err(not_writable("is a directory".into()));
    }
    if path.exists() {
        return access(path, AccessFlags::W_OK).map_err(|e| not_writable(e.to_string()));
    }

    let mut dir = path.parent();
    while let Some(candidate) = dir {
        let candidate = if candidate.as_os_str().is_empty() {
            Path::new(".")
        } else {
            candidate
        };
        if candidate.exists() {
            if !candidate.is_dir() {
                return Err(not_writable(format!(
                    "{} is not a directory",
                    candidate.display()
                )));
            }
            return access(candidate, AccessFlags::W_OK | AccessFlags::X_OK)
                .map_err(|e| not_writable(format!("{}: {}", candidate.display(), e)));
        }
        dir = candidate.parent();
    }
    Err(not_writable("no existing parent directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_file() -> ConfigOverrides {
        ConfigOverrides {
            no_config: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = resolve_config_with_env(&no_file(), env_of(&[])).unwrap();
        assert_eq!(cfg, DaemonConfig::default());
        assert_eq!(cfg.interval_seconds, 5);
        assert_eq!(cfg.max_consecutive_failures, 3);
    }

    #[test]
    fn test_env_overrides_file_and_cli_overrides_env() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("monitor.yaml");
        fs::write(&file, "interval_seconds: 30\nlog_path: /from/file.jsonl\n").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(file),
            interval_seconds: Some(2),
            ..Default::default()
        };
        let env = env_of(&[
            ("SYSMON_INTERVAL", "10"),
            ("SYSMON_LOG", "/from/env.jsonl"),
            ("SYSMON_PIDFILE", "/from/env.pid"),
        ]);

        let cfg = resolve_config_with_env(&overrides, env).unwrap();
        assert_eq!(cfg.interval_seconds, 2);
        assert_eq!(cfg.log_path, PathBuf::from("/from/env.jsonl"));
        assert_eq!(cfg.pid_file, PathBuf::from("/from/env.pid"));
    }

    #[test]
    fn test_config_path_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("monitor.json");
        fs::write(&file, r#"{"interval_seconds": 9, "devices": ["sd[a-z]"]}"#).unwrap();

        let env = env_of(&[("SYSMON_CONFIG", file.to_str().unwrap())]);
        let cfg = resolve_config_with_env(&ConfigOverrides::default(), env).unwrap();
        assert_eq!(cfg.interval_seconds, 9);
        assert_eq!(cfg.devices, Some(vec!["sd[a-z]".to_string()]));
        assert!(cfg.filesystems);
    }

    #[test]
    fn test_load_toml_with_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("monitor.toml");
        fs::write(
            &file,
            "interval = 15\npidfile = \"/tmp/m.pid\"\ninterfaces = [\"eth0\"]\n",
        )
        .unwrap();

        let cfg = load_config(Some(&file)).unwrap();
        assert_eq!(cfg.interval_seconds, 15);
        assert_eq!(cfg.pid_file, PathBuf::from("/tmp/m.pid"));
        assert_eq!(cfg.interfaces, Some(vec!["eth0".to_string()]));
    }

    #[test]
    fn test_invalid_env_interval() {
        let result = resolve_config_with_env(&no_file(), env_of(&[("SYSMON_INTERVAL", "soon")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let overrides = ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/monitor.yaml")),
            ..Default::default()
        };
        let result = resolve_config_with_env(&overrides, env_of(&[]));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("monitor.yaml");
        fs::write(&file, "interval_seconds: [not, a, number]\n").unwrap();
        assert!(matches!(
            load_config(Some(&file)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_values() {
        let mut cfg = DaemonConfig::default();
        assert!(cfg.validate_values().is_ok());

        cfg.interval_seconds = 0;
        assert!(cfg.validate_values().is_err());

        let mut cfg = DaemonConfig::default();
        cfg.log_level = "loud".into();
        assert!(cfg.validate_values().is_err());

        let mut cfg = DaemonConfig::default();
        cfg.devices = Some(vec!["sd(".into()]);
        assert!(matches!(
            cfg.validate_values(),
            Err(ConfigError::Pattern { .. })
        ));

        let mut cfg = DaemonConfig::default();
        cfg.max_consecutive_failures = 0;
        assert!(cfg.validate_values().is_err());
    }

    #[test]
    fn test_validate_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DaemonConfig {
            log_path: dir.path().join("logs/nested/metrics.jsonl"),
            pid_file: dir.path().join("monitor.pid"),
            daemon_log: dir.path().join("monitor.log"),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());

        let cfg = DaemonConfig {
            pid_file: dir.path().to_path_buf(),
            ..cfg
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NotWritable { .. })
        ));
    }

    #[test]
    fn test_absolutize_and_create_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = DaemonConfig {
            log_path: PathBuf::from("out/metrics.jsonl"),
            pid_file: PathBuf::from("run/monitor.pid"),
            daemon_log: dir.path().join("logs/monitor.log"),
            ..Default::default()
        };
        cfg.absolutize(dir.path());
        assert_eq!(cfg.log_path, dir.path().join("out/metrics.jsonl"));
        assert_eq!(cfg.pid_file, dir.path().join("run/monitor.pid"));
        assert_eq!(cfg.proc_root, PathBuf::from("/proc"));

        cfg.create_parent_dirs().unwrap();
        assert!(dir.path().join("out").is_dir());
        assert!(dir.path().join("run").is_dir());
        assert!(dir.path().join("logs").is_dir());

        let mut stdout = PathBuf::from("-");
        absolutize(&mut stdout, dir.path());
        assert_eq!(stdout, PathBuf::from("-"));
    }

    #[test]
    fn test_stdout_log_path_skips_writability() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DaemonConfig {
            log_path: PathBuf::from("-"),
            pid_file: dir.path().join("monitor.pid"),
            daemon_log: dir.path().join("monitor.log"),
            ..Default::default()
        };
        assert!(cfg.logs_to_stdout());
        assert!(cfg.validate().is_ok());
    }
}
