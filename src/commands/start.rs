//! Start command implementation.
//!
//! Hands the merged command-line overrides to the daemon lifecycle.

use std::path::PathBuf;

use sysmon::config::ConfigOverrides;
use sysmon::daemon::{self, StartOptions};
use sysmon::error::ExitStatus;

/// Starts the daemon, detached unless `foreground` is set.
pub fn command_start(
    base: ConfigOverrides,
    interval: Option<u64>,
    log: Option<PathBuf>,
    pidfile: Option<PathBuf>,
    foreground: bool,
) -> ExitStatus {
    let overrides = ConfigOverrides {
        interval_seconds: interval,
        log_path: log,
        pid_file: pidfile,
        ..base
    };

    daemon::start(StartOptions {
        overrides,
        foreground,
    })
}
