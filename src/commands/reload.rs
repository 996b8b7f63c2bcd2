//! Reload command implementation.

use std::path::PathBuf;

use nix::sys::signal::Signal;

use sysmon::config::{resolve_config, ConfigOverrides};
use sysmon::daemon::signal_daemon;
use sysmon::error::ExitStatus;

/// Sends SIGHUP to the running daemon so it re-reads its configuration.
pub fn command_reload(base: ConfigOverrides, pidfile: Option<PathBuf>) -> ExitStatus {
    let overrides = ConfigOverrides {
        pid_file: pidfile,
        ..base
    };
    let config = match resolve_config(&overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            return ExitStatus::Config;
        }
    };

    match signal_daemon(&config.pid_file, Signal::SIGHUP) {
        Ok(pid) => {
            println!("✅ Reload requested (pid {})", pid);
            ExitStatus::Success
        }
        Err(e) => {
            eprintln!("❌ Monitor is not running: {}", e);
            ExitStatus::from(&e)
        }
    }
}
