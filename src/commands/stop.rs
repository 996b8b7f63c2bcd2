//! Stop command implementation.
//!
//! Sends SIGTERM to the daemon holding the PID file lock and optionally
//! waits for it to exit. A PID file nobody has locked is reported as stale
//! and its pid is left alone.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use tracing::{debug, info};

use sysmon::config::{resolve_config, ConfigOverrides};
use sysmon::daemon::{process_alive, signal_daemon};
use sysmon::error::ExitStatus;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stops a running daemon. Not running at all is a success.
pub fn command_stop(base: ConfigOverrides, pidfile: Option<PathBuf>, wait: u64) -> ExitStatus {
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

    if !config.pid_file.exists() {
        println!("ℹ️  Monitor is not running ({})", config.pid_file.display());
        return ExitStatus::Success;
    }

    let pid = match signal_daemon(&config.pid_file, Signal::SIGTERM) {
        Ok(pid) => pid,
        Err(e) => {
            eprintln!("❌ {}; remove the file if no monitor is running", e);
            return ExitStatus::from(&e);
        }
    };
    info!("Sent SIGTERM to monitor (pid {})", pid);

    if wait == 0 {
        println!("✅ Stop requested (pid {})", pid);
        return ExitStatus::Success;
    }

    let deadline = Instant::now() + Duration::from_secs(wait);
    while Instant::now() < deadline {
        if !process_alive(pid) {
            println!("✅ Monitor stopped (pid {})", pid);
            return ExitStatus::Success;
        }
        thread::sleep(POLL_INTERVAL);
    }

    debug!("pid {} still alive after {}s", pid, wait);
    eprintln!("❌ Monitor (pid {}) did not exit within {}s", pid, wait);
    ExitStatus::Daemonize
}
