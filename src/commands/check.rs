//! Check command implementation.
//!
//! Validates configuration, counter sources and the PID file.

use std::path::PathBuf;

use sysmon::collectors::{filesystem, FamilyKind, ProcCounterSource};
use sysmon::config::{resolve_config, ConfigOverrides};
use sysmon::daemon::locked_daemon_pid;
use sysmon::error::ExitStatus;

/// Validates configuration and counter sources.
pub fn command_check(
    base: ConfigOverrides,
    interval: Option<u64>,
    log: Option<PathBuf>,
    pidfile: Option<PathBuf>,
) -> ExitStatus {
    println!("🔍 System Monitor - System Check");
    println!("================================");

    let overrides = ConfigOverrides {
        interval_seconds: interval,
        log_path: log,
        pid_file: pidfile,
        ..base
    };

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    let config = match resolve_config(&overrides) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            return ExitStatus::Config;
        }
    };
    if let Err(e) = config.validate() {
        println!("   ❌ Configuration invalid: {}", e);
        return ExitStatus::Config;
    }
    println!("   ✅ Configuration is valid");
    println!("   ├─ Interval: {}s", config.interval_seconds);
    println!("   ├─ Metrics log: {}", config.log_path.display());
    println!("   ├─ PID file: {}", config.pid_file.display());
    println!("   └─ Daemon log: {}", config.daemon_log.display());

    let mut all_ok = true;

    // Check counter sources
    println!("\n📁 Checking counter sources in {}...", config.proc_root.display());
    let filters = match config.filters() {
        Ok(filters) => filters,
        Err(e) => {
            println!("   ❌ {}", e);
            return ExitStatus::Config;
        }
    };
    let source = ProcCounterSource::new(&config.proc_root, filters, config.filesystems);
    for kind in FamilyKind::ALL {
        match source.read_family(kind) {
            Ok(_) => println!("   ✅ {} ({})", kind.name(), kind.relative_path()),
            Err(e) => {
                println!("   ❌ {}: {}", kind.name(), e);
                all_ok = false;
            }
        }
    }

    if config.filesystems {
        match filesystem::read_filesystem_usage(&config.proc_root.join("mounts")) {
            Ok(usage) => println!("   ✅ filesystems ({} mounted)", usage.len()),
            Err(e) => {
                println!("   ❌ filesystems: {}", e);
                all_ok = false;
            }
        }
    }

    // Check daemon state
    println!("\n📋 Checking daemon state...");
    if !config.pid_file.exists() {
        println!("   ℹ️  Not running");
    } else {
        match locked_daemon_pid(&config.pid_file) {
            Ok(pid) => println!("   ✅ Running with pid {}", pid),
            Err(e) => println!("   ⚠️  {}", e),
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        ExitStatus::Success
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        ExitStatus::Config
    }
}
