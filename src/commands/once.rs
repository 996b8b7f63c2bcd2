//! Once command implementation.
//!
//! Samples in the foreground without touching the PID file, useful for trying
//! out a configuration.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use sysmon::collectors::ProcCounterSource;
use sysmon::config::{resolve_config, ConfigOverrides};
use sysmon::emitter::{Emitter, SinkTarget};
use sysmon::error::ExitStatus;
use sysmon::scheduler::{Scheduler, TickOutcome};

/// Takes `samples` samples `interval` seconds apart and emits the derived records.
pub fn command_once(
    base: ConfigOverrides,
    samples: usize,
    interval: Option<u64>,
    log: PathBuf,
) -> ExitStatus {
    let overrides = ConfigOverrides {
        interval_seconds: interval,
        log_path: Some(log),
        ..base
    };
    let config = match resolve_config(&overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            return ExitStatus::Config;
        }
    };
    if let Err(e) = config.validate_values() {
        eprintln!("❌ Configuration invalid: {}", e);
        return ExitStatus::Config;
    }
    let filters = match config.filters() {
        Ok(filters) => filters,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            return ExitStatus::Config;
        }
    };
    let emitter = match Emitter::open(SinkTarget::from_path(&config.log_path), config.log_backups)
    {
        Ok(emitter) => emitter,
        Err(e) => {
            eprintln!("❌ Cannot open metrics log: {}", e);
            return ExitStatus::Config;
        }
    };

    if samples < 2 {
        warn!("At least two samples are needed to produce a record");
    }

    let source = ProcCounterSource::new(&config.proc_root, filters, config.filesystems);
    let mut scheduler = Scheduler::new(source, emitter, &config);
    let pause = Duration::from_secs(config.interval_seconds);

    let mut emitted = 0;
    for sample in 1..=samples {
        match scheduler.tick() {
            Ok(TickOutcome::Emitted) => emitted += 1,
            Ok(TickOutcome::Baseline) => {}
            Err(e) => {
                eprintln!("❌ Sample {}/{} failed: {}", sample, samples, e);
                return ExitStatus::TickFailures;
            }
        }
        if sample < samples {
            thread::sleep(pause);
        }
    }

    info!("Emitted {} record(s) from {} sample(s)", emitted, samples);
    ExitStatus::Success
}
