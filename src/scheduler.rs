//! Fixed-cadence tick loop: read counters, derive metrics, emit.
//!
//! Ticks are scheduled against absolute deadlines (`tick_start + interval`), so
//! processing time does not accumulate as drift. A tick that overruns its
//! interval is followed immediately by the next one. Stop and reload requests
//! are only acted upon between ticks, never in the middle of one.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::collectors::CounterSource;
use crate::config::DaemonConfig;
use crate::daemon::Control;
use crate::emitter::{Emitter, SinkTarget};
use crate::error::{ConfigError, TickError};
use crate::sampler::Sampler;

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// A stop was requested, or the control channel closed.
    Stopped,
    /// Too many consecutive ticks failed.
    Escalated,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub emitted: u64,
    pub failed: u64,
    pub exit: SchedulerExit,
}

/// Result of one successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First sample (or first after a reset) stored as baseline.
    Baseline,
    Emitted,
}

pub struct Scheduler<S> {
    source: S,
    sampler: Sampler,
    emitter: Emitter,
    interval: Duration,
    max_failures: u32,
    log_path: std::path::PathBuf,
    log_backups: usize,
}

impl<S: CounterSource> Scheduler<S> {
    pub fn new(source: S, emitter: Emitter, config: &DaemonConfig) -> Self {
        Self {
            source,
            sampler: Sampler::new(),
            emitter,
            interval: Duration::from_secs(config.interval_seconds),
            max_failures: config.max_consecutive_failures,
            log_path: config.log_path.clone(),
            log_backups: config.log_backups,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one tick: read counters, derive metrics against the previous sample, emit.
    #[instrument(skip(self))]
    pub fn tick(&mut self) -> Result<TickOutcome, TickError> {
        let raw = self.source.read_counters()?;
        match self.sampler.observe(raw)? {
            None => Ok(TickOutcome::Baseline),
            Some(metrics) => {
                self.emitter.emit(&metrics)?;
                Ok(TickOutcome::Emitted)
            }
        }
    }

    /// Ticks until stopped or until `max_consecutive_failures` ticks in a row fail.
    ///
    /// `reload` produces a fresh configuration when a [`Control::Reload`] arrives.
    /// A reload that fails leaves the running configuration untouched.
    pub async fn run<F>(&mut self, control: &mut mpsc::Receiver<Control>, mut reload: F) -> RunSummary
    where
        F: FnMut() -> Result<DaemonConfig, ConfigError>,
    {
        let mut summary = RunSummary {
            ticks: 0,
            emitted: 0,
            failed: 0,
            exit: SchedulerExit::Stopped,
        };
        let mut consecutive_failures: u32 = 0;

        loop {
            let tick_start = Instant::now();
            summary.ticks += 1;

            match self.tick() {
                Ok(TickOutcome::Emitted) => {
                    consecutive_failures = 0;
                    summary.emitted += 1;
                }
                Ok(TickOutcome::Baseline) => {
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    summary.failed += 1;
                    warn!(
                        consecutive_failures,
                        "Tick {} failed: {}", summary.ticks, e
                    );
                    if consecutive_failures >= self.max_failures {
                        error!(
                            consecutive_failures,
                            "Giving up after {} consecutive failed ticks, last error: {}",
                            consecutive_failures,
                            e
                        );
                        summary.exit = SchedulerExit::Escalated;
                        return summary;
                    }
                }
            }

            let elapsed = tick_start.elapsed();
            if elapsed > self.interval {
                warn!(
                    "Tick took {:?}, longer than the {:?} interval",
                    elapsed, self.interval
                );
            } else {
                debug!("Tick completed in {:?}", elapsed);
            }

            let mut deadline = tick_start + self.interval;
            loop {
                tokio::select! {
                    biased;
                    message = control.recv() => match message {
                        Some(Control::Stop) | None => {
                            info!("Stopping scheduler after {} ticks", summary.ticks);
                            return summary;
                        }
                        Some(Control::Reload) => {
                            match reload() {
                                Ok(config) => self.apply(&config),
                                Err(e) => warn!("Reload failed, keeping current configuration: {}", e),
                            }
                            deadline = tick_start + self.interval;
                        }
                    },
                    _ = sleep_until(deadline) => break,
                }
            }
        }
    }

    /// Applies a reloaded configuration between ticks.
    pub fn apply(&mut self, config: &DaemonConfig) {
        let filters = match config.filters() {
            Ok(filters) => filters,
            Err(e) => {
                warn!("Reload rejected: {}", e);
                return;
            }
        };

        let interval = Duration::from_secs(config.interval_seconds);
        if interval != self.interval {
            info!("Interval changed from {:?} to {:?}", self.interval, interval);
            self.interval = interval;
        }
        self.max_failures = config.max_consecutive_failures;

        // Device sets may change under new filters; start from a fresh baseline.
        self.source.reconfigure(filters, config.filesystems);
        self.sampler.reset();

        if config.log_path != self.log_path || config.log_backups != self.log_backups {
            let target = SinkTarget::from_path(&config.log_path);
            match self.emitter.retarget(target, config.log_backups) {
                Ok(()) => info!("Metrics log now {}", config.log_path.display()),
                Err(e) => warn!("Failed to open {}: {}", config.log_path.display(), e),
            }
            self.log_path = config.log_path.clone();
            self.log_backups = config.log_backups;
        } else if let Err(e) = self.emitter.reopen() {
            warn!("Failed to reopen metrics log: {}", e);
        }

        info!("Configuration reloaded");
    }
}
