//! System Monitor Library
//!
//! Core of the `monitor` daemon: samples kernel counters at a fixed interval,
//! turns consecutive samples into utilization figures and per-second rates, and
//! appends one JSON record per interval to a log.
//!
//! # Components
//!
//! - **Counter source** ([`collectors`]): reads `/proc/stat`, `/proc/meminfo`,
//!   `/proc/diskstats`, `/proc/net/dev` and mounted filesystem capacity
//! - **Sampler** ([`sampler`]): differences two raw samples into [`DerivedMetrics`]
//! - **Emitter** ([`emitter`]): durable, daily-rotated JSON-lines sink
//! - **Daemon lifecycle** ([`daemon`]): PID file lock, detaching, signals
//! - **Scheduler** ([`scheduler`]): drift-free tick loop with failure escalation
//!
//! # Usage
//!
//! ```no_run
//! use sysmon::collectors::{CounterSource, Filters, ProcCounterSource};
//! use sysmon::sampler::Sampler;
//!
//! let mut source = ProcCounterSource::new("/proc", Filters::default(), false);
//! let mut sampler = Sampler::new();
//!
//! sampler.observe(source.read_counters()?)?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! if let Some(metrics) = sampler.observe(source.read_counters()?)? {
//!     println!("CPU: {}%", metrics.cpu.utilization_percent);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod collectors;
pub mod config;
pub mod daemon;
pub mod emitter;
pub mod error;
pub mod sampler;
pub mod scheduler;

// Re-export main types for convenience
pub use collectors::{CounterSource, ProcCounterSource, RawSample};
pub use config::DaemonConfig;
pub use emitter::Emitter;
pub use error::ExitStatus;
pub use sampler::{DerivedMetrics, Sampler};
pub use scheduler::Scheduler;
