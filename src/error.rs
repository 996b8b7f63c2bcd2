//! Error taxonomy for the monitor.
//!
//! Startup errors (`ConfigError`, `DaemonizeError`) are fatal. Per-tick errors
//! (`SourceError`, `SampleError`, `EmitError`) are recoverable and are folded
//! into `TickError` so the scheduler can count consecutive failures.

use std::io;
use std::path::PathBuf;

/// Configuration could not be loaded or failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },

    #[error("Invalid {name} pattern '{pattern}': {source}")]
    Pattern {
        name: &'static str,
        pattern: String,
        source: regex::Error,
    },

    #[error("{what} {path} is not writable: {reason}")]
    NotWritable {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },
}

/// Detaching from the terminal or claiming the PID file failed.
#[derive(Debug, thiserror::Error)]
pub enum DaemonizeError {
    #[error("fork failed: {0}")]
    Fork(nix::Error),

    #[error("setsid failed: {0}")]
    Setsid(nix::Error),

    #[error("Failed to change working directory to /: {0}")]
    Chdir(nix::Error),

    #[error("Failed to redirect standard streams: {0}")]
    Redirect(String),

    #[error("Failed to create startup status pipe: {0}")]
    Readiness(nix::Error),

    #[error("Failed to open PID file {path}: {source}")]
    PidFileOpen { path: PathBuf, source: io::Error },

    #[error("Failed to lock PID file {path}: {source}")]
    PidFileLock { path: PathBuf, source: nix::Error },

    #[error("Failed to write PID file {path}: {source}")]
    PidFileWrite { path: PathBuf, source: io::Error },

    #[error("Stale PID file {path} ({detail})")]
    StaleLock { path: PathBuf, detail: String },

    #[error("Failed to install signal handler: {0}")]
    Signal(io::Error),

    #[error("Failed to build async runtime: {0}")]
    Runtime(io::Error),
}

/// A statistics interface could not be read or had an unexpected format.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl SourceError {
    pub(crate) fn parse(path: &std::path::Path, message: impl Into<String>) -> Self {
        SourceError::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Two samples cannot be differenced.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Non-monotonic sample: current timestamp is not after previous ({elapsed_ns} ns)")]
    NonMonotonicSample { elapsed_ns: i128 },
}

/// The metrics sink rejected a record.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("Failed to write metrics record to {sink}: {source}")]
    Write { sink: String, source: io::Error },

    #[error("Failed to encode metrics record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Any failure that aborts a single tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Process exit status for the `monitor` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Success, including "already running" no-ops.
    Success,
    /// Configuration error.
    Config,
    /// Daemonization failure.
    Daemonize,
    /// PID file held by a stale or unreachable lock.
    PidConflict,
    /// Runtime failure threshold reached.
    TickFailures,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Config => 1,
            ExitStatus::Daemonize => 2,
            ExitStatus::PidConflict => 3,
            ExitStatus::TickFailures => 4,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

impl From<&DaemonizeError> for ExitStatus {
    fn from(err: &DaemonizeError) -> Self {
        match err {
            DaemonizeError::StaleLock { .. } => ExitStatus::PidConflict,
            _ => ExitStatus::Daemonize,
        }
    }
}
