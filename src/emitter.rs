//! Metrics record sink.
//!
//! Each [`DerivedMetrics`] is written as one JSON object per line. Records are
//! flushed (and fsync'ed for files) before `emit` returns, so a crash loses at
//! most the record being written.
//!
//! File sinks rotate daily: when a record's UTC date differs from the date of
//! the data already in the file, the file is renamed to `<path>.<YYYY-MM-DD>`
//! and a new one is started. Only the newest `backups` rotated files are kept.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::EmitError;
use crate::sampler::DerivedMetrics;

/// Where records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Stdout,
    File(PathBuf),
}

impl SinkTarget {
    /// `-` selects standard output, anything else is a file path.
    pub fn from_path(path: &Path) -> Self {
        if path.as_os_str() == "-" {
            SinkTarget::Stdout
        } else {
            SinkTarget::File(path.to_path_buf())
        }
    }

    fn describe(&self) -> String {
        match self {
            SinkTarget::Stdout => "stdout".to_string(),
            SinkTarget::File(path) => path.display().to_string(),
        }
    }
}

/// Appends metrics records to a sink.
#[derive(Debug)]
pub struct Emitter {
    target: SinkTarget,
    file: Option<File>,
    /// Date of the data currently in the file.
    opened_on: Option<NaiveDate>,
    backups: usize,
}

impl Emitter {
    /// Opens the sink. `backups` is the number of rotated files to keep; 0 disables rotation.
    pub fn open(target: SinkTarget, backups: usize) -> Result<Self, EmitError> {
        let mut emitter = Self {
            target,
            file: None,
            opened_on: None,
            backups,
        };
        emitter.open_file()?;
        Ok(emitter)
    }

    pub fn target(&self) -> &SinkTarget {
        &self.target
    }

    /// Switches to a new target and rotation policy, reopening the sink.
    pub fn retarget(&mut self, target: SinkTarget, backups: usize) -> Result<(), EmitError> {
        self.target = target;
        self.backups = backups;
        self.reopen()
    }

    /// Closes and reopens the sink, e.g. after an external logrotate.
    pub fn reopen(&mut self) -> Result<(), EmitError> {
        self.file = None;
        self.opened_on = None;
        self.open_file()
    }

    /// Writes one record and flushes it to the sink.
    pub fn emit(&mut self, metrics: &DerivedMetrics) -> Result<(), EmitError> {
        let mut line = serde_json::to_vec(metrics)?;
        line.push(b'\n');

        if self.target == SinkTarget::Stdout {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            return lock
                .write_all(&line)
                .and_then(|_| lock.flush())
                .map_err(|source| self.write_error(source));
        }

        let record_date = metrics.timestamp.date_naive();
        self.rotate_if_needed(record_date);
        if self.file.is_none() {
            let opened_on = self.opened_on;
            self.open_file()?;
            self.opened_on = opened_on.or(self.opened_on);
        }

        let result = match self.file.as_mut() {
            Some(file) => file
                .write_all(&line)
                .and_then(|_| file.flush())
                .and_then(|_| file.sync_data()),
            None => Ok(()),
        };

        if let Err(source) = result {
            // Drop the handle so the next tick retries with a fresh open
            self.file = None;
            return Err(self.write_error(source));
        }
        if self.opened_on.is_none() {
            self.opened_on = Some(record_date);
        }
        Ok(())
    }

    fn write_error(&self, source: io::Error) -> EmitError {
        EmitError::Write {
            sink: self.target.describe(),
            source,
        }
    }

    fn open_file(&mut self) -> Result<(), EmitError> {
        let SinkTarget::File(path) = &self.target else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| self.write_error(source))?;

        // Existing data dates from its last write; an empty file takes the date
        // of the first record written to it.
        self.opened_on = file
            .metadata()
            .ok()
            .filter(|m| m.len() > 0)
            .and_then(|m| m.modified().ok())
            .map(|t| DateTime::<Utc>::from(t).date_naive());
        self.file = Some(file);
        debug!("Opened metrics sink {}", path.display());
        Ok(())
    }

    fn rotate_if_needed(&mut self, record_date: NaiveDate) {
        if self.backups == 0 {
            return;
        }
        let Some(opened_on) = self.opened_on else {
            return;
        };
        if opened_on == record_date {
            return;
        }
        let SinkTarget::File(path) = self.target.clone() else {
            return;
        };

        let rotated = rotated_name(&path, opened_on);
        match fs::rename(&path, &rotated) {
            Ok(()) => {
                info!("Rotated {} to {}", path.display(), rotated.display());
                self.file = None;
                self.opened_on = None;
                prune_backups(&path, self.backups);
            }
            Err(e) => {
                // Keep appending; the next attempt is at the next change of date.
                warn!("Failed to rotate {}: {}", path.display(), e);
                self.opened_on = Some(record_date);
            }
        }
    }
}

/// `<path>.<date>`, with a numeric suffix if that name is taken.
fn rotated_name(path: &Path, date: NaiveDate) -> PathBuf {
    let base = format!("{}.{}", path.display(), date.format("%Y-%m-%d"));
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}.{}", base, n));
        n += 1;
    }
    candidate
}

/// Removes the oldest rotated files so that at most `keep` remain.
fn prune_backups(path: &Path, keep: usize) {
    let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
        return;
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let prefix = format!("{}.", file_name.to_string_lossy());

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut rotated: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let suffix = name.strip_prefix(&prefix)?;
            let date = suffix.get(..10)?;
            NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            Some((suffix.to_string(), entry.path()))
        })
        .collect();

    if rotated.len() <= keep {
        return;
    }
    // Date-prefixed suffixes sort chronologically
    rotated.sort();
    let excess = rotated.len() - keep;
    for (_, old) in rotated.into_iter().take(excess) {
        match fs::remove_file(&old) {
            Ok(()) => debug!("Removed old metrics log {}", old.display()),
            Err(e) => warn!("Failed to remove old metrics log {}: {}", old.display(), e),
        }
    }
}
