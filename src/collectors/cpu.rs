//! CPU tick counters from /proc/stat.

use std::path::Path;

use serde::Serialize;

use crate::error::SourceError;

/// Cumulative CPU time per mode, in clock ticks, for the aggregate `cpu` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTicks {
    /// Calculate total CPU time (all fields).
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Calculate non-active time (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Mode name and value pairs, in /proc/stat column order.
    pub fn modes(&self) -> [(&'static str, u64); 8] {
        [
            ("user", self.user),
            ("nice", self.nice),
            ("system", self.system),
            ("idle", self.idle),
            ("iowait", self.iowait),
            ("irq", self.irq),
            ("softirq", self.softirq),
            ("steal", self.steal),
        ]
    }
}

/// Parses the aggregate `cpu` line of /proc/stat.
///
/// Format: "cpu  user nice system idle iowait irq softirq steal guest guest_nice".
/// The steal column is absent on very old kernels and defaults to 0.
pub fn parse_cpu_ticks(path: &Path, content: &str) -> Result<CpuTicks, SourceError> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| SourceError::parse(path, "aggregate 'cpu' line not found"))?;

    let values = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|e| SourceError::parse(path, format!("invalid cpu tick value: {}", e)))?;

    if values.len() < 7 {
        return Err(SourceError::parse(
            path,
            format!("expected at least 7 cpu fields, got {}", values.len()),
        ));
    }

    Ok(CpuTicks {
        user: values[0],
        nice: values[1],
        system: values[2],
        idle: values[3],
        iowait: values[4],
        irq: values[5],
        softirq: values[6],
        steal: values.get(7).copied().unwrap_or(0),
    })
}
