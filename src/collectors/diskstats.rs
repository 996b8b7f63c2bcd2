//! Disk I/O counters from /proc/diskstats.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use super::NameFilter;
use crate::error::SourceError;

/// Size of a /proc/diskstats sector, independent of the device's physical sector size.
pub const SECTOR_SIZE: u64 = 512;

/// Cumulative I/O counters for a single block device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskCounters {
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
    pub time_io_ms: u64,
}

/// Parses /proc/diskstats into a map of device name to counters.
///
/// Format: major minor name read_ios read_merges read_sectors read_ticks write_ios
/// write_merges write_sectors write_ticks ios_in_progress time_in_queue weighted_time_in_queue
///
/// Lines with fewer than 14 fields are skipped. Without an allow-list, loop and ram
/// devices are skipped.
pub fn parse_diskstats(
    path: &Path,
    content: &str,
    filter: &NameFilter,
) -> Result<BTreeMap<String, DiskCounters>, SourceError> {
    let mut stats = BTreeMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }

        let device = parts[2];
        if filter.is_unrestricted() {
            if device.starts_with("loop") || device.starts_with("ram") {
                continue;
            }
        } else if !filter.matches(device) {
            continue;
        }

        let field = |idx: usize| -> Result<u64, SourceError> {
            parts[idx].parse::<u64>().map_err(|e| {
                SourceError::parse(
                    path,
                    format!("device {}: invalid field {} '{}': {}", device, idx, parts[idx], e),
                )
            })
        };

        stats.insert(
            device.to_string(),
            DiskCounters {
                reads_completed: field(3)?,
                sectors_read: field(5)?,
                writes_completed: field(7)?,
                sectors_written: field(9)?,
                time_io_ms: field(12)?,
            },
        );
    }

    Ok(stats)
}
