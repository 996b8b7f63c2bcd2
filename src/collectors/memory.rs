//! Memory usage from /proc/meminfo.

use std::path::Path;

use serde::Serialize;

use crate::error::SourceError;

/// Memory and swap usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryCounters {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub buffers_bytes: u64,
    pub cached_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_free_bytes: u64,
}

/// Parses /proc/meminfo.
///
/// MemTotal and MemAvailable are required (MemAvailable exists since Linux 3.14);
/// Buffers, Cached and the swap lines default to 0 when absent.
pub fn parse_meminfo(path: &Path, content: &str) -> Result<MemoryCounters, SourceError> {
    let mut total_bytes: Option<u64> = None;
    let mut available_bytes: Option<u64> = None;
    let mut counters = MemoryCounters::default();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };

        match key {
            "MemTotal:" => total_bytes = Some(parse_kb(path, key, value)?),
            "MemAvailable:" => available_bytes = Some(parse_kb(path, key, value)?),
            "Buffers:" => counters.buffers_bytes = parse_kb(path, key, value)?,
            "Cached:" => counters.cached_bytes = parse_kb(path, key, value)?,
            "SwapTotal:" => counters.swap_total_bytes = parse_kb(path, key, value)?,
            "SwapFree:" => counters.swap_free_bytes = parse_kb(path, key, value)?,
            _ => {}
        }
    }

    match (total_bytes, available_bytes) {
        (Some(total), Some(available)) => Ok(MemoryCounters {
            total_bytes: total,
            available_bytes: available,
            ..counters
        }),
        (None, _) => Err(SourceError::parse(path, "MemTotal not found")),
        (_, None) => Err(SourceError::parse(path, "MemAvailable not found")),
    }
}

fn parse_kb(path: &Path, key: &str, value: &str) -> Result<u64, SourceError> {
    value
        .parse::<u64>()
        .map(|kb| kb.saturating_mul(1024))
        .map_err(|e| SourceError::parse(path, format!("invalid {} value '{}': {}", key, value, e)))
}
