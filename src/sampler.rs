//! Derivation of rates and percentages from consecutive raw samples.
//!
//! Counters are expected to be monotonic. When a counter goes backwards
//! (wraparound, device reset, interface re-added) the delta for that counter
//! is taken to be its current value, as if it had restarted from zero, and a
//! warning is logged. Devices that only appear in the current sample have no
//! baseline and are left out until the next tick.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::collectors::{
    CpuTicks, DiskCounters, FilesystemUsage, MemoryCounters, NetCounters, RawSample,
};
use crate::collectors::diskstats::SECTOR_SIZE;
use crate::error::SampleError;

/// CPU time share per mode over the interval, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuMetrics {
    /// Non-idle share: everything except idle and iowait.
    pub utilization_percent: f64,
    pub user_percent: f64,
    pub nice_percent: f64,
    pub system_percent: f64,
    pub idle_percent: f64,
    pub iowait_percent: f64,
    pub irq_percent: f64,
    pub softirq_percent: f64,
    pub steal_percent: f64,
}

/// Memory usage at the end of the interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryMetrics {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub buffers_bytes: u64,
    pub cached_bytes: u64,
    pub utilization_percent: f64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_utilization_percent: f64,
}

/// Throughput and IOPS for one block device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiskMetrics {
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
    pub read_iops: f64,
    pub write_iops: f64,
    /// Share of the interval the device had I/O in flight, capped at 100.
    pub busy_percent: f64,
}

/// Throughput for one network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetMetrics {
    /// Primary address at the end of the interval, IPv4 preferred.
    pub address: Option<String>,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub rx_packets_per_sec: f64,
    pub tx_packets_per_sec: f64,
    pub rx_errors_per_sec: f64,
    pub tx_errors_per_sec: f64,
    pub rx_drops_per_sec: f64,
    pub tx_drops_per_sec: f64,
}

/// Capacity of one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilesystemMetrics {
    pub device: String,
    pub fstype: String,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

/// Metrics derived from two consecutive raw samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// Wall clock time of the current sample.
    pub timestamp: DateTime<Utc>,
    /// Monotonic time between the two samples.
    pub interval_seconds: f64,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disks: BTreeMap<String, DiskMetrics>,
    pub networks: BTreeMap<String, NetMetrics>,
    /// Keyed by mount point.
    pub filesystems: BTreeMap<String, FilesystemMetrics>,
    /// Number of counters that went backwards and were treated as reset.
    pub counter_resets: u32,
}

/// Computes derived metrics between `previous` and `current`.
///
/// Fails when `current` was not captured strictly after `previous`.
pub fn compute_delta(
    previous: &RawSample,
    current: &RawSample,
) -> Result<DerivedMetrics, SampleError> {
    let elapsed = elapsed_between(previous, current)?;
    let secs = elapsed.as_secs_f64();
    let mut deltas = DeltaTracker::default();

    let cpu = cpu_metrics(&mut deltas, &previous.cpu, &current.cpu);
    let memory = memory_metrics(&current.memory);

    let mut disks = BTreeMap::new();
    for (name, cur) in &current.disks {
        match previous.disks.get(name) {
            Some(prev) => {
                disks.insert(name.clone(), disk_metrics(&mut deltas, name, prev, cur, secs));
            }
            None => debug!("Disk {} appeared, skipping rates until next tick", name),
        }
    }

    let mut networks = BTreeMap::new();
    for (name, cur) in &current.networks {
        match previous.networks.get(name) {
            Some(prev) => {
                let mut metrics = net_metrics(&mut deltas, name, prev, cur, secs);
                metrics.address = current.addresses.get(name).cloned();
                networks.insert(name.clone(), metrics);
            }
            None => debug!("Interface {} appeared, skipping rates until next tick", name),
        }
    }

    let filesystems = current
        .filesystems
        .iter()
        .map(|fs| (fs.mount_point.clone(), filesystem_metrics(fs)))
        .collect();

    Ok(DerivedMetrics {
        timestamp: current.timestamp.wall,
        interval_seconds: secs,
        cpu,
        memory,
        disks,
        networks,
        filesystems,
        counter_resets: deltas.resets,
    })
}

fn elapsed_between(previous: &RawSample, current: &RawSample) -> Result<Duration, SampleError> {
    let prev = previous.timestamp.monotonic;
    let cur = current.timestamp.monotonic;
    match cur.checked_duration_since(prev) {
        Some(elapsed) if !elapsed.is_zero() => Ok(elapsed),
        _ => Err(SampleError::NonMonotonicSample {
            elapsed_ns: -(prev.saturating_duration_since(cur).as_nanos() as i128),
        }),
    }
}

/// Applies the reset-to-baseline policy and counts regressions.
#[derive(Default)]
struct DeltaTracker {
    resets: u32,
}

impl DeltaTracker {
    fn delta(&mut self, family: &str, name: &str, counter: &str, prev: u64, cur: u64) -> u64 {
        if cur >= prev {
            return cur - prev;
        }
        self.resets += 1;
        warn!(
            family,
            name,
            counter,
            previous = prev,
            current = cur,
            "Counter went backwards, treating as reset"
        );
        cur
    }
}

fn cpu_metrics(deltas: &mut DeltaTracker, prev: &CpuTicks, cur: &CpuTicks) -> CpuMetrics {
    let prev_modes = prev.modes();
    let cur_modes = cur.modes();

    let mut mode_deltas = [0u64; 8];
    for (i, ((mode, p), (_, c))) in prev_modes.iter().zip(cur_modes.iter()).enumerate() {
        mode_deltas[i] = deltas.delta("cpu", "cpu", mode, *p, *c);
    }

    let total = mode_deltas.iter().fold(0u64, |sum, d| sum.saturating_add(*d));
    if total == 0 {
        return CpuMetrics::default();
    }

    let pct = |d: u64| round2(d as f64 * 100.0 / total as f64);
    let [user, nice, system, idle, iowait, irq, softirq, steal] = mode_deltas;

    CpuMetrics {
        utilization_percent: pct(total.saturating_sub(idle).saturating_sub(iowait)),
        user_percent: pct(user),
        nice_percent: pct(nice),
        system_percent: pct(system),
        idle_percent: pct(idle),
        iowait_percent: pct(iowait),
        irq_percent: pct(irq),
        softirq_percent: pct(softirq),
        steal_percent: pct(steal),
    }
}

fn memory_metrics(mem: &MemoryCounters) -> MemoryMetrics {
    let used_bytes = mem.total_bytes.saturating_sub(mem.available_bytes);
    let swap_used_bytes = mem.swap_total_bytes.saturating_sub(mem.swap_free_bytes);

    MemoryMetrics {
        total_bytes: mem.total_bytes,
        available_bytes: mem.available_bytes,
        used_bytes,
        buffers_bytes: mem.buffers_bytes,
        cached_bytes: mem.cached_bytes,
        utilization_percent: percent_of(used_bytes, mem.total_bytes),
        swap_total_bytes: mem.swap_total_bytes,
        swap_used_bytes,
        swap_utilization_percent: percent_of(swap_used_bytes, mem.swap_total_bytes),
    }
}

fn disk_metrics(
    deltas: &mut DeltaTracker,
    name: &str,
    prev: &DiskCounters,
    cur: &DiskCounters,
    secs: f64,
) -> DiskMetrics {
    let mut d = |counter: &str, p: u64, c: u64| deltas.delta("disk", name, counter, p, c);

    let sectors_read = d("sectors_read", prev.sectors_read, cur.sectors_read);
    let sectors_written = d("sectors_written", prev.sectors_written, cur.sectors_written);
    let reads = d("reads_completed", prev.reads_completed, cur.reads_completed);
    let writes = d("writes_completed", prev.writes_completed, cur.writes_completed);
    let io_ms = d("time_io_ms", prev.time_io_ms, cur.time_io_ms);

    DiskMetrics {
        read_bytes_per_sec: sectors_read.saturating_mul(SECTOR_SIZE) as f64 / secs,
        write_bytes_per_sec: sectors_written.saturating_mul(SECTOR_SIZE) as f64 / secs,
        read_iops: reads as f64 / secs,
        write_iops: writes as f64 / secs,
        busy_percent: round2((io_ms as f64 / (secs * 1000.0) * 100.0).min(100.0)),
    }
}

fn net_metrics(
    deltas: &mut DeltaTracker,
    name: &str,
    prev: &NetCounters,
    cur: &NetCounters,
    secs: f64,
) -> NetMetrics {
    let mut rate = |counter: &str, p: u64, c: u64| {
        deltas.delta("network", name, counter, p, c) as f64 / secs
    };

    NetMetrics {
        address: None,
        rx_bytes_per_sec: rate("receive_bytes", prev.receive_bytes, cur.receive_bytes),
        tx_bytes_per_sec: rate("transmit_bytes", prev.transmit_bytes, cur.transmit_bytes),
        rx_packets_per_sec: rate("receive_packets", prev.receive_packets, cur.receive_packets),
        tx_packets_per_sec: rate(
            "transmit_packets",
            prev.transmit_packets,
            cur.transmit_packets,
        ),
        rx_errors_per_sec: rate("receive_errs", prev.receive_errs, cur.receive_errs),
        tx_errors_per_sec: rate("transmit_errs", prev.transmit_errs, cur.transmit_errs),
        rx_drops_per_sec: rate("receive_drop", prev.receive_drop, cur.receive_drop),
        tx_drops_per_sec: rate("transmit_drop", prev.transmit_drop, cur.transmit_drop),
    }
}

fn filesystem_metrics(fs: &FilesystemUsage) -> FilesystemMetrics {
    FilesystemMetrics {
        device: fs.device.clone(),
        fstype: fs.fstype.clone(),
        size_bytes: fs.size_bytes,
        used_bytes: fs.used_bytes,
        available_bytes: fs.available_bytes,
        // Same base as df: blocks reserved for root are not counted as available
        used_percent: percent_of(
            fs.used_bytes,
            fs.used_bytes.saturating_add(fs.available_bytes),
        ),
    }
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / whole as f64)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Owner of the monitor state: the last raw sample, if any.
///
/// The first observed sample only becomes the baseline; every later sample is
/// differenced against its predecessor.
#[derive(Debug, Default)]
pub struct Sampler {
    previous: Option<RawSample>,
}

impl Sampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    /// Forgets the baseline; the next observed sample starts over.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Records `current` and returns metrics relative to the previous sample.
    ///
    /// Returns `Ok(None)` when there was no baseline yet. On a non-monotonic
    /// sample both samples are dropped and the next one becomes the baseline.
    pub fn observe(&mut self, current: RawSample) -> Result<Option<DerivedMetrics>, SampleError> {
        let Some(previous) = self.previous.take() else {
            debug!("Stored first sample as baseline");
            self.previous = Some(current);
            return Ok(None);
        };

        let metrics = compute_delta(&previous, &current)?;
        self.previous = Some(current);
        Ok(Some(metrics))
    }
}
