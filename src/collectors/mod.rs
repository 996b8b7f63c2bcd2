//! Counter source for system metrics.
//!
//! This module reads raw kernel counters (CPU ticks, memory, per-disk I/O and
//! per-interface traffic) plus filesystem capacity from a procfs root, and
//! assembles them into an immutable [`RawSample`].
//!
//! Each counter family has its own parser returning a typed result; the
//! [`CounterFamily`] union is what a single statistics file turns into.

pub mod cpu;
pub mod diskstats;
pub mod filesystem;
pub mod memory;
pub mod netdev;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, SourceError};

pub use cpu::CpuTicks;
pub use diskstats::DiskCounters;
pub use filesystem::FilesystemUsage;
pub use memory::MemoryCounters;
pub use netdev::NetCounters;

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Instant a sample was captured: monotonic for differencing, wall clock for records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub monotonic: Instant,
    pub wall: DateTime<Utc>,
}

impl Timestamp {
    pub fn now() -> Self {
        Self {
            monotonic: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Snapshot of all monitored counters at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub timestamp: Timestamp,
    pub cpu: CpuTicks,
    pub memory: MemoryCounters,
    pub disks: BTreeMap<String, DiskCounters>,
    pub networks: BTreeMap<String, NetCounters>,
    /// Address of each sampled interface; interfaces without one are absent.
    pub addresses: BTreeMap<String, String>,
    pub filesystems: Vec<FilesystemUsage>,
}

/// Kinds of counter files the source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl FamilyKind {
    pub const ALL: [FamilyKind; 4] = [
        FamilyKind::Cpu,
        FamilyKind::Memory,
        FamilyKind::Disk,
        FamilyKind::Network,
    ];

    /// Path of the statistics file relative to the procfs root.
    pub fn relative_path(self) -> &'static str {
        match self {
            FamilyKind::Cpu => "stat",
            FamilyKind::Memory => "meminfo",
            FamilyKind::Disk => "diskstats",
            FamilyKind::Network => "net/dev",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FamilyKind::Cpu => "cpu",
            FamilyKind::Memory => "memory",
            FamilyKind::Disk => "disk",
            FamilyKind::Network => "network",
        }
    }

    /// Parses the content of this family's statistics file.
    pub fn parse(
        self,
        path: &Path,
        content: &str,
        filters: &Filters,
    ) -> Result<CounterFamily, SourceError> {
        Ok(match self {
            FamilyKind::Cpu => CounterFamily::Cpu(cpu::parse_cpu_ticks(path, content)?),
            FamilyKind::Memory => CounterFamily::Memory(memory::parse_meminfo(path, content)?),
            FamilyKind::Disk => CounterFamily::Disk(diskstats::parse_diskstats(
                path,
                content,
                &filters.devices,
            )?),
            FamilyKind::Network => {
                CounterFamily::Network(netdev::parse_netdev(path, content, &filters.interfaces)?)
            }
        })
    }
}

/// Parsed content of one statistics file.
#[derive(Debug, Clone, PartialEq)]
pub enum CounterFamily {
    Cpu(CpuTicks),
    Memory(MemoryCounters),
    Disk(BTreeMap<String, DiskCounters>),
    Network(BTreeMap<String, NetCounters>),
}

/// Allow-list of device or interface names.
///
/// Patterns are regular expressions matched against the whole name. An empty
/// filter lets everything through.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    patterns: Vec<Regex>,
}

impl NameFilter {
    pub fn new(name: &'static str, patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p)).map_err(|source| ConfigError::Pattern {
                    name,
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.is_unrestricted() || self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Device and interface allow-lists applied while reading.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub devices: NameFilter,
    pub interfaces: NameFilter,
}

/// Anything that can produce a [`RawSample`].
pub trait CounterSource {
    fn read_counters(&mut self) -> Result<RawSample, SourceError>;

    /// Applies new allow-lists and the filesystem toggle after a reload.
    fn reconfigure(&mut self, _filters: Filters, _filesystems: bool) {}
}

/// Reads counters from a procfs tree.
#[derive(Debug, Clone)]
pub struct ProcCounterSource {
    root: PathBuf,
    filters: Filters,
    filesystems: bool,
}

impl ProcCounterSource {
    pub fn new(root: impl Into<PathBuf>, filters: Filters, filesystems: bool) -> Self {
        Self {
            root: root.into(),
            filters,
            filesystems,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_filters(&mut self, filters: Filters) {
        self.filters = filters;
    }

    pub fn set_filesystems(&mut self, enabled: bool) {
        self.filesystems = enabled;
    }

    /// Reads and parses a single counter family.
    pub fn read_family(&self, kind: FamilyKind) -> Result<CounterFamily, SourceError> {
        let path = self.root.join(kind.relative_path());
        let content = fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        kind.parse(&path, &content, &self.filters)
    }
}

impl CounterSource for ProcCounterSource {
    fn read_counters(&mut self) -> Result<RawSample, SourceError> {
        let mut cpu = None;
        let mut memory = None;
        let mut disks = None;
        let mut networks = None;

        // Read every file before parsing anything so the families are as close in
        // time as possible.
        let mut contents = Vec::with_capacity(FamilyKind::ALL.len());
        for kind in FamilyKind::ALL {
            let path = self.root.join(kind.relative_path());
            let content = fs::read_to_string(&path).map_err(|source| SourceError::Io {
                path: path.clone(),
                source,
            })?;
            contents.push((kind, path, content));
        }
        let timestamp = Timestamp::now();

        for (kind, path, content) in &contents {
            match kind.parse(path, content, &self.filters)? {
                CounterFamily::Cpu(ticks) => cpu = Some(ticks),
                CounterFamily::Memory(mem) => memory = Some(mem),
                CounterFamily::Disk(map) => disks = Some(map),
                CounterFamily::Network(map) => networks = Some(map),
            }
        }

        let filesystems = if self.filesystems {
            filesystem::read_filesystem_usage(&self.root.join("mounts"))?
        } else {
            Vec::new()
        };

        let Some(networks) = networks else {
            return Err(SourceError::parse(&self.root, "incomplete counter set"));
        };
        let addresses = match netdev::interface_addresses() {
            Ok(mut addresses) => {
                addresses.retain(|name, _| networks.contains_key(name));
                addresses
            }
            Err(e) => {
                debug!("Interface addresses unavailable: {}", e);
                BTreeMap::new()
            }
        };

        match (cpu, memory, disks) {
            (Some(cpu), Some(memory), Some(disks)) => Ok(RawSample {
                timestamp,
                cpu,
                memory,
                disks,
                networks,
                addresses,
                filesystems,
            }),
            _ => Err(SourceError::parse(&self.root, "incomplete counter set")),
        }
    }

    fn reconfigure(&mut self, filters: Filters, filesystems: bool) {
        self.set_filters(filters);
        self.set_filesystems(filesystems);
    }
}
