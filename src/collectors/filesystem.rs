//! Filesystem capacity collector.
//!
//! Reads mounted filesystems from `<proc_root>/mounts` and uses libc statvfs to get
//! usage data. Unlike the other families these are gauges, not counters.
//!
//! Network filesystems are never stat'ed: statvfs on an unreachable NFS or
//! CIFS server blocks in the kernel with no way to time it out, and a tick
//! must finish in bounded time.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::SourceError;

/// Capacity of a single mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesystemUsage {
    pub device: String,
    pub mount_point: String,
    pub fstype: String,
    pub size_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
}

/// A mounted filesystem worth stat'ing, as listed in /proc/mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fstype: String,
}

/// Parses /proc/mounts, dropping pseudo and network filesystems and system
/// mount points.
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    let mut mounts = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let mount_point = unescape_mount_path(parts[1]);
        if should_skip_filesystem(parts[2], &mount_point) {
            continue;
        }

        // The same mount point can appear twice when something is mounted over it
        mounts.retain(|m: &MountEntry| m.mount_point != mount_point);
        mounts.push(MountEntry {
            device: parts[0].to_string(),
            mount_point,
            fstype: parts[2].to_string(),
        });
    }

    mounts
}

/// Reads capacity for every real filesystem listed in `mounts_path`.
///
/// Mount points that cannot be stat'ed are skipped.
pub fn read_filesystem_usage(mounts_path: &Path) -> Result<Vec<FilesystemUsage>, SourceError> {
    let content = std::fs::read_to_string(mounts_path).map_err(|source| SourceError::Io {
        path: mounts_path.to_path_buf(),
        source,
    })?;

    let mut usage = Vec::new();
    for mount in parse_mounts(&content) {
        match statvfs_usage(&mount.mount_point) {
            Ok((size_bytes, available_bytes, used_bytes)) => usage.push(FilesystemUsage {
                device: mount.device,
                mount_point: mount.mount_point,
                fstype: mount.fstype,
                size_bytes,
                available_bytes,
                used_bytes,
            }),
            Err(e) => debug!("Skipping filesystem {}: {}", mount.mount_point, e),
        }
    }

    Ok(usage)
}

/// Checks if a filesystem should be skipped based on type and mount point.
fn should_skip_filesystem(fstype: &str, mount_point: &str) -> bool {
    let skip_types = [
        "proc",
        "sysfs",
        "devpts",
        "devtmpfs",
        "tmpfs",
        "cgroup",
        "cgroup2",
        "pstore",
        "bpf",
        "debugfs",
        "tracefs",
        "fusectl",
        "configfs",
        "securityfs",
        "hugetlbfs",
        "mqueue",
        "autofs",
        "binfmt_misc",
        "overlay",
        "squashfs",
        "nsfs",
    ];

    if skip_types.contains(&fstype) || is_network_filesystem(fstype) {
        return true;
    }

    mount_point.starts_with("/proc")
        || mount_point.starts_with("/sys")
        || mount_point.starts_with("/dev")
        || mount_point.starts_with("/run")
}

/// Filesystem types backed by a remote server.
fn is_network_filesystem(fstype: &str) -> bool {
    const NETWORK_TYPES: [&str; 14] = [
        "nfs", "nfs4", "cifs", "smb3", "smbfs", "ncpfs", "ceph", "9p", "afs", "glusterfs",
        "lustre", "gpfs", "davfs", "ocfs2",
    ];
    const NETWORK_FUSE: [&str; 6] = ["sshfs", "s3fs", "rclone", "gcsfuse", "glusterfs", "davfs"];

    if NETWORK_TYPES.contains(&fstype) {
        return true;
    }
    match fstype.strip_prefix("fuse.") {
        Some(helper) => NETWORK_FUSE.contains(&helper),
        None => false,
    }
}

/// Decodes the octal escapes (`\040` for space etc.) the kernel uses in /proc/mounts.
fn unescape_mount_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let code = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(code) = code {
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Returns (size, available, used) in bytes via statvfs(3).
fn statvfs_usage(path: &str) -> Result<(u64, u64, u64), String> {
    use std::ffi::CString;
    use std::mem;

    let c_path = CString::new(path).map_err(|e| format!("Invalid path: {}", e))?;

    // SAFETY: statvfs only writes into the zeroed struct we own, and c_path is a valid
    // NUL-terminated string for the duration of the call.
    let stat = unsafe {
        let mut stat: libc::statvfs = mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
            return Err(format!(
                "statvfs failed: {}",
                std::io::Error::last_os_error()
            ));
        }
        stat
    };

    let block_size = stat.f_frsize as u64;
    let size_bytes = block_size.saturating_mul(stat.f_blocks as u64);
    let available_bytes = block_size.saturating_mul(stat.f_bavail as u64);
    let used_bytes = size_bytes.saturating_sub(block_size.saturating_mul(stat.f_bfree as u64));

    Ok((size_bytes, available_bytes, used_bytes))
}
