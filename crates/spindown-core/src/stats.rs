//! Per-device I/O counter snapshots.
//!
//! A snapshot is one poll's worth of `(device name, counters)` pairs. The
//! shipped [`ProcDiskStatsSource`] reads the kernel's `/proc/diskstats`
//! accounting table; anything else that can produce a snapshot (a test
//! script, a different counter file) plugs in through [`DiskStatsSource`].

use std::fs;
use std::io;
use std::path::PathBuf;

/// Immutable I/O counters for one device at one sample time.
///
/// Monotonically non-decreasing under normal operation; a decrease is taken
/// as a hint that the device identity changed (disk replaced or
/// re-enumerated).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskCounters {
    pub sectors_read: u64,
    pub sectors_written: u64,
}

/// One device's entry in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStats {
    pub device_name: String,
    pub counters: DiskCounters,
}

impl DeviceStats {
    pub fn new(device_name: &str, sectors_read: u64, sectors_written: u64) -> Self {
        Self {
            device_name: device_name.to_string(),
            counters: DiskCounters {
                sectors_read,
                sectors_written,
            },
        }
    }
}

/// Produces a snapshot of per-device counters on demand.
pub trait DiskStatsSource {
    /// Read one snapshot. Device names must be unique within a snapshot.
    fn poll(&mut self) -> io::Result<Vec<DeviceStats>>;
}

const PROC_DISKSTATS: &str = "/proc/diskstats";

// /proc/diskstats field indices (whitespace-separated).
const FIELD_DEVICE_NAME: usize = 2;
const FIELD_SECTORS_READ: usize = 5;
const FIELD_SECTORS_WRITTEN: usize = 9;

/// Snapshot source backed by the kernel's `/proc/diskstats` table.
pub struct ProcDiskStatsSource {
    path: PathBuf,
}

impl ProcDiskStatsSource {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(PROC_DISKSTATS),
        }
    }

    /// Read from an alternate counter file. Used by tests.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcDiskStatsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskStatsSource for ProcDiskStatsSource {
    fn poll(&mut self) -> io::Result<Vec<DeviceStats>> {
        let text = fs::read_to_string(&self.path)?;
        Ok(parse_diskstats(&text))
    }
}

/// Parse `/proc/diskstats` text into a snapshot.
///
/// Lines with too few fields or non-numeric counters are skipped rather than
/// treated as errors; the kernel format has grown fields over time.
pub fn parse_diskstats(text: &str) -> Vec<DeviceStats> {
    let mut snapshot = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= FIELD_SECTORS_WRITTEN {
            continue;
        }
        let sectors_read = fields[FIELD_SECTORS_READ].parse();
        let sectors_written = fields[FIELD_SECTORS_WRITTEN].parse();
        let (Ok(sectors_read), Ok(sectors_written)) = (sectors_read, sectors_written) else {
            continue;
        };
        snapshot.push(DeviceStats {
            device_name: fields[FIELD_DEVICE_NAME].to_string(),
            counters: DiskCounters {
                sectors_read,
                sectors_written,
            },
        });
    }
    snapshot
}
