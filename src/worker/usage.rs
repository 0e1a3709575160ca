//! Point-in-time resource usage of a worker process.
//!
//! On Linux the numbers come from `/proc/<pid>/statm` and `/proc/<pid>/stat`.
//! Other platforms report [`WorkerError::ResourceUnavailable`].

use std::time::Duration;

use crate::error::WorkerError;

/// One megabyte, as used by the memory ceilings.
pub const MB: u64 = 1024 * 1024;

/// Snapshot of a worker's OS-level resource usage. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceUsage {
    /// Resident set size in bytes.
    pub memory_bytes: u64,
    /// User + system CPU time consumed so far.
    pub cpu_time: Duration,
}

impl ResourceUsage {
    /// Resident memory in whole megabytes.
    pub fn memory_mb(&self) -> u64 {
        self.memory_bytes / MB
    }

    /// Reads usage of a live process.
    #[cfg(target_os = "linux")]
    pub fn read(pid: u32) -> Result<Self, WorkerError> {
        let unavailable = |reason: String| WorkerError::ResourceUnavailable { pid, reason };

        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map_err(|e| unavailable(e.to_string()))?;
        let (state, cpu_time) = parse_stat(&stat).ok_or_else(|| unavailable("malformed stat".into()))?;
        if matches!(state, 'Z' | 'X') {
            return Err(unavailable("process exited".into()));
        }

        let statm = std::fs::read_to_string(format!("/proc/{pid}/statm"))
            .map_err(|e| unavailable(e.to_string()))?;
        let memory_bytes = parse_statm(&statm).ok_or_else(|| unavailable("malformed statm".into()))?;

        Ok(Self {
            memory_bytes,
            cpu_time,
        })
    }

    /// Reads usage of a live process.
    #[cfg(not(target_os = "linux"))]
    pub fn read(pid: u32) -> Result<Self, WorkerError> {
        Err(WorkerError::ResourceUnavailable {
            pid,
            reason: "unsupported platform".into(),
        })
    }
}

/// Page size assumed for `statm` (4 KiB on every mainstream Linux target).
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const PAGE_SIZE: u64 = 4096;

/// `USER_HZ`, the unit of `utime`/`stime` in `/proc/<pid>/stat`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const CLOCK_TICKS: u64 = 100;

/// Resident bytes from `size resident shared text lib data dt` (pages).
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm(contents: &str) -> Option<u64> {
    let resident: u64 = contents.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident * PAGE_SIZE)
}

/// Process state char and CPU time from `/proc/<pid>/stat`.
///
/// `comm` may contain spaces and parentheses, so fields are counted after the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_stat(contents: &str) -> Option<(char, Duration)> {
    let rest = &contents[contents.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let state = fields.first()?.chars().next()?;
    // Index 0 is field 3 (state); utime and stime are fields 14 and 15.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let ticks = utime + stime;
    let cpu_time = Duration::from_secs(ticks / CLOCK_TICKS)
        + Duration::from_millis((ticks % CLOCK_TICKS) * 1000 / CLOCK_TICKS);
    Some((state, cpu_time))
}
