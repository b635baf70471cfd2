//! Host capacity detection for pool sizing.

use std::thread;

use log::debug;

const GIB: u64 = 1024 * 1024 * 1024;

/// What the host can afford to run in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareProfile {
    pub cpus: usize,
    pub memory_bytes: Option<u64>,
    /// Worker count: CPUs capped by the memory tier
    pub workers: usize,
    /// Tasks after which the pool is recreated
    pub recycle_after: usize,
}

impl HardwareProfile {
    pub fn detect() -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let memory = total_memory();
        let profile = Self::from_parts(cpus, memory);
        debug!("Detected hardware: {profile:?}");
        profile
    }

    /// Applies the memory tiers: under 4 GiB, under 8 GiB, and above.
    /// Unknown memory takes the middle tier.
    pub fn from_parts(cpus: usize, memory_bytes: Option<u64>) -> Self {
        let (cap, recycle_after) = match memory_bytes {
            Some(bytes) if bytes < 4 * GIB => (2, 50),
            Some(bytes) if bytes < 8 * GIB => (4, 100),
            Some(_) => (8, 200),
            None => (4, 100),
        };

        Self {
            cpus,
            memory_bytes,
            workers: cpus.clamp(1, cap),
            recycle_after,
        }
    }
}

fn total_memory() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&meminfo)
}

fn parse_meminfo(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}
