use std::fmt;

use anyhow::{Context, Result};
use aya::maps::HashMap;
use aya::Ebpf;

/// Keys of the kernel-side `TLS_DIAGNOSTICS` map
const DIAG_EMITTED: u32 = 0;
const DIAG_RING_FULL: u32 = 1;

/// Counters kept by the kernel program
///
/// `ring_full` counts records dropped at the source because userspace did
/// not drain `TLS_EVENTS` fast enough. Those records never reach the
/// pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelCounters {
    pub emitted: u64,
    pub ring_full: u64,
}

impl fmt::Display for KernelCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} records emitted, {} lost to a full ring buffer", self.emitted, self.ring_full)
    }
}

/// Read the `TLS_DIAGNOSTICS` counters
///
/// Missing keys read as zero (the kernel only creates them on first use).
///
/// # Errors
/// Returns an error if the diagnostics map cannot be accessed
pub fn read_kernel_counters(bpf: &Ebpf) -> Result<KernelCounters> {
    let map: HashMap<_, u32, u64> = HashMap::try_from(
        bpf.map("TLS_DIAGNOSTICS").context("TLS_DIAGNOSTICS map not found")?,
    )?;

    Ok(KernelCounters {
        emitted: map.get(&DIAG_EMITTED, 0).unwrap_or(0),
        ring_full: map.get(&DIAG_RING_FULL, 0).unwrap_or(0),
    })
}
