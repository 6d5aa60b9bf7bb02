//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the record emitted by the kernel-side TLS probes and the constants
//! both sides agree on. The record uses `#[repr(C)]` so the kernel writes the
//! exact byte layout userspace decodes.
//!
//! ## Record Layout (version 1, little-endian, 10,040 bytes)
//!
//! ```text
//! offset  width  field
//!      0      8  elapsed_us     u64
//!      8      4  pid            u32  (tgid, upper half of pid_tgid)
//!     12      4  tid            u32  (lower half of pid_tgid)
//!     16      4  result         i32
//!     20      4  function       i32  (FN_SSL_READ / FN_SSL_WRITE)
//!     24     16  process_name   [u8; COMM_LEN]
//!     40  10000  content        [u8; MAX_DATA_SIZE]
//! ```
//!
//! The total is a multiple of 8, so there is no trailing padding.

#![cfg_attr(not(test), no_std)]

// ============================================================================
// Constants
// ============================================================================

/// Version of the record layout below. Bump when any field moves.
pub const RECORD_VERSION: u32 = 1;

/// Length of the kernel's task command name (`TASK_COMM_LEN`)
pub const COMM_LEN: usize = 16;

/// Capacity of the captured plaintext buffer
///
/// Calls that move more bytes than this are truncated to the first
/// `MAX_DATA_SIZE` bytes.
pub const MAX_DATA_SIZE: usize = 10_000;

/// Function code for `SSL_read`
pub const FN_SSL_READ: i32 = 0;

/// Function code for `SSL_write`
pub const FN_SSL_WRITE: i32 = 1;

/// Name of the ring buffer map the kernel program publishes records to
pub const EVENT_MAP_NAME: &str = "TLS_EVENTS";

/// Size in bytes of one [`TlsRecord`] on the wire
pub const RECORD_SIZE: usize = core::mem::size_of::<TlsRecord>();

const _: () = assert!(RECORD_SIZE == 40 + MAX_DATA_SIZE);

// ============================================================================
// Shared Data Structures
// ============================================================================

/// One captured `SSL_read` / `SSL_write` call
///
/// Written in place into the `TLS_EVENTS` ring buffer by the return probe.
/// Userspace never casts bytes into this type; it decodes field by field at
/// the offsets documented in the crate header.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TlsRecord {
    /// Duration of the call in microseconds (entry probe to return probe)
    pub elapsed_us: u64,

    /// Process ID (TGID in Linux terms)
    pub pid: u32,

    /// Thread ID (PID in Linux terms)
    pub tid: u32,

    /// Return value of the traced call
    ///
    /// Bytes transferred on success. The kernel only emits records for
    /// non-negative results.
    pub result: i32,

    /// Which function produced the record (`FN_SSL_READ` / `FN_SSL_WRITE`)
    pub function: i32,

    /// Command name of the calling task, NUL-terminated unless full
    pub process_name: [u8; COMM_LEN],

    /// Plaintext buffer, NUL-terminated unless full
    pub content: [u8; MAX_DATA_SIZE],
}

/// Split a packed `bpf_get_current_pid_tgid()` value into `(pid, tid)`
///
/// The upper 32 bits carry the TGID (userspace PID), the lower 32 bits the
/// kernel PID (userspace TID).
#[inline(always)]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn split_pid_tgid(pid_tgid: u64) -> (u32, u32) {
    ((pid_tgid >> 32) as u32, pid_tgid as u32)
}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl aya::Pod for TlsRecord {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_size() {
        assert_eq!(RECORD_SIZE, 10_040);
        assert_eq!(RECORD_SIZE % 8, 0);
    }

    #[test]
    fn test_split_pid_tgid() {
        let packed = (4321_u64 << 32) | 1234;
        assert_eq!(split_pid_tgid(packed), (4321, 1234));
    }
}
