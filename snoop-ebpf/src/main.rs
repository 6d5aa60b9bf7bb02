//! # eBPF Kernel-Side Instrumentation
//!
//! Uprobes on the TLS library's `SSL_read` / `SSL_write` that copy the
//! plaintext buffer out to userspace once the call returns.
//!
//! ## Programs
//!
//! - `uprobe_entry_SSL_read` / `uprobe_entry_SSL_write` - remember the entry
//!   timestamp and the caller's buffer pointer, keyed by `pid_tgid`
//! - `uprobe_return_SSL_read` / `uprobe_return_SSL_write` - read the return
//!   value, copy up to `MAX_DATA_SIZE` bytes of the buffer and publish a
//!   [`TlsRecord`]
//!
//! ## Maps (Shared with Userspace)
//!
//! - `TLS_EVENTS` - Ring buffer carrying `TlsRecord`s
//! - `TLS_DIAGNOSTICS` - Emit/drop counters read at shutdown
//!
//! ## Build
//!
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe, non_snake_case)]

use aya_ebpf::{
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_user_buf,
    },
    macros::{map, uprobe, uretprobe},
    maps::{HashMap, RingBuf},
    programs::{ProbeContext, RetProbeContext},
};
use aya_log_ebpf::warn;
use snoop_common::{split_pid_tgid, TlsRecord, FN_SSL_READ, FN_SSL_WRITE, MAX_DATA_SIZE};

// ============================================================================
// Constants
// ============================================================================

/// `TLS_DIAGNOSTICS` key: records submitted to the ring buffer
const DIAG_EMITTED: u32 = 0;

/// `TLS_DIAGNOSTICS` key: records lost because the ring buffer was full
const DIAG_RING_FULL: u32 = 1;

// ============================================================================
// eBPF Maps
// ============================================================================

/// Ring buffer for sending TLS records to userspace
///
/// - **Size**: 4MB (roughly 400 records of 10KB)
/// - **Overflow**: `reserve` fails and the record is dropped at the source
#[map]
static TLS_EVENTS: RingBuf = RingBuf::with_byte_size(4 * 1024 * 1024, 0);

/// Map: `pid_tgid` → entry timestamp (ns)
#[map]
static TLS_TIMESTAMPS: HashMap<u64, u64> = HashMap::with_max_entries(10240, 0);

/// Map: `pid_tgid` → user buffer pointer passed to `SSL_read` / `SSL_write`
#[map]
static TLS_BUFFERS: HashMap<u64, u64> = HashMap::with_max_entries(10240, 0);

/// Map: diagnostic key → counter
#[map]
static TLS_DIAGNOSTICS: HashMap<u32, u64> = HashMap::with_max_entries(2, 0);

// ============================================================================
// eBPF Program Hooks
// ============================================================================

#[uprobe]
pub fn uprobe_entry_SSL_read(ctx: ProbeContext) -> u32 {
    match try_entry(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[uretprobe]
pub fn uprobe_return_SSL_read(ctx: RetProbeContext) -> u32 {
    match try_return(&ctx, FN_SSL_READ) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[uprobe]
pub fn uprobe_entry_SSL_write(ctx: ProbeContext) -> u32 {
    match try_entry(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[uretprobe]
pub fn uprobe_return_SSL_write(ctx: RetProbeContext) -> u32 {
    match try_return(&ctx, FN_SSL_WRITE) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// `int SSL_read(SSL *ssl, void *buf, int num)` / `SSL_write(SSL *ssl, const void *buf, int num)`:
/// the plaintext buffer is the second argument in both.
fn try_entry(ctx: &ProbeContext) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let now = unsafe { bpf_ktime_get_ns() };
    let buffer: u64 = ctx.arg(1).ok_or(1i64)?;

    TLS_TIMESTAMPS.insert(&pid_tgid, &now, 0)?;
    TLS_BUFFERS.insert(&pid_tgid, &buffer, 0)?;

    Ok(())
}

fn try_return(ctx: &RetProbeContext, function: i32) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };

    let buffer = unsafe { TLS_BUFFERS.get(&pid_tgid).copied() };
    let started = unsafe { TLS_TIMESTAMPS.get(&pid_tgid).copied() };
    let _ = TLS_BUFFERS.remove(&pid_tgid);
    let _ = TLS_TIMESTAMPS.remove(&pid_tgid);

    let (Some(buffer), Some(started)) = (buffer, started) else {
        return Ok(());
    };

    let result: i32 = ctx.ret().ok_or(1i64)?;
    if result < 0 {
        return Ok(());
    }

    let Some(mut entry) = TLS_EVENTS.reserve::<TlsRecord>(0) else {
        bump(DIAG_RING_FULL);
        warn!(ctx, "TLS_EVENTS full, dropping {} byte record", result);
        return Ok(());
    };

    let record = unsafe { &mut *entry.as_mut_ptr() };
    let (pid, tid) = split_pid_tgid(pid_tgid);
    let now = unsafe { bpf_ktime_get_ns() };

    record.elapsed_us = (now - started) / 1_000;
    record.pid = pid;
    record.tid = tid;
    record.result = result;
    record.function = function;
    record.process_name = bpf_get_current_comm().unwrap_or([0u8; 16]);

    #[allow(clippy::cast_sign_loss)]
    let len = result as usize;
    let captured = if len < MAX_DATA_SIZE { len } else { MAX_DATA_SIZE };

    // Reserved ring buffer memory is not zeroed; terminate the logical content.
    if captured < MAX_DATA_SIZE {
        record.content[captured] = 0;
    }
    if captured > 0
        && unsafe {
            bpf_probe_read_user_buf(buffer as *const u8, &mut record.content[..captured])
        }
        .is_err()
    {
        record.content[0] = 0;
    }

    entry.submit(0);
    bump(DIAG_EMITTED);

    Ok(())
}

fn bump(key: u32) {
    unsafe {
        let current = TLS_DIAGNOSTICS.get(&key).copied().unwrap_or(0);
        let _ = TLS_DIAGNOSTICS.insert(&key, &(current + 1), 0);
    }
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
