//! # snoop - eBPF-based TLS Plaintext Tracer
//!
//! snoop attaches uprobes to the read and write entry points of a TLS library
//! (`SSL_read` / `SSL_write` in libssl) and streams the plaintext those calls
//! carry, before encryption on the way out and after decryption on the way
//! in.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Any process linked against libssl                  │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ SSL_read / SSL_write
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Programs (Kernel)                      │
//! │  • Uprobes: uprobe_entry_SSL_{read,write}                       │
//! │  • Uretprobes: uprobe_return_SSL_{read,write}                   │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ TLS_EVENTS ring buffer (10,040-byte records)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      snoop (This Crate)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ EventSource  │──▶│ decode task  │──▶│ TraceSession │──▶ render│
//! │  │  (ring buf)  │   │ decode+filter│   │   ::recv()   │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │         ▲                   ▲                                   │
//! │         └──── coordinator ──┘  (SIGINT/SIGTERM → teardown)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: everything between the kernel and the consumer
//!   - `decoder`: raw record → [`capture::TracedEvent`]
//!   - `filter`: drops empty messages and other processes
//!   - `probes` / `ebpf_setup`: load the object, attach four probes
//!   - `source`: ring buffer and channel-backed event sources
//!   - `pipeline` / `shutdown`: decode task, lifecycle and ordered teardown
//!
//! - [`render`]: JSON and table output
//!
//! - [`cli`]: Command-line argument parsing and configuration
//!
//! - [`library`]: default TLS library location per architecture
//!
//! - [`preflight`]: privilege, kernel and file checks before loading
//!
//! - [`domain`]: Core domain types (Pid, Tid, `PidFilter`) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Build the kernel object, then trace everything
//! cargo xtask build-ebpf
//! sudo ./target/debug/snoop
//!
//! # One process, JSON output
//! sudo ./target/debug/snoop --pid <PID> --json
//! ```
//!
//! ## Key Concepts
//!
//! - **Uprobe / uretprobe**: Dynamic tracing of userspace function entry and return
//! - **Ring Buffer**: Lock-free kernel→userspace event queue
//! - **Record**: fixed-size little-endian struct shared with the kernel via `snoop-common`

pub mod capture;
pub mod cli;
pub mod domain;
pub mod library;
pub mod preflight;
pub mod render;
