//! TLS capture modules
//!
//! Everything between the kernel probes and the consumer:
//! - Record decoding and the decoded event type
//! - Message filtering
//! - Probe attachment and eBPF program setup
//! - Event sources (ring buffer, channel replay)
//! - The streaming pipeline and its shutdown coordinator

pub mod decoder;
pub mod diagnostics;
pub mod ebpf_setup;
pub mod event;
pub mod filter;
pub mod pipeline;
pub mod probes;
pub mod shutdown;
pub mod source;

// Re-export common types
pub use decoder::{decode, RawRecordBuilder};
pub use diagnostics::{read_kernel_counters, KernelCounters};
pub use ebpf_setup::{
    init_ebpf_logger, load_ebpf_program, raise_memlock_rlimit, EbpfInstrumentation,
};
pub use event::{TlsFunction, TracedEvent};
pub use filter::{MessageFilter, Verdict};
pub use pipeline::{
    PipelineStats, TraceSession, Tracer, TracerConfig, TracerState, DEFAULT_CHANNEL_CAPACITY,
};
pub use probes::{attach_probes, required_probes, Instrumentation, Probe, ProbeKind, TRACED_FUNCTIONS};
pub use shutdown::{termination_signal, ShutdownHandle};
pub use source::{ChannelSource, EventSource, RawRecord, RingBufSource};
