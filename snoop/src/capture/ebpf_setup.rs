//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled probe object and binds it to the [`Instrumentation`]
//! seam used by the pipeline.
//!
//! ## Functions
//!
//! - [`load_ebpf_program()`] - Load eBPF bytecode from the object file
//! - [`init_ebpf_logger()`] - Forward kernel-side `aya-log` output to `log`
//! - [`raise_memlock_rlimit()`] - Lift the locked-memory limit on older kernels
//!
//! ## Attachment Points
//!
//! - **Uprobe**: `SSL_read`, `SSL_write` (entry)
//! - **Uretprobe**: `SSL_read`, `SSL_write` (return)

#![allow(unsafe_code)] // setrlimit() requires unsafe

use std::path::Path;

use aya::{maps::RingBuf, programs::UProbe, Ebpf};
use aya_log::EbpfLogger;
use log::{debug, info, warn};
use snoop_common::EVENT_MAP_NAME;

use super::diagnostics::read_kernel_counters;
use super::probes::{Instrumentation, Probe};
use super::source::RingBufSource;
use crate::domain::TraceError;

/// Load the eBPF program binary
///
/// # Errors
/// Returns an error if the object cannot be read or rejected by the kernel
pub fn load_ebpf_program(path: &Path) -> Result<Ebpf, TraceError> {
    Ebpf::load_file(path).map_err(|e| TraceError::EbpfLoadFailed {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Bump the memlock rlimit; kernels before 5.11 charge BPF maps against it
pub fn raise_memlock_rlimit() {
    let rlim = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("Removing limit on locked memory failed, ret is: {ret}");
    }
}

/// The kernel probe object, loaded through aya
pub struct EbpfInstrumentation {
    bpf: Ebpf,
}

impl EbpfInstrumentation {
    #[must_use]
    pub fn new(bpf: Ebpf) -> Self {
        Self { bpf }
    }

    /// Load the object at `path` and hook up its logger
    ///
    /// # Errors
    /// Returns [`TraceError::EbpfLoadFailed`] if the object cannot be loaded
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let mut bpf = load_ebpf_program(path)?;
        init_ebpf_logger(&mut bpf);
        Ok(Self::new(bpf))
    }
}

impl Instrumentation for EbpfInstrumentation {
    type Source = RingBufSource;

    fn attach(&mut self, probe: &Probe, binary: &Path) -> Result<(), TraceError> {
        let name = probe.program_name();
        let attach_failed = |error: String| TraceError::ProbeAttachFailed {
            probe: name.clone(),
            binary: binary.display().to_string(),
            error,
        };

        let program: &mut UProbe = self
            .bpf
            .program_mut(&name)
            .ok_or_else(|| TraceError::ProbeNotFound(name.clone()))?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| attach_failed(e.to_string()))?;
        program.load().map_err(|e| attach_failed(e.to_string()))?;
        program
            .attach(Some(probe.function), 0, binary, None)
            .map_err(|e| attach_failed(e.to_string()))?;

        Ok(())
    }

    fn open_source(&mut self) -> Result<Self::Source, TraceError> {
        let map = self
            .bpf
            .take_map(EVENT_MAP_NAME)
            .ok_or_else(|| TraceError::EventTableNotFound(EVENT_MAP_NAME.to_string()))?;
        let ring =
            RingBuf::try_from(map).map_err(|e| TraceError::SourceInitFailed(e.to_string()))?;
        RingBufSource::new(ring).map_err(|e| TraceError::SourceInitFailed(e.to_string()))
    }

    fn close(self) {
        match read_kernel_counters(&self.bpf) {
            Ok(counters) => info!("Kernel probes: {counters}"),
            Err(e) => debug!("Kernel counters unavailable: {e}"),
        }
        // Dropping the object detaches every probe link.
        drop(self.bpf);
        info!("✓ Released eBPF program");
    }
}
