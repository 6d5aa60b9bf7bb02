//! # Probe Attachment
//!
//! Attaches an entry and a return probe to every traced TLS function.
//! Attachment is sequential and stops at the first failure: a library with
//! only some of its functions instrumented would produce misleading output,
//! so partial instrumentation is treated as a startup error.

use std::fmt;
use std::path::Path;

use log::info;

use super::source::EventSource;
use crate::domain::TraceError;

/// Library functions whose plaintext buffers are captured
pub const TRACED_FUNCTIONS: [&str; 2] = ["SSL_read", "SSL_write"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Fires when the function is entered
    Entry,
    /// Fires when the function returns
    Return,
}

impl ProbeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Entry => "entry",
            ProbeKind::Return => "return",
        }
    }
}

/// One instrumentation point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Probe {
    pub kind: ProbeKind,
    pub function: &'static str,
}

impl Probe {
    /// Name of the program in the loaded object that implements this probe,
    /// e.g. `uprobe_entry_SSL_read`
    #[must_use]
    pub fn program_name(&self) -> String {
        format!("uprobe_{}_{}", self.kind.as_str(), self.function)
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} probe on {}", self.kind.as_str(), self.function)
    }
}

/// Every probe the tracer needs, entry before return for each function
pub fn required_probes() -> impl Iterator<Item = Probe> {
    TRACED_FUNCTIONS.into_iter().flat_map(|function| {
        [ProbeKind::Entry, ProbeKind::Return].into_iter().map(move |kind| Probe { kind, function })
    })
}

/// A loaded instrumentation program
///
/// Implemented by [`EbpfInstrumentation`](super::EbpfInstrumentation) for the
/// real kernel program. The pipeline owns the value from startup until
/// teardown, when [`close`](Instrumentation::close) releases it.
pub trait Instrumentation: Send + 'static {
    type Source: EventSource;

    /// Resolve the program for `probe` and attach it to `binary`
    ///
    /// # Errors
    /// Returns [`TraceError::ProbeNotFound`] or [`TraceError::ProbeAttachFailed`]
    fn attach(&mut self, probe: &Probe, binary: &Path) -> Result<(), TraceError>;

    /// Open the event table the probes publish to
    ///
    /// # Errors
    /// Returns an error if the table is missing or cannot be polled
    fn open_source(&mut self) -> Result<Self::Source, TraceError>;

    /// Detach all probes and release the program
    fn close(self);
}

/// Attach every required probe to `binary`
///
/// Returns the number of probes attached.
///
/// # Errors
/// Returns the first attachment error; later probes are not attempted.
pub fn attach_probes<I: Instrumentation>(
    instrumentation: &mut I,
    binary: &Path,
) -> Result<usize, TraceError> {
    let mut attached = 0;
    for probe in required_probes() {
        instrumentation.attach(&probe, binary)?;
        info!("✓ Attached {probe} ({})", probe.program_name());
        attached += 1;
    }
    Ok(attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ChannelSource;

    /// Records attach calls and fails on the configured program name
    struct Recorder {
        attached: Vec<String>,
        fail_on: Option<String>,
    }

    impl Instrumentation for Recorder {
        type Source = ChannelSource;

        fn attach(&mut self, probe: &Probe, binary: &Path) -> Result<(), TraceError> {
            let name = probe.program_name();
            if self.fail_on.as_deref() == Some(name.as_str()) {
                return Err(TraceError::ProbeAttachFailed {
                    probe: name,
                    binary: binary.display().to_string(),
                    error: "symbol not found".to_string(),
                });
            }
            self.attached.push(name);
            Ok(())
        }

        fn open_source(&mut self) -> Result<Self::Source, TraceError> {
            Ok(ChannelSource::new(1).1)
        }

        fn close(self) {}
    }

    #[test]
    fn test_probe_names() {
        let names: Vec<_> = required_probes().map(|p| p.program_name()).collect();
        assert_eq!(
            names,
            [
                "uprobe_entry_SSL_read",
                "uprobe_return_SSL_read",
                "uprobe_entry_SSL_write",
                "uprobe_return_SSL_write",
            ]
        );
    }

    #[test]
    fn test_attaches_all_four() {
        let mut recorder = Recorder { attached: Vec::new(), fail_on: None };
        let count = attach_probes(&mut recorder, Path::new("/lib/libssl.so.3")).unwrap();
        assert_eq!(count, 4);
        assert_eq!(recorder.attached.len(), 4);
    }

    #[test]
    fn test_stops_at_first_failure() {
        let mut recorder =
            Recorder { attached: Vec::new(), fail_on: Some("uprobe_return_SSL_read".to_string()) };
        let err = attach_probes(&mut recorder, Path::new("/lib/libssl.so.3")).unwrap_err();

        assert!(matches!(err, TraceError::ProbeAttachFailed { ref probe, .. } if probe == "uprobe_return_SSL_read"));
        assert_eq!(recorder.attached, ["uprobe_entry_SSL_read"]);
    }
}
