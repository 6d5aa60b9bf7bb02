//! Structured error types for snoop
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while bringing the tracer up
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to load eBPF program {path}: {error}")]
    EbpfLoadFailed { path: PathBuf, error: String },

    #[error("Probe program {0} not found in the loaded object")]
    ProbeNotFound(String),

    #[error("Failed to attach {probe} to {binary}: {error}")]
    ProbeAttachFailed { probe: String, binary: String, error: String },

    #[error("Event table {0} not found in the loaded object")]
    EventTableNotFound(String),

    #[error("Failed to open event source: {0}")]
    SourceInitFailed(String),

    #[error("Tracer already started; create a new one to trace again")]
    AlreadyStarted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A raw record that could not be turned into an event
///
/// Recoverable: the pipeline logs it and moves on to the next record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(
        "record truncated at field `{field}`: needed {needed} bytes at offset {offset}, \
         {available} available"
    )]
    Truncated { field: &'static str, offset: usize, needed: usize, available: usize },
}

impl DecodeError {
    /// Name of the field that failed to decode
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            DecodeError::Truncated { field, .. } => field,
        }
    }
}

/// Failure to render an event for display
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to encode message to JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rendered JSON was not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_attach_error() {
        let err = TraceError::ProbeAttachFailed {
            probe: "uprobe_entry_SSL_read".to_string(),
            binary: "/lib/x86_64-linux-gnu/libssl.so.3".to_string(),
            error: "symbol not found".to_string(),
        };
        assert!(err.to_string().contains("uprobe_entry_SSL_read"));
        assert!(err.to_string().contains("libssl.so.3"));
    }

    #[test]
    fn test_decode_error_names_field() {
        let err = DecodeError::Truncated { field: "tid", offset: 12, needed: 4, available: 2 };
        assert_eq!(err.field(), "tid");
        assert!(err.to_string().contains("`tid`"));
        assert!(err.to_string().contains("offset 12"));
    }
}
