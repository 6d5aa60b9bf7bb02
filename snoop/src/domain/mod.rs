//! Domain model for snoop
//!
//! Core newtypes and error enums shared by the capture pipeline, the
//! renderer and the binary.

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{Pid, PidFilter, Tid};

pub use errors::{DecodeError, RenderError, TraceError};
