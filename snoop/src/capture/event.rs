//! Decoded TLS events

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use snoop_common::{FN_SSL_READ, FN_SSL_WRITE};

use crate::domain::{Pid, Tid};

/// Which probed function produced an event
///
/// Unrecognised codes are kept rather than rejected so a newer kernel
/// program never breaks decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsFunction {
    Read,
    Write,
    Unknown(i32),
}

impl TlsFunction {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            FN_SSL_READ => TlsFunction::Read,
            FN_SSL_WRITE => TlsFunction::Write,
            other => TlsFunction::Unknown(other),
        }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            TlsFunction::Read => FN_SSL_READ,
            TlsFunction::Write => FN_SSL_WRITE,
            TlsFunction::Unknown(code) => code,
        }
    }

    /// Display name used by both output formats
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TlsFunction::Read => "SSL_READ",
            TlsFunction::Write => "SSL_WRITE",
            TlsFunction::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for TlsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One captured `SSL_read` / `SSL_write` call
///
/// Built once by [`decode`](super::decode) and never mutated afterwards.
/// The byte buffers hold the logical values only: everything before the
/// first NUL of the fixed-size kernel buffers, or the whole buffer when no
/// NUL was present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedEvent {
    pub(crate) elapsed_us: u64,
    pub(crate) pid: Pid,
    pub(crate) tid: Tid,
    pub(crate) result: i32,
    pub(crate) function: TlsFunction,
    pub(crate) process_name: Box<[u8]>,
    pub(crate) content: Box<[u8]>,
}

impl TracedEvent {
    /// Duration of the traced call in microseconds
    #[must_use]
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us)
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Return value of the traced call
    #[must_use]
    pub fn result(&self) -> i32 {
        self.result
    }

    #[must_use]
    pub fn function(&self) -> TlsFunction {
        self.function
    }

    /// Raw command name bytes, without the terminator
    #[must_use]
    pub fn process_name_bytes(&self) -> &[u8] {
        &self.process_name
    }

    #[must_use]
    pub fn process_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.process_name)
    }

    /// Captured plaintext, without the terminator
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[must_use]
    pub fn content_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Logical length of the content: offset of the first NUL, or the full
    /// buffer capacity when none was found
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    /// False when the content buffer starts with a NUL
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_codes() {
        assert_eq!(TlsFunction::from_code(0), TlsFunction::Read);
        assert_eq!(TlsFunction::from_code(1), TlsFunction::Write);
        assert_eq!(TlsFunction::from_code(7), TlsFunction::Unknown(7));
        assert_eq!(TlsFunction::from_code(-3).name(), "UNKNOWN");
        assert_eq!(TlsFunction::Unknown(7).code(), 7);
    }

    #[test]
    fn test_function_names() {
        assert_eq!(TlsFunction::Read.to_string(), "SSL_READ");
        assert_eq!(TlsFunction::Write.to_string(), "SSL_WRITE");
    }
}
