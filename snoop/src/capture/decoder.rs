//! # Record Decoding
//!
//! Turns one raw `TLS_EVENTS` record into a [`TracedEvent`].
//!
//! Fields are read one after another at fixed offsets with little-endian,
//! width-exact reads (see the layout table in `snoop_common`). A record that
//! runs out of bytes fails on the first field it cannot fill; nothing partial
//! is ever returned. Bytes past [`RECORD_SIZE`] are ignored.

use byteorder::{ByteOrder, LittleEndian};
use memchr::memchr;
use snoop_common::{COMM_LEN, MAX_DATA_SIZE, RECORD_SIZE};

use super::event::{TlsFunction, TracedEvent};
use crate::domain::{DecodeError, Pid, Tid};

/// Decode a raw record
///
/// # Errors
/// Returns [`DecodeError::Truncated`] naming the first field that did not fit
/// in `bytes`.
pub fn decode(bytes: &[u8]) -> Result<TracedEvent, DecodeError> {
    let mut reader = FieldReader::new(bytes);

    let elapsed_us = reader.u64("elapsed")?;
    let pid = reader.u32("pid")?;
    let tid = reader.u32("tid")?;
    let result = reader.i32("result")?;
    let function = reader.i32("function")?;
    let process_name = reader.take("process_name", COMM_LEN)?;
    let content = reader.take("content", MAX_DATA_SIZE)?;

    Ok(TracedEvent {
        elapsed_us,
        pid: Pid(pid),
        tid: Tid(tid),
        result,
        function: TlsFunction::from_code(function),
        process_name: until_nul(process_name).into(),
        content: until_nul(content).into(),
    })
}

/// Everything before the first NUL, or the whole buffer if there is none
fn until_nul(buf: &[u8]) -> &[u8] {
    &buf[..memchr(0, buf).unwrap_or(buf.len())]
}

/// Sequential reader over a record that tracks its offset for error reports
struct FieldReader<'a> {
    rest: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes, offset: 0 }
    }

    fn take(&mut self, field: &'static str, needed: usize) -> Result<&'a [u8], DecodeError> {
        if self.rest.len() < needed {
            return Err(DecodeError::Truncated {
                field,
                offset: self.offset,
                needed,
                available: self.rest.len(),
            });
        }
        let (head, tail) = self.rest.split_at(needed);
        self.rest = tail;
        self.offset += needed;
        Ok(head)
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        self.take(field, 8).map(LittleEndian::read_u64)
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        self.take(field, 4).map(LittleEndian::read_u32)
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        self.take(field, 4).map(LittleEndian::read_i32)
    }
}

/// Encodes records in the kernel layout
///
/// Feeds [`ChannelSource`](super::ChannelSource) when replaying traffic
/// without kernel instrumentation, e.g. in tests.
#[derive(Debug, Clone)]
pub struct RawRecordBuilder {
    bytes: Vec<u8>,
}

impl Default for RawRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RawRecordBuilder {
    /// A record with every field zeroed
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: vec![0u8; RECORD_SIZE] }
    }

    #[must_use]
    pub fn elapsed_us(mut self, elapsed_us: u64) -> Self {
        LittleEndian::write_u64(&mut self.bytes[0..8], elapsed_us);
        self
    }

    #[must_use]
    pub fn pid(mut self, pid: u32) -> Self {
        LittleEndian::write_u32(&mut self.bytes[8..12], pid);
        self
    }

    #[must_use]
    pub fn tid(mut self, tid: u32) -> Self {
        LittleEndian::write_u32(&mut self.bytes[12..16], tid);
        self
    }

    #[must_use]
    pub fn result(mut self, result: i32) -> Self {
        LittleEndian::write_i32(&mut self.bytes[16..20], result);
        self
    }

    #[must_use]
    pub fn function(mut self, code: i32) -> Self {
        LittleEndian::write_i32(&mut self.bytes[20..24], code);
        self
    }

    /// Copies at most `COMM_LEN` bytes; the rest of the field stays zeroed
    #[must_use]
    pub fn process_name(mut self, name: &[u8]) -> Self {
        let field = &mut self.bytes[24..24 + COMM_LEN];
        field.fill(0);
        let len = name.len().min(COMM_LEN);
        field[..len].copy_from_slice(&name[..len]);
        self
    }

    /// Copies at most `MAX_DATA_SIZE` bytes; the rest of the field stays zeroed
    #[must_use]
    pub fn content(mut self, content: &[u8]) -> Self {
        let field = &mut self.bytes[24 + COMM_LEN..];
        field.fill(0);
        let len = content.len().min(MAX_DATA_SIZE);
        field[..len].copy_from_slice(&content[..len]);
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
