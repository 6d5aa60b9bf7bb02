//! # Event Sources
//!
//! Where raw records come from. The pipeline only sees the narrow
//! [`EventSource`] capability, so the decode loop runs the same against the
//! kernel ring buffer and against canned records.
//!
//! - [`RingBufSource`] - the `TLS_EVENTS` ring buffer, woken through epoll
//! - [`ChannelSource`] - records pushed through an mpsc channel

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use aya::maps::{MapData, RingBuf};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

/// An undecoded record exactly as the kernel produced it
pub type RawRecord = Vec<u8>;

#[async_trait]
pub trait EventSource: Send + 'static {
    /// Wait for the next raw record
    ///
    /// Returns `Ok(None)` once the source is closed or exhausted. Must be
    /// cancel safe: dropping the future never loses a record.
    async fn poll(&mut self) -> io::Result<Option<RawRecord>>;

    /// Stop producing records. Idempotent.
    fn close(&mut self);
}

/// Reads the `TLS_EVENTS` ring buffer
///
/// Readiness comes from the map fd via [`AsyncFd`], so the source must be
/// created inside a Tokio runtime.
pub struct RingBufSource {
    ring: AsyncFd<RingBuf<MapData>>,
    pending: VecDeque<RawRecord>,
    closed: bool,
}

impl RingBufSource {
    /// # Errors
    /// Returns an error if the map fd cannot be registered with the reactor
    pub fn new(ring: RingBuf<MapData>) -> io::Result<Self> {
        Ok(Self { ring: AsyncFd::new(ring)?, pending: VecDeque::new(), closed: false })
    }
}

#[async_trait]
impl EventSource for RingBufSource {
    async fn poll(&mut self) -> io::Result<Option<RawRecord>> {
        loop {
            if self.closed {
                return Ok(None);
            }
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            let mut guard = self.ring.readable_mut().await?;
            let ring = guard.get_inner_mut();
            while let Some(item) = ring.next() {
                self.pending.push_back(item.to_vec());
            }
            guard.clear_ready();
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}

/// Replays records sent through a channel
///
/// Exhausted once every sender is dropped.
pub struct ChannelSource {
    records: mpsc::Receiver<RawRecord>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<RawRecord>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { records: rx })
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn poll(&mut self) -> io::Result<Option<RawRecord>> {
        Ok(self.records.recv().await)
    }

    fn close(&mut self) {
        self.records.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_replays_in_order() {
        let (tx, mut source) = ChannelSource::new(4);
        tx.send(vec![1]).await.unwrap();
        tx.send(vec![2]).await.unwrap();
        drop(tx);

        assert_eq!(source.poll().await.unwrap(), Some(vec![1]));
        assert_eq!(source.poll().await.unwrap(), Some(vec![2]));
        assert_eq!(source.poll().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_channel_source_close_rejects_new_records() {
        let (tx, mut source) = ChannelSource::new(4);
        source.close();
        source.close();

        assert!(tx.send(vec![1]).await.is_err());
        assert_eq!(source.poll().await.unwrap(), None);
    }
}
