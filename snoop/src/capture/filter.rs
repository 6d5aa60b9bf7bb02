//! Decides which decoded events reach the consumer

use super::event::TracedEvent;
use crate::domain::PidFilter;

/// Outcome of running an event through a [`MessageFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Content buffer started with a NUL
    NoContent,
    /// Event came from a process other than the configured one
    OtherProcess,
}

/// Pass/drop policy applied between decoding and forwarding
///
/// Empty events are dropped regardless of PID. Pure and order-independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pid: PidFilter,
}

impl MessageFilter {
    #[must_use]
    pub fn new(pid: PidFilter) -> Self {
        Self { pid }
    }

    #[must_use]
    pub fn pid_filter(&self) -> PidFilter {
        self.pid
    }

    #[must_use]
    pub fn check(&self, event: &TracedEvent) -> Verdict {
        if !event.has_content() {
            Verdict::NoContent
        } else if !self.pid.matches(event.pid()) {
            Verdict::OtherProcess
        } else {
            Verdict::Pass
        }
    }

    #[must_use]
    pub fn accepts(&self, event: &TracedEvent) -> bool {
        self.check(event) == Verdict::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{decode, RawRecordBuilder};
    use crate::domain::Pid;

    fn event(pid: u32, content: &[u8]) -> TracedEvent {
        decode(&RawRecordBuilder::new().pid(pid).content(content).build()).unwrap()
    }

    #[test]
    fn test_unset_pid_passes_everything_with_content() {
        let filter = MessageFilter::default();
        assert!(filter.accepts(&event(1, b"a")));
        assert!(filter.accepts(&event(99_999, b"b")));
    }

    #[test]
    fn test_pid_must_match() {
        let filter = MessageFilter::new(PidFilter::Only(Pid(10)));
        assert_eq!(filter.check(&event(10, b"a")), Verdict::Pass);
        assert_eq!(filter.check(&event(11, b"a")), Verdict::OtherProcess);
    }

    #[test]
    fn test_empty_content_dropped_even_when_pid_matches() {
        let filter = MessageFilter::new(PidFilter::Only(Pid(10)));
        assert_eq!(filter.check(&event(10, b"")), Verdict::NoContent);
        assert_eq!(MessageFilter::default().check(&event(10, b"\0abc")), Verdict::NoContent);
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let filter = MessageFilter::new(PidFilter::Only(Pid(3)));
        let events = [event(3, b"x"), event(4, b"y"), event(3, b""), event(3, b"z")];

        let once: Vec<_> = events.iter().filter(|e| filter.accepts(e)).cloned().collect();
        let twice: Vec<_> = once.iter().filter(|e| filter.accepts(e)).cloned().collect();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }
}
