//! Domain types providing compile-time safety and self-documentation
//!
//! Newtype wrappers keep process and thread IDs from being swapped, and
//! [`PidFilter`] replaces the "negative PID means everything" sentinel with
//! an explicit value.

use std::fmt;

/// Process ID (TGID in kernel terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread ID (PID in kernel terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which processes the tracer reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PidFilter {
    /// Every process that calls into the probed library
    #[default]
    All,
    /// A single process
    Only(Pid),
}

impl PidFilter {
    /// Returns true if events from `pid` pass this filter
    #[must_use]
    pub fn matches(self, pid: Pid) -> bool {
        match self {
            PidFilter::All => true,
            PidFilter::Only(target) => target == pid,
        }
    }
}

/// `None` and negative values select every process.
impl From<Option<i32>> for PidFilter {
    fn from(pid: Option<i32>) -> Self {
        match pid.and_then(|pid| u32::try_from(pid).ok()) {
            Some(pid) => PidFilter::Only(Pid(pid)),
            None => PidFilter::All,
        }
    }
}

impl fmt::Display for PidFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidFilter::All => write!(f, "all processes"),
            PidFilter::Only(pid) => write!(f, "pid {pid}"),
        }
    }
}
