//! Incident correlator: decides when the authoritative snapshot must be refetched
//!
//! Incidents are never derived locally. A `status_change` (or a reconnect, or
//! a gap in the event stream) only marks the incident list as possibly stale;
//! the correlator then drives refetches until one succeeds.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::backoff::Backoff;

/// Whether the incident list is known to match the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncState {
    Stable,
    PendingResync,
}

impl fmt::Display for ResyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncState::Stable => write!(f, "Stable"),
            ResyncState::PendingResync => write!(f, "PendingResync"),
        }
    }
}

/// Where the refetch pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetch {
    Idle,
    InFlight,
    Waiting,
}

#[derive(Debug, Clone)]
pub struct IncidentCorrelator {
    state: ResyncState,
    fetch: Fetch,
    rerun: bool,
    failures: u32,
    backoff: Backoff,
}

impl IncidentCorrelator {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ResyncState::Stable,
            fetch: Fetch::Idle,
            rerun: false,
            failures: 0,
            backoff,
        }
    }

    pub fn state(&self) -> ResyncState {
        self.state
    }

    /// Consecutive failed refetches since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Mark the incident list stale. Returns true when the caller should start
    /// a refetch now.
    ///
    /// A request arriving while a fetch is in flight queues exactly one more
    /// fetch after it, since the in-flight response may predate the change.
    /// A request arriving while a retry is scheduled leaves the schedule alone.
    pub fn request_resync(&mut self) -> bool {
        self.state = ResyncState::PendingResync;
        match self.fetch {
            Fetch::Idle => {
                self.failures = 0;
                self.fetch = Fetch::InFlight;
                true
            }
            Fetch::InFlight => {
                self.rerun = true;
                false
            }
            Fetch::Waiting => false,
        }
    }

    /// A scheduled retry fired. Returns true when the refetch should run.
    pub fn retry_due(&mut self) -> bool {
        if self.fetch == Fetch::Waiting {
            self.fetch = Fetch::InFlight;
            true
        } else {
            false
        }
    }

    /// A refetch succeeded and the snapshot was applied. Returns true when a
    /// queued request requires another refetch right away.
    pub fn resync_succeeded(&mut self) -> bool {
        self.failures = 0;
        if self.rerun {
            self.rerun = false;
            self.fetch = Fetch::InFlight;
            return true;
        }
        self.fetch = Fetch::Idle;
        self.state = ResyncState::Stable;
        false
    }

    /// A refetch failed. Returns the delay before the next attempt, or `None`
    /// when the attempt budget is spent; the state then stays `PendingResync`
    /// until the next request.
    pub fn resync_failed(&mut self) -> Option<Duration> {
        self.failures += 1;
        self.rerun = false;
        if self.backoff.allows(self.failures) {
            self.fetch = Fetch::Waiting;
            Some(self.backoff.delay(self.failures))
        } else {
            self.fetch = Fetch::Idle;
            None
        }
    }

    /// Forget any pending work, e.g. when the owning view closes
    pub fn reset(&mut self) {
        self.state = ResyncState::Stable;
        self.fetch = Fetch::Idle;
        self.rerun = false;
        self.failures = 0;
    }
}
