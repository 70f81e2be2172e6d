//! Connectivity state derived from fetch outcomes.
//!
//! The worker never probes the network on its own; every resolved fetch marks
//! the origin reachable and every rejected fetch marks it unreachable. The
//! state only feeds logging and the host's status report; strategies always
//! attempt the network regardless.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use tracing::{info, warn};

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// The last fetch reached the origin.
    Online = 0,
    /// The last fetch was rejected.
    Offline = 1,
    /// No fetch has completed yet.
    Unknown = 2,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
            ConnectivityState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Atomic wrapper for ConnectivityState.
struct AtomicConnectivityState(AtomicU8);

impl AtomicConnectivityState {
    fn new(state: ConnectivityState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ConnectivityState {
        Self::decode(self.0.load(Ordering::SeqCst))
    }

    fn swap(&self, state: ConnectivityState) -> ConnectivityState {
        Self::decode(self.0.swap(state as u8, Ordering::SeqCst))
    }

    fn decode(raw: u8) -> ConnectivityState {
        match raw {
            0 => ConnectivityState::Online,
            1 => ConnectivityState::Offline,
            _ => ConnectivityState::Unknown,
        }
    }
}

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivitySnapshot {
    pub state: ConnectivityState,
    pub consecutive_failures: u64,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Online/offline tracking shared between the fetcher and its host.
pub struct ConnectivityTracker {
    state: AtomicConnectivityState,
    consecutive_failures: AtomicU64,
    /// Unix millis of the last resolved fetch, 0 if none.
    last_success_ms: AtomicI64,
}

impl ConnectivityTracker {
    pub fn new() -> Self {
        Self {
            state: AtomicConnectivityState::new(ConnectivityState::Unknown),
            consecutive_failures: AtomicU64::new(0),
            last_success_ms: AtomicI64::new(0),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state.load()
    }

    pub fn is_offline(&self) -> bool {
        self.state.load() == ConnectivityState::Offline
    }

    /// Record a fetch that reached the origin (any HTTP status).
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.last_success_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);

        if self.state.swap(ConnectivityState::Online) == ConnectivityState::Offline {
            info!("Network connectivity restored");
        }
    }

    /// Record a rejected fetch.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

        if self.state.swap(ConnectivityState::Offline) != ConnectivityState::Offline {
            warn!("Network connectivity lost, serving from cache where possible");
        } else if failures % 50 == 0 {
            warn!("Still offline after {} failed fetches", failures);
        }
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        let last_ms = self.last_success_ms.load(Ordering::SeqCst);
        ConnectivitySnapshot {
            state: self.state.load(),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            last_success_at: if last_ms > 0 {
                DateTime::from_timestamp_millis(last_ms)
            } else {
                None
            },
        }
    }
}

impl Default for ConnectivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_unknown() {
        let tracker = ConnectivityTracker::new();
        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        assert!(tracker.snapshot().last_success_at.is_none());
    }

    #[test]
    fn test_transitions() {
        let tracker = ConnectivityTracker::new();

        tracker.record_failure();
        tracker.record_failure();
        assert!(tracker.is_offline());
        assert_eq!(tracker.snapshot().consecutive_failures, 2);

        tracker.record_success();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.state, ConnectivityState::Online);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.last_success_at.is_some());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectivityState::Offline.to_string(), "offline");
    }
}
