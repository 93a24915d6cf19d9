//! Session lifecycle state shared between the workers.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::transport::TransportHandle;

/// Lifecycle phase of the session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed but not started
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// The transport is open and usable
    Connected,
    /// Waiting out the backoff delay before the next attempt
    Reconnecting,
    /// Cooperative shutdown in progress
    Stopping,
    /// Terminal; workers joined, transport released
    Stopped,
}

impl Phase {
    /// Whether the transport is currently usable.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the session is live: started and not shutting down.
    #[must_use]
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Idle | Self::Stopping | Self::Stopped)
    }

    /// Whether the session is shutting down or already gone.
    ///
    /// Workers exit and reconnect requests become no-ops in these phases.
    #[must_use]
    pub fn is_shutdown(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Mutable session state, guarded by a single mutex.
///
/// The transport handle lives here so the send worker can check the phase
/// and reach the live transport under one lock acquisition.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: Phase,
    pub retry_count: u32,
    pub max_retries_reached: bool,
    pub last_message_at: Option<Instant>,
    pub transport: Option<TransportHandle>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            retry_count: 0,
            max_retries_reached: false,
            last_message_at: None,
            transport: None,
        }
    }

    /// Transition to Connected, storing the live transport and clearing the
    /// retry budget.
    pub(crate) fn mark_connected(&mut self, transport: TransportHandle) {
        self.phase = Phase::Connected;
        self.retry_count = 0;
        self.max_retries_reached = false;
        self.transport = Some(transport);
    }

    pub(crate) fn record_message(&mut self) {
        self.last_message_at = Some(Instant::now());
    }
}

/// Point-in-time snapshot of the session, as exposed by `Session::status`
/// and embedded in monitor frames.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    /// Whether the transport is open
    pub connected: bool,
    /// Whether the session has been started and not yet fully stopped
    pub started: bool,
    /// Whether a shutdown is in progress
    pub stopping: bool,
    /// Consecutive failed connection attempts since the last success
    pub retry_count: u32,
    /// Whether the retry budget was exhausted (terminal)
    pub max_retries_reached: bool,
    /// Number of frames waiting in the outbound queue
    pub queue_size: usize,
    /// Whether the event-loop worker task is still alive
    pub event_worker_alive: bool,
    /// Whether the send worker task is still alive
    pub send_worker_alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_covers_the_live_phases() {
        assert!(!Phase::Idle.is_running());
        assert!(Phase::Connecting.is_running());
        assert!(Phase::Connected.is_running());
        assert!(Phase::Reconnecting.is_running());
        assert!(!Phase::Stopping.is_running());
        assert!(!Phase::Stopped.is_running());
    }

    #[test]
    fn mark_connected_resets_the_retry_budget() {
        let mut state = SessionState::new();
        state.retry_count = 7;
        state.max_retries_reached = true;

        state.mark_connected(TransportHandle::disconnected_for_tests());

        assert_eq!(state.phase, Phase::Connected);
        assert_eq!(state.retry_count, 0);
        assert!(!state.max_retries_reached);
        assert!(state.transport.is_some());
    }

    #[test]
    fn record_message_advances_monotonically() {
        let mut state = SessionState::new();
        assert!(state.last_message_at.is_none());

        state.record_message();
        let first = state.last_message_at.unwrap();
        state.record_message();
        let second = state.last_message_at.unwrap();

        assert!(second >= first);
    }
}
