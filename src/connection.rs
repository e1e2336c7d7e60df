//! Connection lifecycle state machine.
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected
//!      ▲               │            │
//!      └───────────────┴────────────┘
//!   any state ─► Closing (terminal)
//! ```
//!
//! Every state change goes through [`Connection::transition`] (or
//! [`Connection::close`]), which rejects edges not in the diagram. The
//! current state is published on a `watch` channel so the owner of the
//! bridge can observe the frame loop without sharing any other state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::error::{BridgeError, Result};

/// State of the controller connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Socket open, frame loop reading.
    Connected,
    /// Shut down; no further transitions.
    Closing,
}

impl ConnectionState {
    /// Whether `self -> next` is a valid edge.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Disconnected, Closing)
                | (Connecting, Closing)
                | (Connected, Closing)
        )
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closing
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Shared connection state: lifecycle, reconnect flag and shutdown signal.
#[derive(Debug)]
pub struct Connection {
    state: watch::Sender<ConnectionState>,
    reconnect_allowed: AtomicBool,
    shutdown: watch::Sender<bool>,
    sessions: AtomicU64,
}

impl Connection {
    /// New connection in `Disconnected`.
    pub fn new(reconnect_allowed: bool) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            state,
            reconnect_allowed: AtomicBool::new(reconnect_allowed),
            shutdown,
            sessions: AtomicU64::new(0),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Move to `next`, returning the previous state.
    ///
    /// Fails with `InvalidState` if the edge is not allowed.
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState> {
        let mut previous = None;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                previous = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        match previous {
            Some(prev) => {
                tracing::debug!(from = %prev, to = %next, "connection state");
                Ok(prev)
            }
            None => Err(BridgeError::InvalidState(format!(
                "cannot go from {} to {}",
                self.state(),
                next
            ))),
        }
    }

    /// Whether the frame loop may reconnect after losing the socket.
    pub fn reconnect_allowed(&self) -> bool {
        self.reconnect_allowed.load(Ordering::Acquire)
    }

    /// Make the next connection loss terminal.
    pub fn disallow_reconnect(&self) {
        self.reconnect_allowed.store(false, Ordering::Release);
    }

    /// Enter `Closing`, disable reconnect and signal the frame loop.
    ///
    /// Idempotent. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        self.disallow_reconnect();
        self.shutdown.send_replace(true);
        let changed = self.state.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = ConnectionState::Closing;
                true
            }
        });
        if changed {
            tracing::debug!(to = %ConnectionState::Closing, "connection state");
        }
        changed
    }

    /// Whether `close` was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Receiver for the shutdown signal (`true` once closed).
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Count a new socket session and return its number (1-based).
    pub fn begin_session(&self) -> u64 {
        self.sessions.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of socket sessions started so far.
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_valid_cycle() {
        let conn = Connection::new(true);
        assert_eq!(conn.state(), Disconnected);
        assert_eq!(conn.transition(Connecting).unwrap(), Disconnected);
        assert_eq!(conn.transition(Connected).unwrap(), Connecting);
        assert_eq!(conn.transition(Disconnected).unwrap(), Connected);
        conn.transition(Connecting).unwrap();
        conn.transition(Disconnected).unwrap();
        assert_eq!(conn.state(), Disconnected);
    }

    #[test]
    fn test_invalid_edges() {
        let conn = Connection::new(true);
        assert!(matches!(
            conn.transition(Connected),
            Err(BridgeError::InvalidState(_))
        ));
        conn.transition(Connecting).unwrap();
        assert!(conn.transition(Connecting).is_err());
        conn.transition(Connected).unwrap();
        // reconnect only happens from Disconnected
        assert!(conn.transition(Connecting).is_err());
        assert_eq!(conn.state(), Connected);
    }

    #[test]
    fn test_close_is_terminal() {
        let conn = Connection::new(true);
        conn.transition(Connecting).unwrap();
        assert!(conn.close());
        assert!(!conn.close());
        assert_eq!(conn.state(), Closing);
        assert!(!conn.reconnect_allowed());
        assert!(conn.is_shutdown_requested());
        for next in [Disconnected, Connecting, Connected] {
            assert!(conn.transition(next).is_err());
        }
    }

    #[test]
    fn test_disallow_reconnect_keeps_state() {
        let conn = Connection::new(true);
        conn.transition(Connecting).unwrap();
        conn.transition(Connected).unwrap();
        conn.disallow_reconnect();
        assert!(!conn.reconnect_allowed());
        assert_eq!(conn.state(), Connected);
        assert!(!conn.is_shutdown_requested());
    }

    #[test]
    fn test_sessions() {
        let conn = Connection::new(false);
        assert_eq!(conn.begin_session(), 1);
        assert_eq!(conn.begin_session(), 2);
        assert_eq!(conn.sessions(), 2);
    }

    #[tokio::test]
    async fn test_watchers_see_transitions() {
        let conn = Connection::new(true);
        let mut state = conn.subscribe();
        let mut shutdown = conn.shutdown_signal();

        conn.transition(Connecting).unwrap();
        state.changed().await.unwrap();
        assert_eq!(*state.borrow_and_update(), Connecting);

        conn.close();
        shutdown.wait_for(|closed| *closed).await.unwrap();
        state.changed().await.unwrap();
        assert_eq!(*state.borrow(), Closing);
    }
}
