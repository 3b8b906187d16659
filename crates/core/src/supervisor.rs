//! Session lifecycle state machine.
//!
//! ```text
//!            Connected          Played
//! Connecting ─────────▶ Handshaking ─────▶ Playing
//!     ▲                      │                │
//!     │                      │ Failed         │ Failed
//!     │ Released{retry}      ▼                ▼
//!     └──────────────────── Closing ◀─────────┘
//!                            │ Released{no retry}
//!                            ▼
//!                        Terminated ◀── Stop (from any state)
//! ```
//!
//! [`transition`] is pure; [`Supervisor`] applies it, keeps the reconnect
//! bookkeeping, and tells the parent about every state change.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::{ErrorKind, SourceError};
use crate::parent::Parent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Handshaking,
    Playing,
    Closing,
    Terminated,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Playing => write!(f, "playing"),
            Self::Closing => write!(f, "closing"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Control connection (and TLS) established.
    Connected,
    /// PLAY succeeded.
    Played,
    /// The session failed; the connection is being released.
    Failed,
    /// Resources are released; `retry` selects reconnect or stop.
    Released { retry: bool },
    /// Cancellation requested.
    Stop,
}

/// Next state for `event` in `state`, or `None` if the event is not
/// valid there.
pub fn transition(state: State, event: Event) -> Option<State> {
    use State::*;

    match (state, event) {
        (Terminated, _) => None,
        (_, Event::Stop) => Some(Terminated),
        (Connecting, Event::Connected) => Some(Handshaking),
        (Handshaking, Event::Played) => Some(Playing),
        (Connecting | Handshaking | Playing, Event::Failed) => Some(Closing),
        (Closing, Event::Released { retry: true }) => Some(Connecting),
        (Closing, Event::Released { retry: false }) => Some(Terminated),
        _ => None,
    }
}

/// Bookkeeping across reconnect attempts.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    /// Failures since the last successful PLAY.
    pub consecutive_failures: u32,
    pub last_error: Option<ErrorKind>,
    /// When the next connection attempt starts, while waiting.
    pub next_attempt: Option<Instant>,
    /// UDP proved unusable; stays set for the life of the source.
    pub force_tcp: bool,
}

impl ReconnectState {
    pub fn record_failure(&mut self, err: &SourceError) {
        self.consecutive_failures += 1;
        self.last_error = Some(err.kind());
        if matches!(err, SourceError::TransportFallbackNeeded(_)) {
            self.force_tcp = true;
        }
    }

    pub fn record_play(&mut self) {
        self.consecutive_failures = 0;
        self.next_attempt = None;
    }
}

/// Drives [`transition`] for one run of a source.
pub struct Supervisor {
    state: State,
    shared: Arc<RwLock<State>>,
    parent: Arc<dyn Parent>,
    pub reconnect: ReconnectState,
}

impl Supervisor {
    /// Start in `Connecting` and announce it, resuming the bookkeeping of
    /// earlier runs.
    pub fn new(
        shared: Arc<RwLock<State>>,
        parent: Arc<dyn Parent>,
        reconnect: ReconnectState,
    ) -> Self {
        let supervisor = Self {
            state: State::Connecting,
            shared,
            parent,
            reconnect,
        };
        supervisor.publish();
        supervisor
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Apply an event. Invalid events are logged and ignored.
    pub fn fire(&mut self, event: Event) -> State {
        match transition(self.state, event) {
            Some(next) => {
                tracing::debug!(from = %self.state, to = %next, ?event, "state transition");
                self.state = next;
                self.publish();
            }
            None => {
                tracing::debug!(state = %self.state, ?event, "ignoring event");
            }
        }
        self.state
    }

    /// Delay before the next attempt as chosen by the parent, or `None`
    /// to give up.
    pub fn reconnect_delay(&mut self, default: Duration) -> Option<Duration> {
        let delay = self.parent.reconnect_delay(&self.reconnect, default)?;
        self.reconnect.next_attempt = Some(Instant::now() + delay);
        Some(delay)
    }

    fn publish(&self) {
        *self.shared.write() = self.state;
        self.parent.on_state(self.state);
    }
}
