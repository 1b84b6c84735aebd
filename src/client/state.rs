//! Session state and shared signals.
//!
//! [`ConnectionState`] only moves forward. `Closing` and `Closed` can be
//! entered from any state that is not already `Closed`.
//!
//! ```text
//! Disconnected → Connecting → Connected → AwaitingLogin → Ready
//!       └────────────┴────────────┴─────────────┴───────────┴──→ Closing → Closed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::Event;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Client`](crate::Client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Built, not yet connected.
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Socket open, listener running.
    Connected,
    /// Identity verified, waiting for the lifecycle event.
    AwaitingLogin,
    /// Fully logged in.
    Ready,
    /// Shutdown in progress.
    Closing,
    /// Terminal; the client cannot be reused.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match next {
            Self::Closing => self < Self::Closing,
            Self::Closed => self != Self::Closed,
            Self::Connecting => self == Self::Disconnected,
            Self::Connected => self == Self::Connecting,
            Self::AwaitingLogin => self == Self::Connected,
            Self::Ready => self == Self::AwaitingLogin,
            Self::Disconnected => false,
        }
    }

    /// Returns `true` for `Closing` and `Closed`.
    #[inline]
    #[must_use]
    pub fn is_terminating(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AwaitingLogin => "awaiting_login",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// The most recent heartbeat meta event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Gateway timestamp (seconds), if present.
    pub time: Option<i64>,
    /// Announced heartbeat interval in milliseconds, if present.
    pub interval_ms: Option<i64>,
    /// When the frame was received locally.
    pub received_at: Instant,
}

impl Heartbeat {
    /// Captures a heartbeat from its meta event.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self {
            time: event.time(),
            interval_ms: event.get_i64("interval"),
            received_at: Instant::now(),
        }
    }
}

// ============================================================================
// SessionSignals
// ============================================================================

/// Signals shared by the client, the dispatcher and the listener task.
pub(crate) struct SessionSignals {
    /// Current lifecycle state.
    state: watch::Sender<ConnectionState>,
    /// Single-fire shutdown flag.
    shutdown: watch::Sender<bool>,
    /// Set when the caller asked for the session to end.
    close_requested: AtomicBool,
    /// Set once the lifecycle meta event has been seen.
    lifecycle: watch::Sender<bool>,
    /// First fatal fault, reported once.
    fault: Mutex<Option<Error>>,
    /// Last heartbeat.
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl SessionSignals {
    /// Creates signals for a fresh `Disconnected` session.
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(ConnectionState::Disconnected),
            shutdown: watch::Sender::new(false),
            close_requested: AtomicBool::new(false),
            lifecycle: watch::Sender::new(false),
            fault: Mutex::new(None),
            heartbeat: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver observing state changes.
    #[inline]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves to `next` if allowed; check and update are one step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if `next` does not follow the
    /// current state.
    pub fn transition(&self, next: ConnectionState) -> Result<()> {
        let mut outcome = Ok(());

        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                trace!(from = %current, to = %next, "State transition");
                *current = next;
                true
            } else {
                outcome = Err(Error::invalid_transition(*current, next));
                false
            }
        });

        outcome
    }

    /// Waits until the session reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == target).await;
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Fires the shutdown signal. Returns `true` on the first call.
    pub fn shutdown(&self) -> bool {
        !self.shutdown.send_replace(true)
    }

    /// Returns `true` once shutdown has fired.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Returns a receiver for the shutdown flag.
    #[inline]
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Marks the shutdown as caller-initiated.
    #[inline]
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    /// Returns `true` if the caller asked for the session to end.
    #[inline]
    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Sets or clears the lifecycle latch.
    #[inline]
    pub fn set_lifecycle(&self, seen: bool) {
        self.lifecycle.send_replace(seen);
    }

    /// Returns a receiver for the lifecycle latch.
    #[inline]
    pub fn subscribe_lifecycle(&self) -> watch::Receiver<bool> {
        self.lifecycle.subscribe()
    }

    // ------------------------------------------------------------------------
    // Fault
    // ------------------------------------------------------------------------

    /// Records a fatal fault. Only the first one is kept.
    pub fn record_fault(&self, fault: Error) {
        let mut slot = self.fault.lock();
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    /// Takes the recorded fault, leaving none behind.
    #[inline]
    pub fn take_fault(&self) -> Option<Error> {
        self.fault.lock().take()
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    /// Stores the latest heartbeat.
    #[inline]
    pub fn record_heartbeat(&self, heartbeat: Heartbeat) {
        *self.heartbeat.lock() = Some(heartbeat);
    }

    /// Returns the latest heartbeat.
    #[inline]
    pub fn last_heartbeat(&self) -> Option<Heartbeat> {
        *self.heartbeat.lock()
    }
}

/// Resolves once `flag` is `true`. Returns `false` if the sender is gone.
pub(crate) async fn wait_until_set(flag: &mut watch::Receiver<bool>) -> bool {
    flag.wait_for(|set| *set).await.is_ok()
}

// ============================================================================
// Tests
// ============================================================================
