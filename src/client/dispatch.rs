//! Inbound frame classification.
//!
//! Every text frame is handled exactly once:
//!
//! | Frame | Destination |
//! |-------|-------------|
//! | `echo` matches a pending action | [`CorrelationTable`], resolved inline |
//! | `post_type` = `message` / `notice` / `meta_event` | [`EventRouter`] |
//! | no `post_type` | [`EventRouter`], gateway-status category |
//! | invalid JSON or unknown type | dropped and logged |
//!
//! Lifecycle, heartbeat and rejected-token frames also update the session
//! before subscribers see them.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::error::Error;
use crate::protocol::{Event, RETCODE_INVALID_TOKEN};
use crate::transport::{CorrelationTable, FrameHandler};

use super::events::EventRouter;
use super::state::{Heartbeat, SessionSignals};

// ============================================================================
// Dispatcher
// ============================================================================

/// [`FrameHandler`] wiring the transport to correlation and routing.
pub(crate) struct Dispatcher {
    correlation: Arc<CorrelationTable>,
    router: Arc<EventRouter>,
    signals: Arc<SessionSignals>,
}

impl Dispatcher {
    /// Creates a dispatcher over the session's shared state.
    pub fn new(
        correlation: Arc<CorrelationTable>,
        router: Arc<EventRouter>,
        signals: Arc<SessionSignals>,
    ) -> Self {
        Self {
            correlation,
            router,
            signals,
        }
    }

    /// Routes a non-response frame to subscribers.
    fn route_event(&self, frame: Value) {
        let Some(event) = Event::from_payload(frame) else {
            debug!("Dropping event with unknown type");
            return;
        };

        self.observe(&event);

        let started = self.router.dispatch(event);
        trace!(handlers = started, "Event dispatched");
    }

    /// Applies session side effects of an event.
    fn observe(&self, event: &Event) {
        if event.is_lifecycle() {
            info!(sub_type = ?event.sub_type(), "Lifecycle event received");
            self.signals.set_lifecycle(true);
        } else if event.is_heartbeat() {
            trace!("Heartbeat received");
            self.signals.record_heartbeat(Heartbeat::from_event(event));
        } else if event.is_invalid_credential() {
            error!(retcode = RETCODE_INVALID_TOKEN, "Gateway rejected the access token");
            self.signals.record_fault(Error::invalid_credential(RETCODE_INVALID_TOKEN));
            self.signals.shutdown();
        }
    }
}

impl FrameHandler for Dispatcher {
    fn handle_frame(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
                return;
            }
        };

        let echo = frame.get("echo").and_then(Value::as_str).map(str::to_owned);

        let frame = match echo {
            Some(echo) => match self.correlation.resolve(&echo, frame) {
                Ok(()) => return,
                Err(frame) => {
                    trace!(echo = %echo, "Echo not pending, routing as event");
                    frame
                }
            },
            None => frame,
        };

        self.route_event(frame);
    }
}

// ============================================================================
// Tests
// ============================================================================
