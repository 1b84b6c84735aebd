//! Request/response correlation by `echo` token.
//!
//! Every outgoing action is registered here before it is written to the
//! socket. The dispatcher resolves entries as responses arrive.
//!
//! # Invariants
//!
//! - A token in the table has not yet seen its response.
//! - Resolution removes the entry under the lock and only then wakes the
//!   waiter, so a token can never be resolved twice.
//! - Every entry ends exactly once: resolved, timed out, cancelled (waiter
//!   dropped) or failed at shutdown.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::Echo;
use crate::protocol::ActionResponse;

// ============================================================================
// Types
// ============================================================================

/// Single-assignment result slot.
type ResponseSlot = oneshot::Sender<Result<ActionResponse>>;

/// An action waiting for its response.
struct PendingRequest {
    /// Action name, for logs and timeout errors.
    action: String,
    /// When the entry was registered.
    created_at: Instant,
    /// Where the response goes.
    slot: ResponseSlot,
}

// ============================================================================
// CorrelationTable
// ============================================================================

/// Map of echo tokens to pending result slots.
///
/// Shared between action callers (insert) and the frame dispatcher
/// (remove + resolve). No lock is ever held across an `.await`.
pub struct CorrelationTable {
    /// Pending requests by token.
    pending: Mutex<FxHashMap<Echo, PendingRequest>>,
    /// Maximum pending requests before rejecting new ones.
    max_pending: usize,
}

impl CorrelationTable {
    /// Creates an empty table accepting up to `max_pending` entries.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Mutex::new(FxHashMap::default()),
            max_pending,
        }
    }

    /// Registers a pending request.
    ///
    /// The returned [`PendingResponse`] removes the entry when dropped, so
    /// an abandoned wait never leaves a stale token behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the table is full or the token is
    /// already pending.
    pub fn register(self: &Arc<Self>, echo: Echo, action: &str) -> Result<PendingResponse> {
        let (slot, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock();

            if pending.len() >= self.max_pending {
                warn!(
                    pending = pending.len(),
                    max = self.max_pending,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    pending.len(),
                    self.max_pending
                )));
            }

            if pending.contains_key(&echo) {
                return Err(Error::protocol(format!("Duplicate echo token: {echo}")));
            }

            pending.insert(
                echo.clone(),
                PendingRequest {
                    action: action.to_string(),
                    created_at: Instant::now(),
                    slot,
                },
            );
        }

        trace!(echo = %echo, action, "Registered pending request");

        Ok(PendingResponse {
            echo,
            action: action.to_string(),
            rx,
            table: Arc::clone(self),
        })
    }

    /// Resolves the request registered under `echo` with `frame`.
    ///
    /// Returns the frame back as `Err` when no such request is pending, so
    /// the caller can route it as an event instead. A waiter that already
    /// gave up is not an error; the response is discarded.
    pub fn resolve(&self, echo: &str, frame: Value) -> std::result::Result<(), Value> {
        let Some(entry) = self.pending.lock().remove(echo) else {
            return Err(frame);
        };

        let response = serde_json::from_value::<ActionResponse>(frame).map_err(Error::from);

        trace!(
            echo,
            action = %entry.action,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "Resolved pending request"
        );

        if entry.slot.send(response).is_err() {
            debug!(echo, action = %entry.action, "Waiter gone, response discarded");
        }

        Ok(())
    }

    /// Removes a pending request without resolving it.
    ///
    /// Returns `true` if the entry was still present.
    pub fn cancel(&self, echo: &str) -> bool {
        self.pending.lock().remove(echo).is_some()
    }

    /// Fails every pending request with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of requests failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();

        for (_, entry) in drained {
            let _ = entry.slot.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }

        count
    }

    /// Returns `true` if `echo` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, echo: &str) -> bool {
        self.pending.lock().contains_key(echo)
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Handle for awaiting one registered request.
///
/// Dropping the handle cancels the request.
pub struct PendingResponse {
    /// Token the request is registered under.
    echo: Echo,
    /// Action name, for the timeout error.
    action: String,
    /// Receiving end of the result slot.
    rx: oneshot::Receiver<Result<ActionResponse>>,
    /// Owning table, for cleanup.
    table: Arc<CorrelationTable>,
}

impl PendingResponse {
    /// Returns the token this request is registered under.
    #[inline]
    #[must_use]
    pub fn echo(&self) -> &Echo {
        &self.echo
    }

    /// Waits for the response.
    ///
    /// # Errors
    ///
    /// - [`Error::ActionTimeout`] if nothing arrives within `wait`; the
    ///   entry is removed before returning
    /// - [`Error::ConnectionClosed`] if the session shut down first
    /// - [`Error::Json`] if the response frame was malformed
    pub async fn wait(mut self, wait: Duration) -> Result<ActionResponse> {
        match timeout(wait, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.table.cancel(self.echo.as_str());
                debug!(echo = %self.echo, action = %self.action, "Action timed out");
                Err(Error::action_timeout(
                    self.action.as_str(),
                    wait.as_millis() as u64,
                ))
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.table.cancel(self.echo.as_str()) {
            trace!(echo = %self.echo, action = %self.action, "Pending request cancelled");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn table() -> Arc<CorrelationTable> {
        Arc::new(CorrelationTable::new(16))
    }

    fn ok_frame(echo: &str, marker: i64) -> Value {
        json!({ "status": "ok", "retcode": 0, "data": { "marker": marker }, "echo": echo })
    }

    #[tokio::test]
    async fn test_resolve_wakes_waiter() {
        let table = table();
        let pending = table.register(Echo::from("a"), "get_msg").expect("register");

        assert_ok!(table.resolve("a", ok_frame("a", 1)));
        assert!(table.is_empty());

        let response = pending.wait(Duration::from_secs(1)).await.expect("resolved");
        assert_eq!(response.get_i64("marker"), Some(1));
    }

    #[test]
    fn test_unknown_echo_returns_frame() {
        let table = table();
        let frame = ok_frame("nope", 1);
        let returned = assert_err!(table.resolve("nope", frame.clone()));
        assert_eq!(returned, frame);
    }

    #[test]
    fn test_second_resolve_is_not_matched() {
        let table = table();
        let _pending = table.register(Echo::from("a"), "get_msg").expect("register");

        assert_ok!(table.resolve("a", ok_frame("a", 1)));
        assert_err!(table.resolve("a", ok_frame("a", 2)));
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let table = table();
        let pending = table.register(Echo::from("slow"), "get_group_info").expect("register");
        assert!(table.contains("slow"));

        let err = pending.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::ActionTimeout { ref action, .. } if action == "get_group_info"));
        assert!(!table.contains("slow"));
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_benign() {
        let table = table();
        let pending = table.register(Echo::from("late"), "get_msg").expect("register");
        let _ = pending.wait(Duration::from_millis(5)).await;

        // Gone from the table, so the frame is handed back for event routing.
        assert_err!(table.resolve("late", ok_frame("late", 1)));
    }

    #[test]
    fn test_drop_cancels_entry() {
        let table = table();
        let pending = table.register(Echo::from("x"), "get_msg").expect("register");
        assert_eq!(table.len(), 1);

        drop(pending);
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_echo_rejected() {
        let table = table();
        let _first = table.register(Echo::from("dup"), "get_msg").expect("register");
        let err = table.register(Echo::from("dup"), "get_msg").err().expect("duplicate");
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let table = Arc::new(CorrelationTable::new(2));
        let _a = table.register(Echo::generate(), "a").expect("register");
        let _b = table.register(Echo::generate(), "b").expect("register");
        assert!(table.register(Echo::generate(), "c").is_err());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = table();
        let a = table.register(Echo::from("a"), "a").expect("register");
        let b = table.register(Echo::from("b"), "b").expect("register");

        assert_eq!(table.fail_all(), 2);
        assert!(table.is_empty());

        for pending in [a, b] {
            let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
            assert!(matches!(err, Error::ConnectionClosed));
        }
    }

    #[tokio::test]
    async fn test_malformed_response_reaches_waiter() {
        let table = table();
        let pending = table.register(Echo::from("m"), "get_msg").expect("register");

        assert_ok!(table.resolve("m", json!({ "status": 5 })));
        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn test_no_cross_resolution() {
        let table = Arc::new(CorrelationTable::new(256));
        let mut waiters = Vec::new();

        for marker in 0..100_i64 {
            let pending = table
                .register(Echo::generate(), "get_msg")
                .expect("register");
            let echo = pending.echo().to_string();
            waiters.push((marker, echo, tokio::spawn(pending.wait(Duration::from_secs(5)))));
        }

        // Resolve in reverse order.
        for (marker, echo, _) in waiters.iter().rev() {
            assert_ok!(table.resolve(echo, ok_frame(echo, *marker)));
        }

        for (marker, echo, handle) in waiters {
            let response = handle.await.expect("join").expect("resolved");
            assert_eq!(response.get_i64("marker"), Some(marker));
            assert_eq!(response.echo.as_ref().map(Echo::as_str), Some(echo.as_str()));
        }
        assert!(table.is_empty());
    }
}
