//! Event subscriptions and fan-out.
//!
//! Handlers are registered per [`EventCategory`] and invoked in
//! registration order. Each invocation runs on its own task, so a slow,
//! failing or panicking handler never stalls frame reception or other
//! handlers.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use napcat_client::{Event, HandlerResult};
//!
//! let id = client.on_group_message(|event: Arc<Event>| async move {
//!     println!("{:?}", event.raw_message());
//!     HandlerResult::Ok(())
//! });
//! client.unsubscribe(id);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::identifiers::SubscriptionId;
use crate::protocol::{Event, EventCategory};

// ============================================================================
// Types
// ============================================================================

/// Error type returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Registered handlers for one category, in registration order.
type HandlerList = Vec<(SubscriptionId, Arc<dyn EventHandler>)>;

// ============================================================================
// EventHandler
// ============================================================================

/// Callback invoked for every event of a subscribed category.
///
/// Implemented for any `Fn(Arc<Event>) -> impl Future<Output = HandlerResult>`,
/// so plain async closures can be registered directly.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one event.
    async fn handle(&self, event: Arc<Event>) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> HandlerResult {
        (self)(event).await
    }
}

// ============================================================================
// EventRouter
// ============================================================================

/// Category → handler registry.
#[derive(Default)]
pub struct EventRouter {
    routes: RwLock<FxHashMap<EventCategory, HandlerList>>,
}

impl EventRouter {
    /// Creates an empty router.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `category`.
    pub fn subscribe(&self, category: EventCategory, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.routes
            .write()
            .entry(category)
            .or_default()
            .push((id, handler));

        debug!(subscription = %id, category = %category, "Handler subscribed");
        id
    }

    /// Removes a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut routes = self.routes.write();

        for handlers in routes.values_mut() {
            if let Some(index) = handlers.iter().position(|(existing, _)| *existing == id) {
                handlers.remove(index);
                debug!(subscription = %id, "Handler unsubscribed");
                return true;
            }
        }

        false
    }

    /// Returns the number of handlers for `category`.
    #[must_use]
    pub fn handler_count(&self, category: EventCategory) -> usize {
        self.routes.read().get(&category).map_or(0, Vec::len)
    }

    /// Spawns every handler for the event's category.
    ///
    /// Returns immediately with the number of handlers started. Must be
    /// called inside a Tokio runtime.
    pub fn dispatch(&self, event: Event) -> usize {
        let category = event.category();
        let handlers: HandlerList = match self.routes.read().get(&category) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => {
                trace!(category = %category, "No handlers for event");
                return 0;
            }
        };

        let event = Arc::new(event);
        for (id, handler) in &handlers {
            let id = *id;
            let handler = Arc::clone(handler);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(subscription = %id, category = %category, error = %e, "Event handler failed");
                    }
                    Err(panic) => {
                        error!(
                            subscription = %id,
                            category = %category,
                            panic = %panic_message(panic.as_ref()),
                            "Event handler panicked"
                        );
                    }
                }
            });
        }

        handlers.len()
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
