//! Gateway client.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Session controller, action invoker, subscription API |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Timeouts and limits |
//! | [`ConnectionState`] | Lifecycle state |
//! | [`EventHandler`] | Event callback trait |
//! | [`Heartbeat`] | Last heartbeat seen |

// ============================================================================
// Submodules
// ============================================================================

/// Typed action helpers and subscription wrappers.
mod actions;

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Inbound frame classification.
mod dispatch;

/// Event subscriptions and fan-out.
pub mod events;

/// Client timing and limit options.
pub mod options;

/// Session state and shared signals.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use events::{EventHandler, EventRouter, HandlerError, HandlerResult};
pub use options::ClientOptions;
pub use state::{ConnectionState, Heartbeat};
