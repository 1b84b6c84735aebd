//! NapCat client - Async WebSocket client for OneBot 11 bot gateways.
//!
//! This library connects to a NapCat gateway over WebSocket, routes the
//! events it pushes to registered handlers, and issues actions whose
//! responses are matched back by an `echo` token.
//!
//! # Architecture
//!
//! The client keeps one long-lived socket to one gateway:
//!
//! - **Transport**: WebSocket handshake with Bearer auth, keepalive pings,
//!   a single listener task reading frames in order
//! - **Correlation**: every action registers an `echo` token before it is
//!   sent; the matching response resolves it, exactly once
//! - **Routing**: non-response frames are classified by `post_type` and
//!   fanned out to per-category handlers, each on its own task
//! - **Session**: connect → account check → lifecycle event → ready →
//!   close, with forward-only state
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use napcat_client::{Client, Event, HandlerResult, MessageChain, Result, Segment};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .uri("ws://127.0.0.1:3001")
//!         .access_token("secret")
//!         .self_id(10001)
//!         .build()?;
//!
//!     let replier = client.clone();
//!     client.on_group_message(move |event: Arc<Event>| {
//!         let client = replier.clone();
//!         async move {
//!             if let (Some(group_id), Some(message_id)) = (event.group_id(), event.message_id()) {
//!                 let reply = MessageChain::new()
//!                     .with(Segment::reply(message_id))
//!                     .with(Segment::text("got it"));
//!                 client.send_group_message(group_id, reply).await?;
//!             }
//!             HandlerResult::Ok(())
//!         }
//!     });
//!
//!     // Runs until the gateway hangs up or `close()` is called elsewhere.
//!     client.run().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], builder, options, subscriptions |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Frames, events, actions and message segments |
//! | [`transport`] | WebSocket connection and correlation table |

// ============================================================================
// Modules
// ============================================================================

/// Gateway client: session control, actions and subscriptions.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers for correlation tokens and subscription handles.
pub mod identifiers;

/// Gateway protocol message types.
///
/// Action requests and responses, events and outgoing message segments.
pub mod protocol;

/// WebSocket transport layer.
///
/// Socket event loop and request/response correlation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Client, ClientBuilder, ClientOptions, ConnectionState, EventHandler, HandlerError,
    HandlerResult, Heartbeat,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Echo, SubscriptionId};

// Protocol types
pub use protocol::{
    Action, ActionResponse, Event, EventCategory, LoginInfo, MediaSource, MessageChain,
    RecordFormat, Segment,
};
