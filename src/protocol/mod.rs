//! WebSocket protocol message types.
//!
//! This module defines the JSON frames exchanged with the gateway.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `ActionRequest` | Client → Gateway | Action call carrying an `echo` token |
//! | `ActionResponse` | Gateway → Client | Result, matched by `echo` |
//! | `Event` | Gateway → Client | Message, notice, meta or status push |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Typed action definitions |
//! | `event` | Event classification and accessors |
//! | `message` | Outgoing message segments |
//! | `request` | Request and response frames |

// ============================================================================
// Submodules
// ============================================================================

/// Typed action definitions.
pub mod action;

/// Event message types.
pub mod event;

/// Outgoing message content.
pub mod message;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{Action, LoginInfo, RecordFormat};
pub use event::{Event, EventCategory, RETCODE_INVALID_TOKEN};
pub use message::{MediaSource, MessageChain, Segment, WireSegment};
pub use request::{ActionRequest, ActionResponse};
