//! WebSocket transport layer.
//!
//! This module handles the socket to the gateway and the bookkeeping that
//! matches action responses to their requests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client (Rust)  │                              │  Gateway        │
//! │                 │         WebSocket            │  (NapCat)       │
//! │  Connection     │◄────────────────────────────►│                 │
//! │  → EventLoop    │   Authorization: Bearer ...  │  OneBot 11      │
//! │  → Correlation  │                              │  server         │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::open` - Handshake with the gateway
//! 2. `EventLoop::run` - Spawned; feeds frames to a `FrameHandler`
//! 3. `CorrelationTable::register` - Before each outgoing action
//! 4. `Connection::send_text` - Write the action frame
//! 5. Shutdown signal - Loop closes the socket and returns
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `correlation` | Pending request table keyed by `echo` |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Request/response correlation.
pub mod correlation;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventLoop, FrameHandler, LoopExit, TransportConfig};
pub use correlation::{CorrelationTable, PendingResponse};
