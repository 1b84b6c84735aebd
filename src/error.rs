//! Error types for the NapCat client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use napcat_client::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let info = client.get_login_info().await?;
//!     println!("logged in as {}", info.nickname);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotConnected`], [`Error::InvalidTransition`] |
//! | Protocol | [`Error::Protocol`] |
//! | Correlation | [`Error::ActionTimeout`], [`Error::ActionFailed`] |
//! | Fatal session | [`Error::IdentityMismatch`], [`Error::LoginTimeout`], [`Error::InvalidCredential`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::client::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the gateway cannot be reached or the socket write fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout during the WebSocket handshake.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed.
    ///
    /// Returned to in-flight actions when the session shuts down, and by
    /// [`Client::run`](crate::Client::run) when the gateway hangs up.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No connection has been established yet.
    #[error("Not connected")]
    NotConnected,

    /// Illegal session state transition.
    ///
    /// Returned when a lifecycle call does not fit the current state,
    /// e.g. connecting a client that is already closed.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// State the session was in.
        from: ConnectionState,
        /// State that was requested.
        to: ConnectionState,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected response.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No response arrived for an action within its timeout.
    #[error("Action {action} timed out after {timeout_ms}ms")]
    ActionTimeout {
        /// Name of the action that timed out.
        action: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The gateway answered an action with a non-`ok` status.
    #[error("Action {action} failed (retcode {retcode}): {message}")]
    ActionFailed {
        /// Name of the failed action.
        action: String,
        /// Gateway return code.
        retcode: i64,
        /// Gateway message, or the status string when none was given.
        message: String,
    },

    // ========================================================================
    // Fatal Session Errors
    // ========================================================================
    /// The gateway is logged in with a different account than configured.
    #[error("Account mismatch: configured {configured}, gateway reports {reported}")]
    IdentityMismatch {
        /// Configured bot account id.
        configured: i64,
        /// Account id reported by `get_login_info`.
        reported: String,
    },

    /// The lifecycle event did not arrive in time.
    #[error("Login timeout after {timeout_ms}ms")]
    LoginTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The gateway rejected the access token.
    #[error("Invalid access token (retcode {retcode})")]
    InvalidCredential {
        /// Gateway return code (1403).
        retcode: i64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an invalid transition error.
    #[inline]
    pub fn invalid_transition(from: ConnectionState, to: ConnectionState) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an action timeout error.
    #[inline]
    pub fn action_timeout(action: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ActionTimeout {
            action: action.into(),
            timeout_ms,
        }
    }

    /// Creates an action failed error.
    #[inline]
    pub fn action_failed(action: impl Into<String>, retcode: i64, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            action: action.into(),
            retcode,
            message: message.into(),
        }
    }

    /// Creates an identity mismatch error.
    #[inline]
    pub fn identity_mismatch(configured: i64, reported: impl Into<String>) -> Self {
        Self::IdentityMismatch {
            configured,
            reported: reported.into(),
        }
    }

    /// Creates a login timeout error.
    #[inline]
    pub fn login_timeout(timeout_ms: u64) -> Self {
        Self::LoginTimeout { timeout_ms }
    }

    /// Creates an invalid credential error.
    #[inline]
    pub fn invalid_credential(retcode: i64) -> Self {
        Self::InvalidCredential { retcode }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ActionTimeout { .. } | Self::LoginTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error terminated the session.
    ///
    /// Fatal errors are configuration faults; retrying with the same
    /// settings will fail the same way.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IdentityMismatch { .. } | Self::LoginTimeout { .. } | Self::InvalidCredential { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors affect a single action and may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ActionTimeout { .. } | Self::ActionFailed { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_action_timeout_names_action() {
        let err = Error::action_timeout("get_login_info", 10_000);
        assert_eq!(
            err.to_string(),
            "Action get_login_info timed out after 10000ms"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::invalid_transition(ConnectionState::Closed, ConnectionState::Connecting);
        assert_eq!(err.to_string(), "Invalid state transition: closed -> connecting");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(5000).is_timeout());
        assert!(Error::login_timeout(5000).is_timeout());
        assert!(Error::action_timeout("get_msg", 1).is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_fatal() {
        assert!(Error::identity_mismatch(1, "2").is_fatal());
        assert!(Error::login_timeout(5000).is_fatal());
        assert!(Error::invalid_credential(1403).is_fatal());
        assert!(!Error::action_timeout("get_msg", 1).is_fatal());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::action_timeout("get_msg", 1).is_recoverable());
        assert!(Error::action_failed("get_msg", 100, "no such message").is_recoverable());
        assert!(!Error::invalid_credential(1403).is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
