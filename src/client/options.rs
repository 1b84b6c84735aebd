//! Client timing and limit options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use napcat_client::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_action_timeout(Duration::from_secs(30))
//!     .with_login_timeout(Duration::from_secs(10))
//!     .without_keepalive();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::TransportConfig;
use crate::transport::connection::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT,
};

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for an action response.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for the lifecycle event after the identity check.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time `close()` waits for the listener before aborting it.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default cap on concurrently pending actions.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 1024;

// ============================================================================
// ClientOptions
// ============================================================================

/// Timeouts and limits for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// WebSocket handshake timeout.
    pub connect_timeout: Duration,

    /// Keepalive ping interval; `None` disables keepalive.
    pub ping_interval: Option<Duration>,

    /// Time allowed for a pong.
    pub ping_timeout: Duration,

    /// Maximum inbound frame size in bytes.
    pub max_frame_size: usize,

    /// Default action timeout, overridable per call.
    pub action_timeout: Duration,

    /// Time allowed for the lifecycle event during login.
    pub login_timeout: Duration,

    /// Time `close()` waits for the listener to stop.
    pub close_timeout: Duration,

    /// Maximum pending actions.
    pub max_pending_requests: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            ping_timeout: DEFAULT_PING_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the keepalive ping interval.
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }

    /// Disables keepalive pings.
    #[inline]
    #[must_use]
    pub fn without_keepalive(mut self) -> Self {
        self.ping_interval = None;
        self
    }

    /// Sets the pong timeout.
    #[inline]
    #[must_use]
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Sets the maximum inbound frame size.
    #[inline]
    #[must_use]
    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Sets the default action timeout.
    #[inline]
    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Sets the login timeout.
    #[inline]
    #[must_use]
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Sets the close timeout.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets the pending action cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }
}

// ============================================================================
// Conversion & Validation
// ============================================================================

impl ClientOptions {
    /// Extracts the socket-level settings.
    #[must_use]
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_timeout,
            ping_interval: self.ping_interval,
            ping_timeout: self.ping_timeout,
            max_frame_size: self.max_frame_size,
        }
    }

    /// Rejects zero durations and limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("connect_timeout", self.connect_timeout),
            ("ping_interval", self.ping_interval.unwrap_or(Duration::MAX)),
            ("ping_timeout", self.ping_timeout),
            ("action_timeout", self.action_timeout),
            ("login_timeout", self.login_timeout),
            ("close_timeout", self.close_timeout),
        ];

        if let Some((name, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }

        if self.max_frame_size == 0 {
            return Err(Error::config("max_frame_size must be greater than zero"));
        }

        if self.max_pending_requests == 0 {
            return Err(Error::config("max_pending_requests must be greater than zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.action_timeout, Duration::from_secs(10));
        assert_eq!(options.login_timeout, Duration::from_secs(5));
        assert_eq!(options.close_timeout, Duration::from_secs(2));
        assert_eq!(options.max_pending_requests, 1024);
        assert_eq!(options, ClientOptions::new());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = ClientOptions::new()
            .with_connect_timeout(Duration::from_secs(1))
            .with_ping_interval(Duration::from_secs(3))
            .with_ping_timeout(Duration::from_secs(2))
            .with_max_frame_size(1024)
            .with_action_timeout(Duration::from_millis(500))
            .with_login_timeout(Duration::from_secs(8))
            .with_close_timeout(Duration::from_millis(100))
            .with_max_pending_requests(4);

        assert_eq!(options.ping_interval, Some(Duration::from_secs(3)));
        assert_eq!(options.max_pending_requests, 4);

        let transport = options.transport_config();
        assert_eq!(transport.connect_timeout, Duration::from_secs(1));
        assert_eq!(transport.ping_timeout, Duration::from_secs(2));
        assert_eq!(transport.max_frame_size, 1024);
    }

    #[test]
    fn test_without_keepalive() {
        let options = ClientOptions::new().without_keepalive();
        assert_eq!(options.transport_config().ping_interval, None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let err = ClientOptions::new()
            .with_login_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("login_timeout"));

        assert!(ClientOptions::new().with_max_pending_requests(0).validate().is_err());
        assert!(ClientOptions::new().with_max_frame_size(0).validate().is_err());
        assert!(
            ClientOptions::new()
                .with_ping_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
