//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use napcat_client::Client;
//!
//! # fn example() -> napcat_client::Result<()> {
//! let client = Client::builder()
//!     .uri("ws://127.0.0.1:3001")
//!     .access_token("secret")
//!     .self_id(10001)
//!     .action_timeout(Duration::from_secs(15))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    /// Gateway WebSocket URI.
    uri: Option<String>,
    /// Bearer token sent during the handshake.
    access_token: Option<String>,
    /// Expected bot account id.
    self_id: Option<i64>,
    /// Timeouts and limits.
    options: ClientOptions,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway URI.
    ///
    /// # Arguments
    ///
    /// * `uri` - `ws://` or `wss://` address of the gateway
    #[inline]
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the access token. An empty token is treated as none.
    #[inline]
    #[must_use]
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = (!token.is_empty()).then_some(token);
        self
    }

    /// Sets the bot account id the gateway must be logged in as.
    #[inline]
    #[must_use]
    pub fn self_id(mut self, self_id: i64) -> Self {
        self.self_id = Some(self_id);
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Sets the default action timeout.
    #[inline]
    #[must_use]
    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.options.action_timeout = timeout;
        self
    }

    /// Sets the login timeout.
    #[inline]
    #[must_use]
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.options.login_timeout = timeout;
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URI is missing, unparseable or not `ws`/`wss`
    /// - [`Error::Config`] if `self_id` is not set
    /// - [`Error::Config`] if an option is zero
    pub fn build(self) -> Result<Client> {
        let uri = self.validate_uri()?;
        let self_id = self.validate_self_id()?;
        self.options.validate()?;

        Ok(Client::new(uri, self.access_token, self_id, self.options))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the gateway URI.
    fn validate_uri(&self) -> Result<Url> {
        let raw = self.uri.as_deref().ok_or_else(|| {
            Error::config(
                "Gateway URI is required. Use .uri() to set it.\n\
                 Example: Client::builder().uri(\"ws://127.0.0.1:3001\")",
            )
        })?;

        let uri = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid gateway URI '{raw}': {e}")))?;

        if !matches!(uri.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Gateway URI must use ws:// or wss://, got '{}'",
                uri.scheme()
            )));
        }

        Ok(uri)
    }

    /// Validates the account id.
    fn validate_self_id(&self) -> Result<i64> {
        self.self_id.ok_or_else(|| {
            Error::config(
                "Bot account id is required. Use .self_id() to set it.\n\
                 Example: Client::builder().self_id(10001)",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
