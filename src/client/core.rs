//! Gateway client and session control.
//!
//! A [`Client`] owns one connection to one gateway. Its lifecycle:
//!
//! 1. [`Client::connect`] - Open the socket and start the listener
//! 2. [`Client::login`] - Check the account id, wait for the lifecycle event
//! 3. Ready - Actions and events flow until shutdown
//! 4. [`Client::close`] - Stop the listener, fail pending actions
//!
//! [`Client::run`] performs all four and returns why the session ended.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use napcat_client::{Client, Event, HandlerResult};
//!
//! # async fn example() -> napcat_client::Result<()> {
//! let client = Client::builder()
//!     .uri("ws://127.0.0.1:3001")
//!     .self_id(10001)
//!     .build()?;
//!
//! let replier = client.clone();
//! client.on_private_message(move |event: Arc<Event>| {
//!     let client = replier.clone();
//!     async move {
//!         if let Some(user_id) = event.user_id() {
//!             client.send_private_message(user_id, "pong").await?;
//!         }
//!         HandlerResult::Ok(())
//!     }
//! });
//!
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Action, ActionRequest, ActionResponse, LoginInfo};
use crate::transport::{Connection, CorrelationTable, EventLoop, LoopExit};

use super::builder::ClientBuilder;
use super::dispatch::Dispatcher;
use super::events::EventRouter;
use super::options::ClientOptions;
use super::state::{ConnectionState, Heartbeat, SessionSignals, wait_until_set};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// Gateway address.
    uri: Url,
    /// Bearer token for the handshake.
    access_token: Option<String>,
    /// Expected bot account id.
    self_id: i64,
    /// Timeouts and limits.
    options: ClientOptions,
    /// State, shutdown, lifecycle and fault signals.
    pub(crate) signals: Arc<SessionSignals>,
    /// Pending actions by echo token.
    pub(crate) correlation: Arc<CorrelationTable>,
    /// Event subscriptions.
    pub(crate) router: Arc<EventRouter>,
    /// Write handle, present once connected.
    connection: Mutex<Option<Connection>>,
    /// Listener task, taken by `close()`.
    listener: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// Client
// ============================================================================

/// Client for a NapCat / OneBot 11 WebSocket gateway.
///
/// Cheap to clone; clones share the same session, so a handle can be moved
/// into event handlers to reply.
#[derive(Clone)]
pub struct Client {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("uri", &self.inner.uri.as_str())
            .field("self_id", &self.inner.self_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Constructor
// ============================================================================

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from validated settings.
    pub(crate) fn new(
        uri: Url,
        access_token: Option<String>,
        self_id: i64,
        options: ClientOptions,
    ) -> Self {
        let correlation = Arc::new(CorrelationTable::new(options.max_pending_requests));

        Self {
            inner: Arc::new(ClientInner {
                uri,
                access_token,
                self_id,
                options,
                signals: Arc::new(SessionSignals::new()),
                correlation,
                router: Arc::new(EventRouter::new()),
                connection: Mutex::new(None),
                listener: Mutex::new(None),
            }),
        }
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Returns the gateway URI.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.inner.uri
    }

    /// Returns the configured bot account id.
    #[inline]
    #[must_use]
    pub fn self_id(&self) -> i64 {
        self.inner.self_id
    }

    /// Returns the options in effect.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.signals.state()
    }

    /// Returns a receiver that observes every state change.
    #[inline]
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.signals.subscribe_state()
    }

    /// Returns `true` once login has completed and until shutdown.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Returns the last heartbeat received from the gateway.
    #[inline]
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<Heartbeat> {
        self.inner.signals.last_heartbeat()
    }

    /// Returns the number of actions awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.inner.correlation.len()
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Opens the socket and starts the listener task.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] if the client was already connected
    /// - [`Error::ConnectionTimeout`] if the handshake times out
    /// - [`Error::Connection`] if the gateway is unreachable
    ///
    /// A failed connect leaves the client `Closed`.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        inner.signals.transition(ConnectionState::Connecting)?;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&inner.correlation),
            Arc::clone(&inner.router),
            Arc::clone(&inner.signals),
        ));

        let opened = Connection::open(
            &inner.uri,
            inner.access_token.as_deref(),
            &inner.options.transport_config(),
            dispatcher,
            inner.signals.subscribe_shutdown(),
        )
        .await;

        let (connection, event_loop) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!(uri = %inner.uri, error = %e, "Failed to connect to gateway");
                inner.signals.shutdown();
                let _ = inner.signals.transition(ConnectionState::Closed);
                return Err(e);
            }
        };

        *inner.connection.lock() = Some(connection);
        if let Err(e) = inner.signals.transition(ConnectionState::Connected) {
            inner.connection.lock().take();
            return Err(e);
        }

        let handle = tokio::spawn(listen(
            event_loop,
            Arc::clone(&inner.signals),
            Arc::clone(&inner.correlation),
        ));
        *inner.listener.lock() = Some(handle);

        info!(uri = %inner.uri, "Connected to gateway");
        Ok(())
    }

    /// Verifies the account and waits for the lifecycle event.
    ///
    /// Must follow [`connect`](Self::connect). On success the client is
    /// `Ready`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] if the client is not `Connected`
    /// - [`Error::IdentityMismatch`] if the gateway is logged in as another
    ///   account; the client is closed
    /// - [`Error::LoginTimeout`] if no lifecycle event arrives in time; the
    ///   client is closed
    /// - The recorded fault (e.g. [`Error::InvalidCredential`]) if the
    ///   session shuts down while waiting
    pub async fn login(&self) -> Result<LoginInfo> {
        let inner = &self.inner;
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(Error::invalid_transition(state, ConnectionState::AwaitingLogin));
        }

        let info = match self.get_login_info().await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "Login info request failed");
                self.shut_down().await;
                return Err(inner.signals.take_fault().unwrap_or(e));
            }
        };

        if info.user_id_i64() != Some(inner.self_id) {
            error!(
                configured = inner.self_id,
                reported = %info.user_id,
                "Gateway is logged in as a different account"
            );
            self.shut_down().await;
            return Err(Error::identity_mismatch(inner.self_id, info.user_id));
        }

        inner.signals.transition(ConnectionState::AwaitingLogin)?;
        debug!(user_id = %info.user_id, "Identity verified, awaiting lifecycle event");

        let mut lifecycle = inner.signals.subscribe_lifecycle();
        let mut shutdown = inner.signals.subscribe_shutdown();
        let login_timeout = inner.options.login_timeout;

        tokio::select! {
            biased;

            _ = wait_until_set(&mut shutdown) => {
                return Err(inner.signals.take_fault().unwrap_or(Error::ConnectionClosed));
            }

            seen = wait_until_set(&mut lifecycle) => {
                if !seen {
                    return Err(Error::ConnectionClosed);
                }
            }

            () = sleep(login_timeout) => {
                error!(timeout_ms = login_timeout.as_millis() as u64, "Lifecycle event not received");
                self.shut_down().await;
                return Err(Error::login_timeout(login_timeout.as_millis() as u64));
            }
        }

        if let Err(e) = inner.signals.transition(ConnectionState::Ready) {
            return Err(inner.signals.take_fault().unwrap_or(e));
        }

        info!(user_id = %info.user_id, nickname = %info.nickname, "Session ready");
        Ok(info)
    }

    /// Connects, logs in and listens until the session ends.
    ///
    /// Returns `Ok(())` when the session was ended by [`close`](Self::close),
    /// including a close that interrupts the login handshake.
    ///
    /// # Errors
    ///
    /// - Any error from [`connect`](Self::connect) or [`login`](Self::login)
    /// - [`Error::InvalidCredential`] if the gateway rejected the token
    /// - [`Error::ConnectionClosed`] if the gateway hung up
    /// - [`Error::Connection`] if the socket failed
    pub async fn run(&self) -> Result<()> {
        self.connect().await?;

        if let Err(e) = self.login().await {
            let interrupted = matches!(
                e,
                Error::ConnectionClosed | Error::InvalidTransition { .. }
            );
            if interrupted && self.inner.signals.close_requested() {
                debug!(error = %e, "Login interrupted by close");
                return Ok(());
            }
            return Err(e);
        }

        let mut shutdown = self.inner.signals.subscribe_shutdown();
        wait_until_set(&mut shutdown).await;

        self.shut_down().await;

        match self.inner.signals.take_fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Shuts the session down.
    ///
    /// Idempotent: concurrent and repeated calls return once the client is
    /// `Closed`. Pending actions fail with [`Error::ConnectionClosed`].
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` is kept for API stability.
    pub async fn close(&self) -> Result<()> {
        self.inner.signals.request_close();
        self.shut_down().await;
        Ok(())
    }

    /// Tears the session down, or waits for a teardown already in progress.
    async fn shut_down(&self) {
        let inner = &self.inner;

        if inner.signals.transition(ConnectionState::Closing).is_err() {
            inner.signals.wait_for_state(ConnectionState::Closed).await;
            return;
        }

        info!("Closing session");
        inner.signals.shutdown();

        let listener = inner.listener.lock().take();
        if let Some(mut handle) = listener
            && timeout(inner.options.close_timeout, &mut handle).await.is_err()
        {
            warn!(
                timeout_ms = inner.options.close_timeout.as_millis() as u64,
                "Listener did not stop in time, aborting"
            );
            handle.abort();
            let _ = handle.await;
        }

        inner.connection.lock().take();
        let failed = inner.correlation.fail_all();
        inner.signals.set_lifecycle(false);
        let _ = inner.signals.transition(ConnectionState::Closed);

        info!(failed_actions = failed, "Session closed");
    }
}

// ============================================================================
// Client - Actions
// ============================================================================

impl Client {
    /// Sends an action and waits for its response with the default timeout.
    ///
    /// A non-`ok` status is returned as a normal response; use
    /// [`ActionResponse::into_data`] to turn it into an error.
    ///
    /// # Errors
    ///
    /// See [`invoke_with_timeout`](Self::invoke_with_timeout).
    pub async fn invoke(&self, action: &str, params: Value) -> Result<ActionResponse> {
        self.invoke_with_timeout(action, params, self.inner.options.action_timeout)
            .await
    }

    /// Sends an action and waits up to `wait` for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] before [`connect`](Self::connect)
    /// - [`Error::ConnectionClosed`] once closing, or if the session ends
    ///   while waiting
    /// - [`Error::Protocol`] if too many actions are pending
    /// - [`Error::ActionTimeout`] if no response arrives in time
    pub async fn invoke_with_timeout(
        &self,
        action: &str,
        params: Value,
        wait: Duration,
    ) -> Result<ActionResponse> {
        let connection = self.live_connection()?;

        let request = ActionRequest::new(action, params);
        let frame = request.to_frame()?;
        let pending = self
            .inner
            .correlation
            .register(request.echo.clone(), &request.action)?;

        debug!(action = %request.action, echo = %request.echo, "Sending action");
        connection.send_text(frame).await?;

        pending.wait(wait).await
    }

    /// Sends a typed action and returns its `data` on success.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke), plus [`Error::ActionFailed`] for a
    /// non-`ok` status.
    pub async fn call(&self, action: Action) -> Result<Value> {
        let (name, params) = action.to_parts()?;
        self.invoke(&name, params).await?.into_data(&name)
    }

    /// Returns the write handle if the session accepts actions.
    fn live_connection(&self) -> Result<Connection> {
        match self.state() {
            ConnectionState::Connected | ConnectionState::AwaitingLogin | ConnectionState::Ready => {
                self.inner
                    .connection
                    .lock()
                    .clone()
                    .ok_or(Error::NotConnected)
            }
            ConnectionState::Closing | ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::Disconnected | ConnectionState::Connecting => Err(Error::NotConnected),
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Drives the event loop and tidies up when it ends on its own.
async fn listen(event_loop: EventLoop, signals: Arc<SessionSignals>, correlation: Arc<CorrelationTable>) {
    let exit = event_loop.run().await;

    if !signals.is_shutdown() {
        match exit {
            LoopExit::Shutdown => {}
            LoopExit::RemoteClosed => {
                warn!("Gateway closed the connection");
                signals.record_fault(Error::ConnectionClosed);
            }
            LoopExit::Failed(reason) => {
                error!(reason = %reason, "Connection failed");
                signals.record_fault(Error::connection(reason));
            }
        }
    }

    signals.shutdown();

    // `close()` finishes the teardown itself when it started it.
    let owns_teardown = signals.transition(ConnectionState::Closing).is_ok();
    let failed = correlation.fail_all();
    signals.set_lifecycle(false);

    if owns_teardown {
        let _ = signals.transition(ConnectionState::Closed);
        info!(failed_actions = failed, "Session closed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn client() -> Client {
        Client::builder()
            .uri("ws://127.0.0.1:9")
            .self_id(42)
            .build()
            .expect("client")
    }

    #[test]
    fn test_client_is_clone_and_debug() {
        fn assert_clone<T: Clone>() {}
        fn assert_debug<T: fmt::Debug>() {}
        assert_clone::<Client>();
        assert_debug::<Client>();

        let rendered = format!("{:?}", client());
        assert!(rendered.contains("self_id: 42"));
        assert!(rendered.contains("Disconnected"));
    }

    #[tokio::test]
    async fn test_invoke_before_connect() {
        let client = client();
        let err = client.invoke("get_status", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(client.pending_actions(), 0);
    }

    #[tokio::test]
    async fn test_login_requires_connection() {
        let err = client().login().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: ConnectionState::Disconnected,
                to: ConnectionState::AwaitingLogin,
            }
        ));
    }

    #[tokio::test]
    async fn test_close_without_connect() {
        let client = client();
        client.close().await.expect("close");
        assert_eq!(client.state(), ConnectionState::Closed);

        client.close().await.expect("second close");
        let err = client.invoke("get_status", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_closed_client_cannot_reconnect() {
        let client = client();
        client.close().await.expect("close");

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_closes_client() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let client = Client::builder()
            .uri(format!("ws://127.0.0.1:{port}"))
            .self_id(1)
            .build()
            .expect("client");

        let err = client.connect().await.unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(client.state(), ConnectionState::Closed);
    }
}
