//! WebSocket connection and event loop.
//!
//! This module owns the socket to the gateway: the authenticated handshake,
//! outbound text frames, inbound frame delivery and keepalive pings.
//!
//! # Event Loop
//!
//! [`Connection::open`] returns a cloneable [`Connection`] handle and an
//! [`EventLoop`] the caller spawns. The loop handles:
//!
//! - Incoming text frames, handed to a [`FrameHandler`] one at a time, in
//!   receipt order
//! - Outgoing frames queued through [`Connection::send_text`]
//! - Ping/Pong keepalive
//! - Graceful close when the shutdown signal fires

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between keepalive pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Default time allowed for a pong to arrive.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum inbound frame / message size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Timer period used when keepalive is disabled.
const IDLE_TIMER_PERIOD: Duration = Duration::from_secs(3600);

/// Upper bound for keepalive periods; larger values would overflow `Instant`.
const MAX_TIMER_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Receives every inbound text frame.
///
/// Called synchronously from the event loop: the next frame is not read
/// until `handle_frame` returns, so implementations must not block.
pub trait FrameHandler: Send + Sync + 'static {
    /// Handles one text frame.
    fn handle_frame(&self, text: &str);
}

// ============================================================================
// TransportConfig
// ============================================================================

/// Socket-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Interval between keepalive pings; `None` disables keepalive.
    pub ping_interval: Option<Duration>,
    /// Time allowed for a pong after each ping.
    pub ping_timeout: Duration,
    /// Maximum inbound frame and message size in bytes.
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            ping_timeout: DEFAULT_PING_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TransportConfig {
    /// Builds the tungstenite configuration.
    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_frame_size(Some(self.max_frame_size))
            .max_message_size(Some(self.max_frame_size))
    }
}

// ============================================================================
// LoopExit
// ============================================================================

/// Why the event loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown signal fired; the socket was closed by us.
    Shutdown,
    /// The gateway closed the socket or the stream ended.
    RemoteClosed,
    /// Read error, oversized frame or keepalive timeout.
    Failed(String),
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a text frame and report the outcome.
    Send {
        text: String,
        ack: oneshot::Sender<Result<()>>,
    },
}

// ============================================================================
// Connection
// ============================================================================

/// Handle for writing to the gateway socket.
///
/// Cheap to clone; all clones feed the same event loop.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl Connection {
    /// Opens an authenticated WebSocket to `uri`.
    ///
    /// When `access_token` is set, the handshake carries
    /// `Authorization: Bearer <token>`. The returned [`EventLoop`] must be
    /// driven (usually spawned) for frames to flow.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the token is not a valid header value
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::Connection`] if the gateway is unreachable or refuses the upgrade
    pub async fn open(
        uri: &Url,
        access_token: Option<&str>,
        config: &TransportConfig,
        handler: Arc<dyn FrameHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, EventLoop)> {
        let mut request = uri.as_str().into_client_request()?;

        if let Some(token) = access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::config(format!("Invalid access token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        info!(uri = %uri, "Connecting to gateway");

        let connect = connect_async_with_config(request, Some(config.websocket_config()), false);
        let (ws_stream, _response) = timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| Error::connection_timeout(config.connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        info!(uri = %uri, "WebSocket connection established");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (ws_write, ws_read) = ws_stream.split();

        let event_loop = EventLoop {
            ws_write,
            ws_read,
            command_rx,
            handler,
            shutdown,
            ping_interval: config.ping_interval,
            ping_timeout: config.ping_timeout,
        };

        Ok((Self { command_tx }, event_loop))
    }

    /// Queues a text frame and waits until it is written.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    /// - [`Error::Connection`] if the socket write fails
    pub async fn send_text(&self, text: String) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send { text, ack })
            .map_err(|_| Error::ConnectionClosed)?;

        ack_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Returns `true` once the event loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// The receive/send loop for one socket.
pub struct EventLoop {
    ws_write: WsWrite,
    ws_read: WsRead,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    handler: Arc<dyn FrameHandler>,
    shutdown: watch::Receiver<bool>,
    ping_interval: Option<Duration>,
    ping_timeout: Duration,
}

impl EventLoop {
    /// Runs until the socket closes, an error occurs or shutdown fires.
    pub async fn run(mut self) -> LoopExit {
        // A disabled keepalive still needs a timer for `select!`; it is
        // simply never polled.
        let period = self
            .ping_interval
            .unwrap_or(IDLE_TIMER_PERIOD)
            .min(MAX_TIMER_PERIOD);
        let ping_timeout = self.ping_timeout.min(MAX_TIMER_PERIOD);
        let mut ping_timer = interval_at(Instant::now() + period, period);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let keepalive = self.ping_interval.is_some();
        let mut pong_deadline: Option<Instant> = None;
        let mut commands_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                // Shutdown requested
                () = shutdown_requested(&mut self.shutdown) => {
                    debug!("Shutdown signal received");
                    if let Err(e) = self.ws_write.close().await {
                        trace!(error = %e, "Close handshake failed");
                    }
                    break LoopExit::Shutdown;
                }

                // Incoming frames from gateway
                message = self.ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.handler.handle_frame(&text);
                        }

                        Some(Ok(Message::Pong(_))) => {
                            trace!("Pong received");
                            pong_deadline = None;
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break LoopExit::RemoteClosed;
                        }

                        Some(Ok(Message::Binary(data))) => {
                            debug!(len = data.len(), "Ignoring binary frame");
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break LoopExit::Failed(e.to_string());
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break LoopExit::RemoteClosed;
                        }

                        // Ping is answered by tungstenite; raw frames are not surfaced
                        _ => {}
                    }
                }

                // Outgoing frames from callers
                command = self.command_rx.recv(), if commands_open => {
                    match command {
                        Some(ConnectionCommand::Send { text, ack }) => {
                            let result = self
                                .ws_write
                                .send(Message::Text(text.into()))
                                .await
                                .map_err(|e| Error::connection(format!("Send failed: {e}")));

                            if let Err(ref e) = result {
                                warn!(error = %e, "Failed to write frame");
                            }
                            let _ = ack.send(result);
                        }

                        // Every Connection handle dropped; nothing can be sent
                        // anymore but frames may still arrive.
                        None => {
                            trace!("Command channel closed");
                            commands_open = false;
                        }
                    }
                }

                // Keepalive ping
                _ = ping_timer.tick(), if keepalive => {
                    if pong_deadline.is_none() {
                        trace!("Sending keepalive ping");
                        if let Err(e) = self.ws_write.send(Message::Ping(Default::default())).await {
                            error!(error = %e, "Failed to send ping");
                            break LoopExit::Failed(e.to_string());
                        }
                        pong_deadline = Some(Instant::now() + ping_timeout);
                    }
                }

                // Pong overdue
                () = async move {
                    match pong_deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => pending::<()>().await,
                    }
                } => {
                    warn!(timeout_ms = ping_timeout.as_millis() as u64, "Keepalive ping timed out");
                    break LoopExit::Failed("keepalive ping timed out".to_string());
                }
            }
        };

        debug!(?exit, "Event loop terminated");
        exit
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

// ============================================================================
// Tests
// ============================================================================
