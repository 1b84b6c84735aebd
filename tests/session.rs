//! Session tests against an in-process mock gateway.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use napcat_client::{
    Action, Client, ClientOptions, ConnectionState, Error, Event, HandlerResult, MessageChain,
    Segment,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing_subscriber::EnvFilter;

const ACCOUNT: i64 = 10001;
const TOKEN: &str = "secret";

// ============================================================================
// Mock Gateway
// ============================================================================

enum Outgoing {
    Frame(Value),
    Close,
}

#[derive(Clone, Copy)]
struct Script {
    /// Account reported by `get_login_info`.
    account: i64,
    /// Whether the lifecycle event is pushed after the handshake.
    lifecycle: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            account: ACCOUNT,
            lifecycle: true,
        }
    }
}

struct MockGateway {
    uri: String,
    authorization: Arc<Mutex<Option<String>>>,
    received: Arc<Mutex<Vec<Value>>>,
    outbox: mpsc::UnboundedSender<Outgoing>,
}

impl MockGateway {
    async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let uri = format!("ws://{}", listener.local_addr().expect("addr"));

        let authorization = Arc::new(Mutex::new(None));
        let received = Arc::new(Mutex::new(Vec::new()));
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<Outgoing>();

        let seen_auth = Arc::clone(&authorization);
        let log = Arc::clone(&received);
        let replies = outbox.clone();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = accept_hdr_async(stream, move |request: &Request, response: Response| {
                *seen_auth.lock() = request
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                Ok::<_, ErrorResponse>(response)
            })
            .await
            .expect("upgrade");

            let (mut write, mut read) = ws.split();

            let writer = tokio::spawn(async move {
                while let Some(outgoing) = outbox_rx.recv().await {
                    match outgoing {
                        Outgoing::Frame(frame) => {
                            if write.send(Message::Text(frame.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Outgoing::Close => {
                            let _ = write.close().await;
                            break;
                        }
                    }
                }
            });

            if script.lifecycle {
                let _ = replies.send(Outgoing::Frame(json!({
                    "time": 1_700_000_000,
                    "self_id": script.account,
                    "post_type": "meta_event",
                    "meta_event_type": "lifecycle",
                    "sub_type": "connect"
                })));
            }

            while let Some(Ok(message)) = read.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let request: Value = serde_json::from_str(&text).expect("request json");
                log.lock().push(request.clone());
                answer(&request, script, &replies);
            }

            writer.abort();
        });

        Self {
            uri,
            authorization,
            received,
            outbox,
        }
    }

    fn push(&self, frame: Value) {
        self.outbox.send(Outgoing::Frame(frame)).expect("gateway alive");
    }

    fn hang_up(&self) {
        self.outbox.send(Outgoing::Close).expect("gateway alive");
    }

    fn requests(&self, action: &str) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter(|request| request["action"] == action)
            .cloned()
            .collect()
    }
}

fn response(echo: &Value, status: &str, retcode: i64, data: Value, wording: &str) -> Value {
    json!({
        "status": status,
        "retcode": retcode,
        "data": data,
        "message": "",
        "wording": wording,
        "echo": echo
    })
}

fn answer(request: &Value, script: Script, replies: &mpsc::UnboundedSender<Outgoing>) {
    let echo = request["echo"].clone();
    let params = request["params"].clone();

    let reply = match request["action"].as_str().unwrap_or_default() {
        "get_login_info" => response(
            &echo,
            "ok",
            0,
            json!({ "user_id": script.account, "nickname": "bot" }),
            "",
        ),
        "send_group_msg" | "send_private_msg" => {
            response(&echo, "ok", 0, json!({ "message_id": 99 }), "")
        }
        "get_msg" => response(&echo, "failed", 1200, Value::Null, "message not found"),
        "slow" => return,
        "delayed" => {
            let delay = params["delay_ms"].as_u64().unwrap_or(0);
            let replies = replies.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(delay)).await;
                let _ = replies.send(Outgoing::Frame(response(&echo, "ok", 0, params, "")));
            });
            return;
        }
        _ => response(&echo, "ok", 0, params, ""),
    };

    let _ = replies.send(Outgoing::Frame(reply));
}

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client_for(gateway: &MockGateway, options: ClientOptions) -> Client {
    Client::builder()
        .uri(&gateway.uri)
        .access_token(TOKEN)
        .self_id(ACCOUNT)
        .options(options)
        .build()
        .expect("client")
}

async fn ready_client(gateway: &MockGateway) -> anyhow::Result<Client> {
    let client = client_for(gateway, ClientOptions::default());
    client.connect().await?;
    client.login().await?;
    Ok(client)
}

async fn wait_for_state(client: &Client, target: ConnectionState) {
    let mut states = client.subscribe_state();
    timeout(Duration::from_secs(2), states.wait_for(|state| *state == target))
        .await
        .expect("state reached in time")
        .expect("state sender alive");
}

fn forward_to(tx: mpsc::UnboundedSender<Value>) -> impl Fn(Arc<Event>) -> std::future::Ready<HandlerResult> {
    move |event: Arc<Event>| {
        let _ = tx.send(event.payload().clone());
        std::future::ready(Ok(()))
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_reaches_ready_with_bearer_token() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = client_for(&gateway, ClientOptions::default());

    client.connect().await?;
    assert_eq!(client.state(), ConnectionState::Connected);

    let info = client.login().await?;
    assert_eq!(info.user_id_i64(), Some(ACCOUNT));
    assert_eq!(info.nickname, "bot");
    assert!(client.is_ready());
    assert_eq!(gateway.authorization.lock().as_deref(), Some("Bearer secret"));
    assert_eq!(gateway.requests("get_login_info").len(), 1);

    client.close().await?;
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_identity_mismatch_is_fatal() {
    init_tracing();
    let gateway = MockGateway::start(Script {
        account: 999,
        ..Script::default()
    })
    .await;
    let client = client_for(&gateway, ClientOptions::default());

    client.connect().await.expect("connect");
    let err = client.login().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        Error::IdentityMismatch { configured: ACCOUNT, ref reported } if reported == "999"
    ));
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_missing_lifecycle_times_out() {
    init_tracing();
    let gateway = MockGateway::start(Script {
        lifecycle: false,
        ..Script::default()
    })
    .await;
    let client = client_for(
        &gateway,
        ClientOptions::new().with_login_timeout(Duration::from_millis(200)),
    );

    client.connect().await.expect("connect");
    let err = client.login().await.unwrap_err();

    assert!(matches!(err, Error::LoginTimeout { timeout_ms: 200 }));
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_invalid_token_status_ends_run() {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = client_for(&gateway, ClientOptions::default());

    let runner = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });
    wait_for_state(&client, ConnectionState::Ready).await;

    gateway.push(json!({ "status": "failed", "retcode": 1403, "message": "token invalid" }));

    let result = timeout(Duration::from_secs(3), runner)
        .await
        .expect("run returns")
        .expect("join");
    assert!(matches!(result, Err(Error::InvalidCredential { retcode: 1403 })));
    assert_eq!(client.state(), ConnectionState::Closed);
}

// ============================================================================
// Actions
// ============================================================================

#[tokio::test]
async fn test_action_timeout_leaves_no_pending_entry() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = ready_client(&gateway).await?;

    let err = client
        .invoke_with_timeout("slow", json!({}), Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ActionTimeout { ref action, timeout_ms: 100 } if action == "slow"));
    assert!(err.is_recoverable());
    assert_eq!(client.pending_actions(), 0);

    // The session is still usable afterwards.
    let response = client.invoke("echo", json!({ "k": 1 })).await?;
    assert_eq!(response.data, json!({ "k": 1 }));

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_invokes_resolve_to_their_own_responses() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = ready_client(&gateway).await?;

    const COUNT: u64 = 40;
    let mut calls = Vec::new();
    for n in 0..COUNT {
        let client = client.clone();
        // Later requests are answered first.
        let delay_ms = (COUNT - n) * 5;
        calls.push(tokio::spawn(async move {
            let response = client
                .invoke("delayed", json!({ "n": n, "delay_ms": delay_ms }))
                .await?;
            anyhow::Ok((n, response))
        }));
    }

    for call in calls {
        let (n, response) = call.await??;
        assert!(response.is_ok());
        assert_eq!(response.data["n"], n);
    }
    assert_eq!(client.pending_actions(), 0);

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_action_names_are_slash_stripped() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = ready_client(&gateway).await?;

    client.invoke("/get_status", Value::Null).await?;

    let sent = gateway.requests("get_status");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["params"], json!({}));
    assert!(sent[0]["echo"].is_string());

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_status_becomes_action_failed() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = ready_client(&gateway).await?;

    let raw = client.invoke("get_msg", json!({ "message_id": 1 })).await?;
    assert!(!raw.is_ok());
    assert_eq!(raw.retcode, 1200);

    let err = client.get_msg(1).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ActionFailed { ref action, retcode: 1200, ref message }
            if action == "get_msg" && message == "message not found"
    ));

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_send_group_message_wire_format() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = ready_client(&gateway).await?;

    let chain = MessageChain::new()
        .with(Segment::text("hello "))
        .with(Segment::at(20002))
        .with(Segment::reply(555))
        .with(Segment::reply(666));
    let message_id = client.send_group_message(123, chain).await?;
    assert_eq!(message_id, 99);

    let sent = gateway.requests("send_group_msg");
    assert_eq!(
        sent[0]["params"],
        json!({
            "group_id": 123,
            "message": [
                { "type": "reply", "data": { "id": "555" } },
                { "type": "text", "data": { "text": "hello " } },
                { "type": "at", "data": { "qq": "20002" } }
            ]
        })
    );

    client.send_poke(20002, Some(123)).await?;
    let poke = gateway.requests("send_poke");
    assert_eq!(
        poke[0]["params"],
        json!({ "user_id": ACCOUNT, "group_id": 123, "target_id": 20002 })
    );

    client
        .call(Action::GetStrangerInfo { user_id: 20002 })
        .await?;
    assert_eq!(gateway.requests("get_stranger_info")[0]["params"]["user_id"], 20002);

    client.close().await?;
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_events_reach_their_category() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = client_for(&gateway, ClientOptions::default());

    let (group_tx, mut group_rx) = mpsc::unbounded_channel();
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let (meta_tx, mut meta_rx) = mpsc::unbounded_channel();
    client.on_group_message(forward_to(group_tx));
    client.on_notice(forward_to(notice_tx));
    client.on_meta(forward_to(meta_tx));

    client.connect().await?;
    client.login().await?;

    // Lifecycle meta event was delivered to subscribers too.
    assert_eq!(next_event(&mut meta_rx).await["meta_event_type"], "lifecycle");

    gateway.push(json!({
        "post_type": "message",
        "message_type": "group",
        "group_id": 123,
        "user_id": 20002,
        "message_id": 1,
        "raw_message": "hi"
    }));
    gateway.push(json!({ "post_type": "notice", "notice_type": "group_increase", "group_id": 123 }));
    gateway.push(json!({
        "post_type": "meta_event",
        "meta_event_type": "heartbeat",
        "time": 1_700_000_100,
        "interval": 30000
    }));

    assert_eq!(next_event(&mut group_rx).await["raw_message"], "hi");
    assert_eq!(next_event(&mut notice_rx).await["notice_type"], "group_increase");
    assert_eq!(next_event(&mut meta_rx).await["meta_event_type"], "heartbeat");

    let heartbeat = client.last_heartbeat().expect("heartbeat recorded");
    assert_eq!(heartbeat.interval_ms, Some(30000));

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_unmatched_echo_goes_to_gateway_status() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = ready_client(&gateway).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_gateway_status(forward_to(tx));

    gateway.push(json!({ "status": "ok", "retcode": 0, "data": null, "echo": "nobody-asked" }));
    assert_eq!(next_event(&mut rx).await["echo"], "nobody-asked");

    client.close().await?;
    Ok(())
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_close_is_idempotent_and_fails_pending() -> anyhow::Result<()> {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = ready_client(&gateway).await?;

    let waiter = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .invoke_with_timeout("slow", json!({}), Duration::from_secs(30))
                .await
        }
    });

    timeout(Duration::from_secs(2), async {
        while client.pending_actions() == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    let (first, second) = tokio::join!(client.close(), client.close());
    first?;
    second?;
    client.close().await?;

    let result = timeout(Duration::from_secs(2), waiter).await??;
    assert!(matches!(result, Err(Error::ConnectionClosed)));
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.pending_actions(), 0);

    let err = client.invoke("echo", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    Ok(())
}

#[tokio::test]
async fn test_close_during_run_returns_ok() {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = client_for(&gateway, ClientOptions::default());

    let runner = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });
    wait_for_state(&client, ConnectionState::Ready).await;

    client.close().await.expect("close");

    let result = timeout(Duration::from_secs(3), runner)
        .await
        .expect("run returns")
        .expect("join");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_close_while_awaiting_lifecycle_returns_ok() {
    init_tracing();
    let gateway = MockGateway::start(Script {
        lifecycle: false,
        ..Script::default()
    })
    .await;
    let client = client_for(
        &gateway,
        ClientOptions::new().with_login_timeout(Duration::from_secs(30)),
    );

    let runner = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });
    wait_for_state(&client, ConnectionState::AwaitingLogin).await;

    client.close().await.expect("close");

    let result = timeout(Duration::from_secs(3), runner)
        .await
        .expect("run returns")
        .expect("join");
    assert!(result.is_ok(), "unexpected {result:?}");
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_gateway_hang_up_ends_run() {
    init_tracing();
    let gateway = MockGateway::start(Script::default()).await;
    let client = client_for(&gateway, ClientOptions::default());

    let runner = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });
    wait_for_state(&client, ConnectionState::Ready).await;

    gateway.hang_up();

    let result = timeout(Duration::from_secs(3), runner)
        .await
        .expect("run returns")
        .expect("join");
    assert!(matches!(result, Err(Error::ConnectionClosed)));
    assert_eq!(client.state(), ConnectionState::Closed);
}
