//! Echo bot.
//!
//! Demonstrates:
//! - Building a client from environment variables
//! - Subscribing to every event category
//! - Replying to direct messages with a quoted echo
//! - Closing cleanly on Ctrl+C
//!
//! Environment:
//!   NAPCAT_WS_URI   gateway address (default ws://127.0.0.1:3001)
//!   NAPCAT_TOKEN    access token (optional)
//!   NAPCAT_SELF_ID  bot account id (required)
//!
//! Usage:
//!   NAPCAT_SELF_ID=10001 cargo run --example echo_bot
//!   NAPCAT_SELF_ID=10001 cargo run --example echo_bot -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::sync::Arc;

use napcat_client::{
    Client, Error, Event, EventCategory, HandlerResult, MessageChain, Result, Segment,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URI: &str = "ws://127.0.0.1:3001";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = env::args().any(|arg| arg == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "napcat_client=debug,echo_bot=debug"
    } else {
        "napcat_client=info,echo_bot=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    let uri = env::var("NAPCAT_WS_URI").unwrap_or_else(|_| DEFAULT_URI.to_string());
    let token = env::var("NAPCAT_TOKEN").unwrap_or_default();
    let self_id = env::var("NAPCAT_SELF_ID")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| Error::config("NAPCAT_SELF_ID must be set to the bot account id"))?;

    let client = Client::builder()
        .uri(uri)
        .access_token(token)
        .self_id(self_id)
        .build()?;

    // ========================================================================
    // Subscriptions
    // ========================================================================

    for category in EventCategory::ALL {
        client.subscribe(category, move |event: Arc<Event>| async move {
            info!(category = %category, payload = %event.payload(), "Event");
            HandlerResult::Ok(())
        });
    }

    let replier = client.clone();
    client.on_private_message(move |event: Arc<Event>| {
        let client = replier.clone();
        async move {
            let (Some(user_id), Some(message_id)) = (event.user_id(), event.message_id()) else {
                return HandlerResult::Ok(());
            };
            if user_id == client.self_id() {
                return HandlerResult::Ok(());
            }

            let text = event.raw_message().unwrap_or_default();
            let reply = MessageChain::new()
                .with(Segment::reply(message_id))
                .with(Segment::text(format!("echo: {text}")));

            let sent = client.send_private_message(user_id, reply).await?;
            info!(user_id, message_id = sent, "Replied");
            HandlerResult::Ok(())
        }
    });

    // ========================================================================
    // Run
    // ========================================================================

    let closer = client.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, closing");
            let _ = closer.close().await;
        }
    });

    println!("=== Echo bot: {} as {self_id} ===\n", client.uri());
    client.run().await
}
