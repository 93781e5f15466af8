//! Request/response demonstration.
//!
//! Demonstrates:
//! - Two messengers on one shared channel
//! - Ping/pong round trip
//! - Typed requests
//! - Handler failure surfacing on the requesting side
//! - Timeout when nobody handles an event
//!
//! Usage:
//!   cargo run --example ping_pong
//!   cargo run --example ping_pong -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::{Value, json};

use common::Args;
use webpage_messenger::{
    ActiveWebSocketType, EventName, Message, Messenger, Result, RouteToPage, SharedChannel,
};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(&args);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== Ping / Pong ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    let channel = SharedChannel::new();
    let page = Messenger::new(&channel)?;
    let extension = Messenger::new(&channel)?;

    page.add_listener(EventName::Ping, |_| async { Ok(json!("pong")) });
    page.add_listener(EventName::GetActiveWebSocketType, |_| async {
        Ok(serde_json::to_value(ActiveWebSocketType::WebSocket)?)
    });
    page.add_listener(EventName::RouteToPage, |payload: Value| async move {
        let route: RouteToPage = serde_json::from_value(payload)?;
        if route.url.starts_with('/') {
            Ok(Value::Null)
        } else {
            Err(format!("refusing to route to {}", route.url).into())
        }
    });
    println!("[Setup] Page handlers registered\n");

    // ========================================================================
    // Round Trips
    // ========================================================================

    let reply = extension.send_message(EventName::Ping, Value::Null).await?;
    println!("[Ping] reply: {reply}");

    let kind = extension.request(Message::GetActiveWebSocketType).await?;
    println!("[Type] active socket: {kind}");

    let routed = extension
        .request(Message::RouteToPage(RouteToPage {
            url: "/search".to_string(),
            scroll: Some(true),
        }))
        .await;
    println!("[Route] /search -> {routed:?}");

    let refused = extension
        .request(Message::RouteToPage(RouteToPage {
            url: "https://elsewhere.test".to_string(),
            scroll: None,
        }))
        .await;
    println!("[Route] external -> {refused:?}");

    // ========================================================================
    // Unhandled Event
    // ========================================================================

    let unhandled = extension
        .send_message_with_timeout(
            EventName::Log,
            json!("nobody listens"),
            Duration::from_millis(200),
        )
        .await;
    println!("[Log] unhandled -> {unhandled:?}\n");

    extension.dispose();
    page.dispose();
    println!("=== Done ===");
    Ok(())
}
