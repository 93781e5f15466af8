//! Frame interception demonstration.
//!
//! Demonstrates:
//! - A page that relays its socket traffic as `webSocketEvent` envelopes
//! - Sending a frame through the page and waiting for its ack
//! - A long-lived interceptor counting relayed frames
//! - Cancelling a wait that never matches
//!
//! Usage:
//!   cargo run --example frame_wait
//!   cargo run --example frame_wait -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::sleep;

use common::Args;
use webpage_messenger::{
    EventName, Frame, FrameFilter, Interceptor, MatchOutcome, Messenger, Result, SharedChannel,
    WebSocketEventData, WebSocketEventKind,
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
    println!("=== Frame Wait ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    let channel = SharedChannel::new();
    let page = Messenger::new(&channel)?;
    let extension = Messenger::new(&channel)?;

    // The page "sends" the frame, relays it, then relays the server's ack.
    let relay = page.clone();
    page.add_listener(EventName::SendWebSocketMessage, move |payload: Value| {
        let relay = relay.clone();
        async move {
            let text = payload.as_str().unwrap_or_default().to_string();
            let Some(sent) = Frame::parse(&text) else {
                return Err(format!("not a frame: {text}").into());
            };

            relay_frame(&relay, WebSocketEventKind::Send, &sent)?;

            let ack = Frame::with_body(sent.code + 10, json!([{"status": "ok"}]));
            relay_frame(&relay, WebSocketEventKind::Message, &ack)?;
            Ok(Value::Null)
        }
    });

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let monitor = extension.add_interceptor(
        Interceptor::on(EventName::WebSocketEvent)
            .matching(|_| MatchOutcome::matched())
            .callback(move |_envelope, _args| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
    );
    println!("[Setup] Relay handler and monitor registered\n");

    // ========================================================================
    // Send and Await Ack
    // ========================================================================

    let ack = extension.wait_for_frame(FrameFilter::code(431).incoming());
    extension
        .send_frame(&Frame::event(421, "upsert_thread_collection", json!({})))
        .await?;

    let args = ack.wait().await?;
    println!("[Ack] 431 args: {}", Value::Array(args));

    // ========================================================================
    // Cancelled Wait
    // ========================================================================

    let never = extension.wait_for_frame(FrameFilter::code(3).event("pong"));
    let token = never.cancellation_token();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        token.cancel();
    });
    println!("[Cancel] {:?}", never.wait().await);

    println!("[Monitor] relayed frames seen: {}", seen.load(Ordering::SeqCst));
    monitor.remove();

    extension.dispose();
    page.dispose();
    println!("\n=== Done ===");
    Ok(())
}

fn relay_frame(page: &Messenger, kind: WebSocketEventKind, frame: &Frame) -> Result<()> {
    let data = serde_json::to_value(WebSocketEventData::frame(kind, frame))?;
    page.emit(EventName::WebSocketEvent, data)?;
    Ok(())
}
