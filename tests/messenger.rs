//! End-to-end messaging between two messengers on one shared channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep, timeout};
use tracing_subscriber::EnvFilter;

use webpage_messenger::{
    Envelope, Error, EventName, Frame, FrameFilter, Interceptor, MatchOutcome, Message,
    Messenger, SharedChannel, Transport, WaitState, WebSocketEventData, WebSocketEventKind,
};

// ============================================================================
// Helpers
// ============================================================================

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pair() -> Result<(SharedChannel, Messenger, Messenger)> {
    init_logging();
    let channel = SharedChannel::new();
    let extension = Messenger::new(&channel)?;
    let page = Messenger::new(&channel)?;
    Ok((channel, extension, page))
}

fn code_value(code: i64) -> impl Fn(&Envelope) -> MatchOutcome + Send + Sync + 'static {
    move |envelope: &Envelope| {
        if envelope.get_i64("code") == Some(code) {
            MatchOutcome::with_args(vec![envelope.payload["value"].clone()])
        } else {
            MatchOutcome::skip()
        }
    }
}

async fn settle() {
    sleep(Duration::from_millis(20)).await;
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn ping_round_trip() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    page.add_listener(EventName::Ping, |_| async { Ok(json!("pong")) });

    let reply = extension.send_message(EventName::Ping, Value::Null).await?;
    assert_eq!(reply, json!("pong"));
    assert_eq!(extension.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn typed_request_round_trip() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    page.add_listener(EventName::Log, |payload| async move { Ok(json!({ "logged": payload })) });

    let reply = extension.request(Message::Log("hello".into())).await?;
    assert_eq!(reply, json!({"logged": "hello"}));
    Ok(())
}

#[tokio::test]
async fn unhandled_event_times_out_no_earlier_than_deadline() -> Result<()> {
    let (_channel, extension, _page) = pair()?;
    let deadline = Duration::from_millis(150);

    let started = Instant::now();
    let err = extension
        .send_message_with_timeout(EventName::RouteToPage, json!({"url": "/"}), deadline)
        .await
        .unwrap_err();

    assert!(started.elapsed() >= deadline);
    assert!(matches!(
        err,
        Error::RequestTimeout { event: EventName::RouteToPage, timeout_ms: 150, .. }
    ));
    assert_eq!(extension.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn responses_settle_by_id_regardless_of_order() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    page.add_listener(EventName::Log, |payload: Value| async move {
        let delay = payload.as_u64().unwrap_or(0);
        sleep(Duration::from_millis(delay)).await;
        Ok(payload)
    });

    let slow = extension.send_message(EventName::Log, json!(80));
    let fast = extension.send_message(EventName::Log, json!(5));
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow?, json!(80));
    assert_eq!(fast?, json!(5));
    Ok(())
}

#[tokio::test]
async fn handler_failure_surfaces_as_error() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    page.add_listener(EventName::RouteToPage, |_| async { Err("router missing".into()) });

    let err = extension
        .send_message(EventName::RouteToPage, json!({"url": "/"}))
        .await
        .unwrap_err();

    assert!(err.is_handler_failure());
    assert!(err.to_string().contains("router missing"));
    Ok(())
}

#[tokio::test]
async fn last_registration_wins() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    page.add_listener(EventName::Ping, |_| async { Ok(json!("first")) });
    page.add_listener(EventName::Ping, |_| async { Ok(json!("second")) });
    assert_eq!(page.listener_count(), 1);

    let reply = extension.send_message(EventName::Ping, Value::Null).await?;
    assert_eq!(reply, json!("second"));

    assert!(page.remove_listener(EventName::Ping));
    assert!(!page.has_listener(EventName::Ping));
    Ok(())
}

#[tokio::test]
async fn duplicate_response_is_ignored() -> Result<()> {
    let (channel, extension, _page) = pair()?;
    let responder = Transport::new(channel.clone(), "complexity");
    let mut inbound = responder.subscribe();

    let request = tokio::spawn({
        let extension = extension.clone();
        async move { extension.send_message(EventName::Ping, Value::Null).await }
    });

    let envelope = inbound.recv().await.expect("request");
    responder.send(&Envelope::response(envelope.message_id.clone(), json!("one")))?;
    responder.send(&Envelope::response(envelope.message_id, json!("two")))?;

    assert_eq!(request.await??, json!("one"));
    settle().await;
    assert_eq!(extension.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn foreign_namespace_is_ignored() -> Result<()> {
    init_logging();
    let channel = SharedChannel::new();
    let extension = Messenger::new(&channel)?;
    let stranger = Messenger::builder()
        .channel(channel.clone())
        .namespace("someone-else")
        .build()?;
    stranger.add_listener(EventName::Ping, |_| async { Ok(json!("wrong")) });

    channel.post(json!({"type": "page-noise"}));
    channel.post(json!(42));

    let err = extension
        .send_message_with_timeout(EventName::Ping, Value::Null, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    Ok(())
}

#[tokio::test]
async fn foreign_namespace_skips_interceptors() -> Result<()> {
    let (channel, extension, page) = pair()?;
    let stranger = Messenger::builder()
        .channel(channel.clone())
        .namespace("someone-else")
        .build()?;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let handle = extension.add_interceptor(
        Interceptor::on(EventName::WebSocketEvent)
            .matching(|_| MatchOutcome::matched())
            .callback(move |_envelope, _args| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
    );

    let frame = json!({"event": "message", "payload": "431[]"});
    stranger.emit(EventName::WebSocketEvent, frame.clone())?;
    channel.post(json!({
        "messageId": "untagged",
        "event": "webSocketEvent",
        "payload": frame.clone(),
    }));
    settle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(handle.is_active());

    page.emit(EventName::WebSocketEvent, frame)?;
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn pending_limit_rejects_extra_requests() -> Result<()> {
    init_logging();
    let channel = SharedChannel::new();
    let extension = Messenger::builder()
        .channel(channel)
        .max_pending(1)
        .request_timeout(Duration::from_millis(200))
        .build()?;

    let first = tokio::spawn({
        let extension = extension.clone();
        async move { extension.send_message(EventName::Ping, Value::Null).await }
    });
    settle().await;

    let err = extension
        .send_message(EventName::Ping, Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TooManyPending { pending: 1, max: 1 }));
    assert!(err.is_recoverable());

    assert!(first.await?.unwrap_err().is_timeout());
    Ok(())
}

// ============================================================================
// Interceptors
// ============================================================================

#[tokio::test]
async fn one_shot_interceptor_fires_once() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let handle = extension.add_interceptor(
        Interceptor::on(EventName::WebSocketEvent)
            .matching(code_value(421))
            .callback(move |_envelope, args| {
                let _ = tx.send(args);
                async { Ok(()) }
            })
            .stop_when(|payload| payload["code"] == 421),
    );

    page.emit(EventName::WebSocketEvent, json!({"code": 123}))?;
    page.emit(EventName::WebSocketEvent, json!({"code": 421, "value": "x"}))?;
    page.emit(EventName::WebSocketEvent, json!({"code": 421, "value": "y"}))?;

    let args = timeout(Duration::from_secs(1), rx.recv()).await?.expect("args");
    assert_eq!(args, vec![json!("x")]);

    settle().await;
    assert!(rx.try_recv().is_err());
    assert!(!handle.is_active());
    assert_eq!(extension.interceptor_count(), 0);
    Ok(())
}

#[tokio::test]
async fn interceptors_fan_out() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    let hits = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let hits = Arc::clone(&hits);
        extension.add_interceptor(
            Interceptor::on(EventName::LongPollingEvent)
                .matching(|_| MatchOutcome::matched())
                .callback(move |_envelope, _args| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                }),
        );
    }

    page.emit(
        EventName::LongPollingEvent,
        json!({"event": "response", "payload": "42[]"}),
    )?;
    settle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(extension.interceptor_count(), 3);
    Ok(())
}

#[tokio::test]
async fn interceptors_see_requests_that_handlers_answer() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    page.add_listener(EventName::Ping, |_| async { Ok(json!("pong")) });

    let observed = page.wait_for(EventName::Ping, |_| MatchOutcome::matched());
    let reply = extension.send_message(EventName::Ping, Value::Null).await?;

    assert_eq!(reply, json!("pong"));
    assert_eq!(timeout(Duration::from_secs(1), observed.wait()).await??, Vec::<Value>::new());
    Ok(())
}

#[tokio::test]
async fn callback_may_send_requests() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    page.add_listener(EventName::GetActiveWebSocketType, |_| async { Ok(json!("WebSocket")) });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let requester = extension.clone();
    extension.add_interceptor(
        Interceptor::on(EventName::WebsocketCaptured)
            .matching(|_| MatchOutcome::matched())
            .callback(move |_envelope, _args| {
                let requester = requester.clone();
                let tx = tx.clone();
                async move {
                    let kind = requester.request(Message::GetActiveWebSocketType).await?;
                    let _ = tx.send(kind);
                    Ok(())
                }
            })
            .stop_when(|_| true),
    );

    page.emit(EventName::WebsocketCaptured, Value::Null)?;

    let kind = timeout(Duration::from_secs(1), rx.recv()).await?.expect("kind");
    assert_eq!(kind, json!("WebSocket"));
    Ok(())
}

// ============================================================================
// Waits
// ============================================================================

#[tokio::test]
async fn wait_for_frame_resolves_with_ack_args() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    let wait = extension.wait_for_frame(FrameFilter::code(431).incoming());

    let sent = WebSocketEventData::frame(WebSocketEventKind::Send, &Frame::parse("431[{}]").expect("frame"));
    let ack = WebSocketEventData::frame(
        WebSocketEventKind::Message,
        &Frame::parse(r#"431[{"status":"ok"}]"#).expect("frame"),
    );
    page.emit(EventName::WebSocketEvent, serde_json::to_value(sent)?)?;
    page.emit(EventName::WebSocketEvent, serde_json::to_value(ack)?)?;

    let args = timeout(Duration::from_secs(1), wait.wait()).await??;
    assert_eq!(args, vec![json!({"status": "ok"})]);
    assert_eq!(extension.interceptor_count(), 0);
    Ok(())
}

#[tokio::test]
async fn send_frame_reaches_page_handler() -> Result<()> {
    let (_channel, extension, page) = pair()?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    page.add_listener(EventName::SendWebSocketMessage, move |payload| {
        let _ = tx.send(payload);
        async { Ok(Value::Null) }
    });

    extension
        .send_frame(&Frame::event(421, "upsert_thread_collection", json!({})))
        .await?;

    let text = rx.recv().await.expect("frame text");
    assert_eq!(text, json!(r#"421["upsert_thread_collection",{}]"#));
    Ok(())
}

#[tokio::test]
async fn wait_expires() -> Result<()> {
    let (_channel, extension, _page) = pair()?;
    let wait = extension.wait_for_with_expiry(
        EventName::WebSocketEvent,
        code_value(421),
        Duration::from_millis(30),
    );

    let err = wait.wait().await.unwrap_err();
    assert!(matches!(err, Error::WaitExpired));
    assert_eq!(extension.interceptor_count(), 0);
    Ok(())
}

#[tokio::test]
async fn wait_cancelled_by_token() -> Result<()> {
    let (_channel, extension, _page) = pair()?;
    let wait = extension.wait_for(EventName::WebSocketEvent, code_value(421));
    let token = wait.cancellation_token();

    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = wait.wait().await.unwrap_err();
    assert!(matches!(err, Error::WaitCancelled));
    assert_eq!(extension.interceptor_count(), 0);
    Ok(())
}

// ============================================================================
// Disposal
// ============================================================================

#[tokio::test]
async fn dispose_rejects_pending_and_clears_registries() -> Result<()> {
    let (_channel, extension, _page) = pair()?;
    extension.add_listener(EventName::Log, |payload| async move { Ok(payload) });
    extension.add_interceptor(Interceptor::on(EventName::WebSocketEvent));
    let wait = extension.wait_for(EventName::WebSocketEvent, code_value(1));

    let pending = tokio::spawn({
        let extension = extension.clone();
        async move { extension.send_message(EventName::Ping, Value::Null).await }
    });
    settle().await;
    assert_eq!(extension.pending_count(), 1);

    extension.dispose();

    assert!(matches!(pending.await?, Err(Error::Disposed)));
    assert_eq!(wait.state(), WaitState::Expired);
    assert!(matches!(wait.wait().await, Err(Error::WaitExpired)));
    assert_eq!(extension.interceptor_count(), 0);
    assert_eq!(extension.listener_count(), 0);
    assert!(matches!(
        extension.send_message(EventName::Ping, Value::Null).await,
        Err(Error::Disposed)
    ));
    Ok(())
}
