//! Messenger implementation.
//!
//! A [`Messenger`] is one side's endpoint on the shared channel. It owns
//! the pending-request map, the handler registry and the interceptor
//! registry, and runs two tasks:
//!
//! - the receive loop: filters inbound envelopes, settles responses,
//!   starts handlers for requests, and forwards every envelope to
//! - the interceptor dispatcher: runs interceptors one envelope at a time,
//!   in arrival order.
//!
//! Interceptor callbacks run off the receive loop, so a callback may send a
//! request and await its response.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::{Envelope, EventName, Frame, FrameFilter, Message};
use crate::transport::{Inbound, SharedChannel, Transport};

use super::builder::MessengerBuilder;
use super::correlator::Correlator;
use super::handlers::{self, EventHandler, HandlerRegistry, HandlerResult};
use super::interceptor::{Interceptor, InterceptorHandle, InterceptorRegistry, MatchOutcome};
use super::options::MessengerOptions;
use super::wait::{EventWait, frame_matcher};

// ============================================================================
// MessengerCommand
// ============================================================================

/// Internal commands for the receive loop.
enum MessengerCommand {
    /// Stop the loop.
    Shutdown,
}

// ============================================================================
// Messenger
// ============================================================================

/// Request/response and interception endpoint on a shared channel.
///
/// Cloning yields another handle to the same endpoint. The endpoint stops
/// when [`Messenger::dispose`] is called or the last handle is dropped.
///
/// # Example
///
/// ```no_run
/// use serde_json::{Value, json};
/// use webpage_messenger::{EventName, Messenger, SharedChannel};
///
/// # async fn example() -> webpage_messenger::Result<()> {
/// let channel = SharedChannel::new();
/// let page = Messenger::new(&channel)?;
/// let extension = Messenger::new(&channel)?;
///
/// page.add_listener(EventName::Ping, |_| async { Ok(json!("pong")) });
///
/// let reply = extension.send_message(EventName::Ping, Value::Null).await?;
/// assert_eq!(reply, json!("pong"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

/// State shared by every clone of a messenger.
struct Inner {
    transport: Transport,
    options: MessengerOptions,
    correlator: Arc<Correlator>,
    handlers: Arc<HandlerRegistry>,
    interceptors: Arc<InterceptorRegistry>,
    command_tx: mpsc::UnboundedSender<MessengerCommand>,
    disposed: AtomicBool,
}

// ============================================================================
// Messenger - Constructors
// ============================================================================

impl Messenger {
    /// Creates a builder for configuring a messenger.
    #[inline]
    #[must_use]
    pub fn builder() -> MessengerBuilder {
        MessengerBuilder::new()
    }

    /// Creates a messenger on `channel` with default options.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Never fails with default options; see [`MessengerBuilder::build`].
    pub fn new(channel: &SharedChannel) -> Result<Self> {
        Self::builder().channel(channel.clone()).build()
    }

    /// Creates a messenger from validated options and spawns its tasks.
    pub(crate) fn spawn(channel: SharedChannel, options: MessengerOptions) -> Self {
        let transport = Transport::new(channel, options.namespace.as_str());
        let inbound = transport.subscribe();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        let correlator = Arc::new(Correlator::default());
        let handlers = Arc::new(HandlerRegistry::default());
        let interceptors = Arc::new(InterceptorRegistry::default());

        let router = Router {
            transport: transport.clone(),
            correlator: Arc::clone(&correlator),
            handlers: Arc::clone(&handlers),
            dispatch_tx,
        };

        tokio::spawn(Self::run_receive_loop(inbound, command_rx, router));
        tokio::spawn(Self::run_interceptor_dispatch(
            dispatch_rx,
            Arc::clone(&interceptors),
        ));

        info!(namespace = %options.namespace, "Messenger started");

        Self {
            inner: Arc::new(Inner {
                transport,
                options,
                correlator,
                handlers,
                interceptors,
                command_tx,
                disposed: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// Messenger - Requests
// ============================================================================

impl Messenger {
    /// Sends a request and waits for its response with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no response arrives in time, which
    ///   includes the case where nobody handles `event`
    /// - [`Error::HandlerFailure`] if the remote handler failed
    /// - [`Error::TooManyPending`] if the pending limit is reached
    /// - [`Error::Disposed`] if the messenger is disposed
    pub async fn send_message(&self, event: EventName, payload: Value) -> Result<Value> {
        self.send_message_with_timeout(event, payload, self.inner.options.request_timeout)
            .await
    }

    /// Sends a request and waits for its response with a custom timeout.
    ///
    /// # Errors
    ///
    /// See [`Messenger::send_message`]. Also returns
    /// [`Error::InvalidArgument`] for the response event.
    pub async fn send_message_with_timeout(
        &self,
        event: EventName,
        payload: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        self.ensure_active()?;
        if event.is_response() {
            return Err(Error::invalid_argument(
                "responses are posted by handlers, not sent as requests",
            ));
        }

        let envelope = Envelope::request(event, payload);
        let message_id = envelope.message_id.clone();

        let mut receiver = self.inner.correlator.register(
            message_id.clone(),
            event,
            self.inner.options.max_pending,
        )?;

        if let Err(e) = self.inner.transport.send(&envelope) {
            self.inner.correlator.discard(&message_id);
            return Err(e);
        }

        trace!(%message_id, %event, "Request sent");

        match timeout(request_timeout, &mut receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Disposed),
            Err(_) => {
                if !self.inner.correlator.discard(&message_id)
                    && let Ok(result) = receiver.try_recv()
                {
                    // Settled between the deadline and the discard.
                    return result;
                }

                debug!(%message_id, %event, timeout_ms = request_timeout.as_millis() as u64, "Request timed out");
                Err(Error::request_timeout(
                    message_id,
                    event,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Sends a typed request with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Messenger::send_message`].
    pub async fn request(&self, message: Message) -> Result<Value> {
        let event = message.event();
        self.send_message(event, message.into_payload()?).await
    }

    /// Sends a typed request with a custom timeout.
    ///
    /// # Errors
    ///
    /// See [`Messenger::send_message`].
    pub async fn request_with_timeout(
        &self,
        message: Message,
        request_timeout: Duration,
    ) -> Result<Value> {
        let event = message.event();
        self.send_message_with_timeout(event, message.into_payload()?, request_timeout)
            .await
    }

    /// Posts an envelope without expecting a response.
    ///
    /// Used to relay traffic that interceptors on either side observe.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] if the messenger is disposed
    /// - [`Error::Json`] if the payload cannot be serialized
    pub fn emit(&self, event: EventName, payload: Value) -> Result<MessageId> {
        self.ensure_active()?;
        let envelope = Envelope::request(event, payload);
        self.inner.transport.send(&envelope)?;
        Ok(envelope.message_id)
    }

    /// Asks the page to send `frame` over its socket.
    ///
    /// # Errors
    ///
    /// See [`Messenger::send_message`].
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.request(Message::SendWebSocketMessage(frame.to_string()))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Messenger - Handlers
// ============================================================================

impl Messenger {
    /// Registers the handler for `event`, replacing any previous one.
    pub fn add_listener<F, Fut>(&self, event: EventName, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_event_handler(event, handler);
    }

    /// Registers a handler object for `event`, replacing any previous one.
    pub fn add_event_handler<H: EventHandler>(&self, event: EventName, handler: H) {
        self.inner.handlers.insert(event, Arc::new(handler));
    }

    /// Unregisters the handler for `event`.
    ///
    /// Returns `false` if none was registered.
    pub fn remove_listener(&self, event: EventName) -> bool {
        self.inner.handlers.remove(event)
    }

    /// Returns `true` if `event` has a handler.
    #[inline]
    #[must_use]
    pub fn has_listener(&self, event: EventName) -> bool {
        self.inner.handlers.contains(event)
    }
}

// ============================================================================
// Messenger - Interception
// ============================================================================

impl Messenger {
    /// Registers an interceptor.
    ///
    /// The configured default expiry applies if the interceptor has none.
    /// On a disposed messenger nothing is registered and the returned
    /// handle is already inactive.
    pub fn add_interceptor(&self, interceptor: Interceptor) -> InterceptorHandle {
        self.inner
            .interceptors
            .insert(interceptor, self.inner.options.interceptor_expiry)
    }

    /// Waits for the next `event` envelope accepted by `matcher`, using the
    /// default interceptor expiry.
    ///
    /// On a disposed messenger the wait is born expired and
    /// [`EventWait::wait`] fails with [`Error::WaitExpired`] at once.
    pub fn wait_for<M>(&self, event: EventName, matcher: M) -> EventWait
    where
        M: Fn(&Envelope) -> MatchOutcome + Send + Sync + 'static,
    {
        EventWait::arm(
            &self.inner.interceptors,
            event,
            matcher,
            self.inner.options.interceptor_expiry,
        )
    }

    /// Waits for the next `event` envelope accepted by `matcher`, giving up
    /// after `expiry`.
    pub fn wait_for_with_expiry<M>(
        &self,
        event: EventName,
        matcher: M,
        expiry: Duration,
    ) -> EventWait
    where
        M: Fn(&Envelope) -> MatchOutcome + Send + Sync + 'static,
    {
        EventWait::arm(&self.inner.interceptors, event, matcher, Some(expiry))
    }

    /// Waits for the next relayed socket frame passing `filter`.
    ///
    /// Resolves with the frame arguments.
    pub fn wait_for_frame(&self, filter: FrameFilter) -> EventWait {
        self.wait_for(EventName::WebSocketEvent, frame_matcher(filter))
    }

    /// Like [`Messenger::wait_for_frame`], giving up after `expiry`.
    pub fn wait_for_frame_with_expiry(&self, filter: FrameFilter, expiry: Duration) -> EventWait {
        self.wait_for_with_expiry(EventName::WebSocketEvent, frame_matcher(filter), expiry)
    }
}

// ============================================================================
// Messenger - Lifecycle & Introspection
// ============================================================================

impl Messenger {
    /// Stops the messenger.
    ///
    /// Rejects pending requests with [`Error::Disposed`], removes every
    /// interceptor (failing outstanding waits) and every handler, and
    /// refuses interceptors registered afterwards. Calling it again does
    /// nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let rejected = self.inner.correlator.fail_all(|| Error::Disposed);
        let removed = self.inner.interceptors.close();
        self.inner.handlers.clear();
        let _ = self.inner.command_tx.send(MessengerCommand::Shutdown);

        info!(rejected, removed, "Messenger disposed");
    }

    /// Returns `true` once [`Messenger::dispose`] has been called.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Returns the number of live interceptors.
    #[inline]
    #[must_use]
    pub fn interceptor_count(&self) -> usize {
        self.inner.interceptors.len()
    }

    /// Returns the number of registered handlers.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Returns the options this messenger was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &MessengerOptions {
        &self.inner.options
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("namespace", &self.inner.options.namespace)
            .field("pending", &self.pending_count())
            .field("listeners", &self.listener_count())
            .field("interceptors", &self.interceptor_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ============================================================================
// Messenger - Tasks
// ============================================================================

impl Messenger {
    /// Receive loop: routes inbound envelopes until shutdown.
    async fn run_receive_loop(
        mut inbound: Inbound,
        mut command_rx: mpsc::UnboundedReceiver<MessengerCommand>,
        router: Router,
    ) {
        loop {
            tokio::select! {
                envelope = inbound.recv() => {
                    match envelope {
                        Some(envelope) => router.route(envelope),
                        None => {
                            debug!("Shared channel closed");
                            break;
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(MessengerCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            break;
                        }
                        None => {
                            debug!("All messenger handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        // Fail whatever is still waiting
        router.correlator.fail_all(|| Error::Disposed);

        debug!("Receive loop terminated");
    }

    /// Interceptor dispatcher: one envelope at a time, in arrival order.
    async fn run_interceptor_dispatch(
        mut dispatch_rx: mpsc::UnboundedReceiver<Envelope>,
        interceptors: Arc<InterceptorRegistry>,
    ) {
        while let Some(envelope) = dispatch_rx.recv().await {
            interceptors.dispatch(&envelope).await;
        }

        trace!("Interceptor dispatch terminated");
    }
}

// ============================================================================
// Router
// ============================================================================

/// What the receive loop needs to route envelopes.
struct Router {
    transport: Transport,
    correlator: Arc<Correlator>,
    handlers: Arc<HandlerRegistry>,
    dispatch_tx: mpsc::UnboundedSender<Envelope>,
}

impl Router {
    /// Routes one accepted envelope.
    fn route(&self, envelope: Envelope) {
        if envelope.is_response() {
            if !self.correlator.resolve(&envelope) {
                trace!(message_id = %envelope.message_id, "Response for unknown or settled request");
            }
        } else if self.correlator.is_pending(&envelope.message_id) {
            // Our own request coming back over the broadcast
            trace!(message_id = %envelope.message_id, "Skipping own request");
        } else if let Some(handler) = self.handlers.get(envelope.event) {
            tokio::spawn(handlers::respond(
                handler,
                envelope.clone(),
                self.transport.clone(),
            ));
        } else {
            trace!(message_id = %envelope.message_id, event = %envelope.event, "No handler, request dropped");
        }

        if self.dispatch_tx.send(envelope).is_err() {
            trace!("Interceptor dispatcher gone");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
