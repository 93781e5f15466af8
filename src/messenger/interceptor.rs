//! Passive traffic interceptors.
//!
//! An interceptor watches one event name. For every envelope of that event
//! it evaluates its match condition, runs its callback on a match, then
//! checks its stop condition (whether or not it matched) and removes itself
//! when that returns `true`. Every interceptor on an event sees every
//! envelope; nothing is consumed.
//!
//! # Example
//!
//! ```ignore
//! use webpage_messenger::{EventName, Interceptor, MatchOutcome};
//!
//! let handle = messenger.add_interceptor(
//!     Interceptor::on(EventName::WebSocketEvent)
//!         .matching(|envelope| match envelope.get_i64("code") {
//!             Some(421) => MatchOutcome::with_args(vec![envelope.payload["value"].clone()]),
//!             _ => MatchOutcome::skip(),
//!         })
//!         .callback(|_envelope, args| async move {
//!             println!("matched with {args:?}");
//!             Ok(())
//!         })
//!         .stop_when(|payload| payload["code"] == 421),
//! );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::identifiers::InterceptorId;
use crate::protocol::{Envelope, EventName};

use super::handlers::panic_message;

// ============================================================================
// Types
// ============================================================================

/// Decides whether an envelope matches, extracting arguments.
type MatchFn = Box<dyn Fn(&Envelope) -> MatchOutcome + Send + Sync>;

/// Runs on a match.
type CallbackFn = Box<dyn Fn(Envelope, Vec<Value>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Decides, from a payload, whether the interceptor is done.
type StopFn = Box<dyn Fn(&Value) -> bool + Send + Sync>;

// ============================================================================
// MatchOutcome
// ============================================================================

/// Result of an interceptor's match condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    /// Whether the envelope matched.
    pub matched: bool,

    /// Values extracted for the callback.
    pub args: Vec<Value>,
}

impl MatchOutcome {
    /// A match without arguments.
    #[inline]
    #[must_use]
    pub fn matched() -> Self {
        Self {
            matched: true,
            args: Vec::new(),
        }
    }

    /// A match carrying `args`.
    #[inline]
    #[must_use]
    pub fn with_args(args: Vec<Value>) -> Self {
        Self {
            matched: true,
            args,
        }
    }

    /// No match.
    #[inline]
    #[must_use]
    pub fn skip() -> Self {
        Self::default()
    }
}

impl From<bool> for MatchOutcome {
    fn from(matched: bool) -> Self {
        Self {
            matched,
            args: Vec::new(),
        }
    }
}

// ============================================================================
// Interceptor
// ============================================================================

/// Description of an interceptor, built fluently and handed to
/// [`crate::Messenger::add_interceptor`].
///
/// Defaults: matches every envelope, does nothing on match, never stops,
/// no expiry of its own.
pub struct Interceptor {
    event: EventName,
    match_condition: MatchFn,
    callback: CallbackFn,
    stop_condition: StopFn,
    expiry: Option<Duration>,
}

impl Interceptor {
    /// Starts an interceptor watching `event`.
    #[must_use]
    pub fn on(event: EventName) -> Self {
        Self {
            event,
            match_condition: Box::new(|_: &Envelope| MatchOutcome::matched()),
            callback: Box::new(ignore_match),
            stop_condition: Box::new(|_: &Value| false),
            expiry: None,
        }
    }

    /// Sets the match condition.
    #[must_use]
    pub fn matching<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Envelope) -> MatchOutcome + Send + Sync + 'static,
    {
        self.match_condition = Box::new(condition);
        self
    }

    /// Sets the callback run on each match.
    ///
    /// Its result is only logged; forwarding anything is up to the
    /// callback itself.
    #[must_use]
    pub fn callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Envelope, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.callback = Box::new(move |envelope, args| callback(envelope, args).boxed());
        self
    }

    /// Sets the stop condition, evaluated against every observed payload.
    #[must_use]
    pub fn stop_when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.stop_condition = Box::new(condition);
        self
    }

    /// Removes the interceptor after `expiry`, whatever its stop condition.
    #[inline]
    #[must_use]
    pub fn expires_after(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Returns the watched event.
    #[inline]
    #[must_use]
    pub fn event(&self) -> EventName {
        self.event
    }

    /// Returns the expiry set on this interceptor, if any.
    #[inline]
    #[must_use]
    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("event", &self.event)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Default callback.
fn ignore_match(_envelope: Envelope, _args: Vec<Value>) -> BoxFuture<'static, Result<()>> {
    async { Ok(()) }.boxed()
}

// ============================================================================
// Entry
// ============================================================================

/// A registered interceptor.
struct Entry {
    id: InterceptorId,
    event: EventName,
    match_condition: MatchFn,
    callback: CallbackFn,
    stop_condition: StopFn,
    expires_at: Option<Instant>,
    /// Stops the expiry timer once the entry is gone.
    _timer: Option<DropGuard>,
}

impl Entry {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

// ============================================================================
// InterceptorRegistry
// ============================================================================

/// Ordered set of live interceptors.
#[derive(Default)]
pub(crate) struct InterceptorRegistry {
    entries: Mutex<Vec<Arc<Entry>>>,
    closed: AtomicBool,
}

impl InterceptorRegistry {
    /// Registers `interceptor`, applying `default_expiry` if it has none.
    ///
    /// Once the registry is closed the interceptor is dropped unregistered
    /// and the returned handle is inactive. Must be called within a tokio
    /// runtime when an expiry applies.
    pub(crate) fn insert(
        self: &Arc<Self>,
        interceptor: Interceptor,
        default_expiry: Option<Duration>,
    ) -> InterceptorHandle {
        let id = InterceptorId::next();
        let handle = InterceptorHandle {
            id,
            registry: Arc::downgrade(self),
        };
        let event = interceptor.event;

        if self.is_closed() {
            debug!(%id, %event, "Registry closed, interceptor dropped");
            return handle;
        }

        let expiry = interceptor.expiry.or(default_expiry);
        let timer = expiry.map(|expiry| self.spawn_expiry_timer(id, expiry));

        let entry = Entry {
            id,
            event,
            match_condition: interceptor.match_condition,
            callback: interceptor.callback,
            stop_condition: interceptor.stop_condition,
            expires_at: expiry.map(|expiry| Instant::now() + expiry),
            _timer: timer,
        };

        {
            let mut entries = self.entries.lock();
            // A close between the two checks still wins
            if self.is_closed() {
                return handle;
            }
            entries.push(Arc::new(entry));
        }

        debug!(%id, %event, ?expiry, "Interceptor registered");
        handle
    }

    /// Removes `id` after `expiry` unless the returned guard is dropped
    /// first.
    fn spawn_expiry_timer(self: &Arc<Self>, id: InterceptorId, expiry: Duration) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let registry = Arc::downgrade(self);

        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = sleep(expiry) => {
                    if let Some(registry) = registry.upgrade()
                        && registry.remove(id)
                    {
                        debug!(%id, "Interceptor expired");
                    }
                }
            }
        });

        token.drop_guard()
    }

    /// Removes an interceptor, returning `false` if it was already gone.
    pub(crate) fn remove(&self, id: InterceptorId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    /// Returns `true` if the interceptor is still registered.
    #[inline]
    pub(crate) fn contains(&self, id: InterceptorId) -> bool {
        self.entries.lock().iter().any(|entry| entry.id == id)
    }

    /// Returns the number of live interceptors.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Removes every interceptor and refuses new ones.
    pub(crate) fn close(&self) -> usize {
        let drained = {
            let mut entries = self.entries.lock();
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *entries)
        };
        drained.len()
    }

    /// Returns `true` once [`InterceptorRegistry::close`] has been called.
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs every interceptor watching `envelope.event`, in registration
    /// order.
    ///
    /// Iterates over a snapshot: an interceptor added during dispatch first
    /// sees the next envelope, one removed during dispatch is skipped.
    pub(crate) async fn dispatch(&self, envelope: &Envelope) {
        let snapshot: Vec<Arc<Entry>> = {
            let now = Instant::now();
            let mut entries = self.entries.lock();
            entries.retain(|entry| !entry.is_expired(now));
            entries
                .iter()
                .filter(|entry| entry.event == envelope.event)
                .cloned()
                .collect()
        };

        for entry in snapshot {
            if !self.contains(entry.id) {
                continue;
            }

            Self::run_entry(&entry, envelope).await;

            if Self::should_stop(&entry, &envelope.payload) && self.remove(entry.id) {
                debug!(id = %entry.id, event = %entry.event, "Interceptor stopped");
            }
        }
    }

    /// Evaluates the match condition and runs the callback on a match.
    async fn run_entry(entry: &Entry, envelope: &Envelope) {
        let outcome = match catch_unwind(AssertUnwindSafe(|| (entry.match_condition)(envelope))) {
            Ok(outcome) => outcome,
            Err(panic) => {
                warn!(id = %entry.id, message = %panic_message(panic.as_ref()), "Match condition panicked");
                return;
            }
        };

        if !outcome.matched {
            return;
        }

        let callback = catch_unwind(AssertUnwindSafe(|| {
            (entry.callback)(envelope.clone(), outcome.args)
        }));
        let result = match callback {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match result {
            Ok(Ok(())) => trace!(id = %entry.id, message_id = %envelope.message_id, "Interceptor matched"),
            Ok(Err(e)) => warn!(id = %entry.id, error = %e, "Interceptor callback failed"),
            Err(panic) => {
                warn!(id = %entry.id, message = %panic_message(panic.as_ref()), "Interceptor callback panicked");
            }
        }
    }

    /// Evaluates the stop condition. A panicking condition stops the
    /// interceptor.
    fn should_stop(entry: &Entry, payload: &Value) -> bool {
        catch_unwind(AssertUnwindSafe(|| (entry.stop_condition)(payload))).unwrap_or_else(|panic| {
            warn!(id = %entry.id, message = %panic_message(panic.as_ref()), "Stop condition panicked");
            true
        })
    }
}

// ============================================================================
// InterceptorHandle
// ============================================================================

/// Removal handle returned when an interceptor is registered.
///
/// Dropping the handle does not remove the interceptor.
#[derive(Debug, Clone)]
pub struct InterceptorHandle {
    id: InterceptorId,
    registry: Weak<InterceptorRegistry>,
}

impl InterceptorHandle {
    /// Returns the interceptor id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> InterceptorId {
        self.id
    }

    /// Removes the interceptor. Returns `false` if it was already gone.
    pub fn remove(&self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id));
        if removed {
            debug!(id = %self.id, "Interceptor removed");
        }
        removed
    }

    /// Returns `true` while the interceptor is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn relay(payload: Value) -> Envelope {
        Envelope::request(EventName::WebSocketEvent, payload)
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn test_one_shot_interceptor() {
        let registry = Arc::new(InterceptorRegistry::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = registry.insert(
            Interceptor::on(EventName::WebSocketEvent)
                .matching(|envelope| match envelope.get_i64("code") {
                    Some(421) => MatchOutcome::with_args(vec![envelope.payload["value"].clone()]),
                    _ => MatchOutcome::skip(),
                })
                .callback(move |_, args| {
                    sink.lock().extend(args);
                    async { Ok(()) }
                })
                .stop_when(|payload| payload["code"] == 421),
            None,
        );

        registry.dispatch(&relay(json!({"code": 123}))).await;
        assert!(handle.is_active());

        registry.dispatch(&relay(json!({"code": 421, "value": "x"}))).await;
        registry.dispatch(&relay(json!({"code": 421, "value": "y"}))).await;

        assert_eq!(*seen.lock(), vec![json!("x")]);
        assert!(!handle.is_active());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_fan_out() {
        let registry = Arc::new(InterceptorRegistry::default());
        let first = counter();
        let second = counter();

        for hits in [&first, &second] {
            let hits = Arc::clone(hits);
            registry.insert(
                Interceptor::on(EventName::WebSocketEvent).callback(move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                }),
                None,
            );
        }

        registry.dispatch(&relay(json!({"code": 1}))).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_events_ignored() {
        let registry = Arc::new(InterceptorRegistry::default());
        let hits = counter();
        let sink = Arc::clone(&hits);

        registry.insert(
            Interceptor::on(EventName::LongPollingEvent).callback(move |_, _| {
                sink.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
            None,
        );

        registry.dispatch(&relay(json!({}))).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_checked_without_match() {
        let registry = Arc::new(InterceptorRegistry::default());
        let handle = registry.insert(
            Interceptor::on(EventName::WebSocketEvent)
                .matching(|_| MatchOutcome::skip())
                .stop_when(|payload| payload["event"] == "close"),
            None,
        );

        registry.dispatch(&relay(json!({"event": "message"}))).await;
        assert!(handle.is_active());

        registry.dispatch(&relay(json!({"event": "close"}))).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let registry = Arc::new(InterceptorRegistry::default());
        let hits = counter();

        registry.insert(
            Interceptor::on(EventName::WebSocketEvent).matching(|_| panic!("bad matcher")),
            None,
        );
        registry.insert(
            Interceptor::on(EventName::WebSocketEvent)
                .callback(|_, _| async { Err(Error::invalid_argument("bad callback")) }),
            None,
        );
        registry.insert(
            Interceptor::on(EventName::WebSocketEvent).callback(|_, _| async {
                if true {
                    panic!("callback exploded");
                }
                Ok(())
            }),
            None,
        );
        let sink = Arc::clone(&hits);
        registry.insert(
            Interceptor::on(EventName::WebSocketEvent).callback(move |_, _| {
                sink.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
            None,
        );

        registry.dispatch(&relay(json!({}))).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_panicking_stop_condition_removes() {
        let registry = Arc::new(InterceptorRegistry::default());
        let handle = registry.insert(
            Interceptor::on(EventName::WebSocketEvent).stop_when(|_| panic!("bad stop")),
            None,
        );

        registry.dispatch(&relay(json!({}))).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_registration_during_dispatch() {
        let registry = Arc::new(InterceptorRegistry::default());
        let late_hits = counter();

        let weak = Arc::downgrade(&registry);
        let sink = Arc::clone(&late_hits);
        registry.insert(
            Interceptor::on(EventName::WebSocketEvent)
                .callback(move |_, _| {
                    if let Some(registry) = weak.upgrade() {
                        let sink = Arc::clone(&sink);
                        registry.insert(
                            Interceptor::on(EventName::WebSocketEvent).callback(move |_, _| {
                                sink.fetch_add(1, Ordering::SeqCst);
                                async { Ok(()) }
                            }),
                            None,
                        );
                    }
                    async { Ok(()) }
                })
                .stop_when(|_| true),
            None,
        );

        registry.dispatch(&relay(json!({"n": 1}))).await;
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);

        registry.dispatch(&relay(json!({"n": 2}))).await;
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removed_mid_dispatch_is_skipped() {
        let registry = Arc::new(InterceptorRegistry::default());
        let hits = counter();

        let victim_slot: Arc<Mutex<Option<InterceptorHandle>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&victim_slot);
        registry.insert(
            Interceptor::on(EventName::WebSocketEvent).callback(move |_, _| {
                if let Some(victim) = slot.lock().as_ref() {
                    victim.remove();
                }
                async { Ok(()) }
            }),
            None,
        );

        let sink = Arc::clone(&hits);
        let victim = registry.insert(
            Interceptor::on(EventName::WebSocketEvent).callback(move |_, _| {
                sink.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
            None,
        );
        *victim_slot.lock() = Some(victim);

        registry.dispatch(&relay(json!({}))).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expiry_removes_interceptor() {
        let registry = Arc::new(InterceptorRegistry::default());
        let handle = registry.insert(
            Interceptor::on(EventName::WebSocketEvent).expires_after(Duration::from_millis(20)),
            None,
        );
        let defaulted = registry.insert(
            Interceptor::on(EventName::WebSocketEvent),
            Some(Duration::from_millis(20)),
        );
        let forever = registry.insert(Interceptor::on(EventName::WebSocketEvent), None);

        assert!(handle.is_active());
        sleep(Duration::from_millis(60)).await;

        assert!(!handle.is_active());
        assert!(!defaulted.is_active());
        assert!(forever.is_active());
    }

    #[tokio::test]
    async fn test_removal_stops_expiry_timers() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let registry = Arc::new(InterceptorRegistry::default());
        let baseline = metrics.num_alive_tasks();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                registry.insert(
                    Interceptor::on(EventName::WebSocketEvent),
                    Some(Duration::from_secs(3600)),
                )
            })
            .collect();
        assert_eq!(metrics.num_alive_tasks(), baseline + 10);

        for handle in &handles[..5] {
            assert!(handle.remove());
        }
        assert_eq!(registry.close(), 5);
        sleep(Duration::from_millis(20)).await;

        assert_eq!(metrics.num_alive_tasks(), baseline);
    }

    #[tokio::test]
    async fn test_matched_one_shot_stops_its_timer() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let registry = Arc::new(InterceptorRegistry::default());
        let baseline = metrics.num_alive_tasks();

        let handle = registry.insert(
            Interceptor::on(EventName::WebSocketEvent)
                .stop_when(|_| true)
                .expires_after(Duration::from_secs(3600)),
            None,
        );
        registry.dispatch(&relay(json!({"code": 1}))).await;
        sleep(Duration::from_millis(20)).await;

        assert!(!handle.is_active());
        assert_eq!(metrics.num_alive_tasks(), baseline);
    }

    #[tokio::test]
    async fn test_closed_registry_refuses_interceptors() {
        let registry = Arc::new(InterceptorRegistry::default());
        registry.insert(Interceptor::on(EventName::Log), None);

        assert_eq!(registry.close(), 1);
        assert!(registry.is_closed());

        let late = registry.insert(
            Interceptor::on(EventName::Log),
            Some(Duration::from_secs(3600)),
        );
        assert!(!late.is_active());
        assert!(!late.remove());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_handle_remove_is_idempotent() {
        let registry = Arc::new(InterceptorRegistry::default());
        let handle = registry.insert(Interceptor::on(EventName::Log), None);

        assert!(handle.remove());
        assert!(!handle.remove());

        drop(registry);
        assert!(!handle.is_active());
        assert!(!handle.remove());
    }

    #[test]
    fn test_match_outcome_constructors() {
        assert!(MatchOutcome::matched().matched);
        assert!(!MatchOutcome::skip().matched);
        assert_eq!(MatchOutcome::from(true), MatchOutcome::matched());
        assert_eq!(MatchOutcome::with_args(vec![json!(1)]).args, vec![json!(1)]);
    }
}
