//! One-shot waits built on interceptors.
//!
//! An [`EventWait`] arms a single interceptor and resolves with the
//! arguments extracted from the first matching envelope.
//!
//! # States
//!
//! ```text
//! Armed ──match──► Matched ──interceptor removed──► Removed
//!   │
//!   ├──cancel────► Cancelled
//!   └──expiry────► Expired
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::InterceptorId;
use crate::protocol::{Envelope, EventName, FrameFilter, WebSocketEventData};

use super::interceptor::{Interceptor, InterceptorHandle, InterceptorRegistry, MatchOutcome};

// ============================================================================
// WaitState
// ============================================================================

/// Lifecycle of an [`EventWait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Interceptor registered, nothing matched yet.
    Armed,
    /// A matching envelope arrived; the interceptor is about to go.
    Matched,
    /// Matched and the interceptor is gone.
    Removed,
    /// Abandoned through the cancellation token.
    Cancelled,
    /// The interceptor expired or was cleared before a match.
    Expired,
}

/// Shared, transition-checked state cell.
///
/// Every transition out of `Armed` happens under this lock, so a match and
/// a cancellation cannot both win.
#[derive(Debug)]
struct StateCell(Mutex<WaitState>);

impl StateCell {
    /// Moves from `from` to `to`; returns `false` if the state was not `from`.
    fn advance(&self, from: WaitState, to: WaitState) -> bool {
        let mut state = self.0.lock();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    fn get(&self) -> WaitState {
        *self.0.lock()
    }

    fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.0.lock()
    }
}

// ============================================================================
// EventWait
// ============================================================================

/// Pending wait for the next envelope satisfying a condition.
///
/// Cancelling the token returned by [`EventWait::cancellation_token`]
/// abandons the wait whether or not [`EventWait::wait`] is being polled; a
/// match arriving afterwards is ignored. Dropping an unfinished wait
/// removes its interceptor.
pub struct EventWait {
    state: Arc<StateCell>,
    receiver: Option<oneshot::Receiver<Vec<Value>>>,
    token: CancellationToken,
    handle: InterceptorHandle,
    /// Stops the cancellation watcher when the wait goes away.
    _watcher: DropGuard,
}

impl EventWait {
    /// Registers the one-shot interceptor backing a wait.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn arm<M>(
        registry: &Arc<InterceptorRegistry>,
        event: EventName,
        matcher: M,
        expiry: Option<Duration>,
    ) -> Self
    where
        M: Fn(&Envelope) -> MatchOutcome + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let sender = Mutex::new(Some(sender));
        let state = Arc::new(StateCell(Mutex::new(WaitState::Armed)));
        let token = CancellationToken::new();

        let on_match = Arc::clone(&state);
        let on_stop = Arc::clone(&state);
        let match_token = token.clone();
        let stop_token = token.clone();

        let mut interceptor = Interceptor::on(event)
            .matching(matcher)
            .callback(move |_envelope, args| {
                let mut state = on_match.lock();
                if *state == WaitState::Armed {
                    if match_token.is_cancelled() {
                        *state = WaitState::Cancelled;
                    } else if let Some(sender) = sender.lock().take()
                        && sender.send(args).is_ok()
                    {
                        *state = WaitState::Matched;
                    }
                }
                async { Ok(()) }
            })
            .stop_when(move |_| on_stop.get() != WaitState::Armed || stop_token.is_cancelled());

        if let Some(expiry) = expiry {
            interceptor = interceptor.expires_after(expiry);
        }

        let handle = registry.insert(interceptor, None);
        let watcher = Self::spawn_watcher(Arc::clone(&state), token.clone(), handle.clone());

        Self {
            state,
            receiver: Some(receiver),
            token,
            handle,
            _watcher: watcher,
        }
    }

    /// Cancels the wait as soon as `token` fires, polled or not.
    fn spawn_watcher(
        state: Arc<StateCell>,
        token: CancellationToken,
        handle: InterceptorHandle,
    ) -> DropGuard {
        let finished = CancellationToken::new();
        let done = finished.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = done.cancelled() => {}
                () = token.cancelled() => {
                    if state.advance(WaitState::Armed, WaitState::Cancelled) {
                        handle.remove();
                        debug!(id = %handle.id(), "Wait cancelled by token");
                    }
                }
            }
        });

        finished.drop_guard()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> WaitState {
        match self.state.get() {
            WaitState::Armed if self.token.is_cancelled() => WaitState::Cancelled,
            WaitState::Armed if !self.handle.is_active() => WaitState::Expired,
            state => state,
        }
    }

    /// Returns the id of the backing interceptor.
    #[inline]
    #[must_use]
    pub fn interceptor_id(&self) -> InterceptorId {
        self.handle.id()
    }

    /// Returns a token that cancels this wait when triggered.
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the wait and removes its interceptor immediately.
    ///
    /// Has no effect once the wait has matched.
    pub fn cancel(&self) {
        if self.state.advance(WaitState::Armed, WaitState::Cancelled) {
            self.handle.remove();
            debug!(id = %self.handle.id(), "Wait cancelled");
        }
        self.token.cancel();
    }

    /// Waits for the match.
    ///
    /// A match that happened before cancellation still resolves.
    ///
    /// # Errors
    ///
    /// - [`Error::WaitCancelled`] if cancelled before a match
    /// - [`Error::WaitExpired`] if the interceptor expired or the messenger
    ///   was disposed first
    pub async fn wait(mut self) -> Result<Vec<Value>> {
        let Some(mut receiver) = self.receiver.take() else {
            return Err(Error::WaitCancelled);
        };

        if self.token.is_cancelled() {
            return self.settle_cancelled(&mut receiver);
        }

        let token = self.token.clone();

        tokio::select! {
            biased;

            () = token.cancelled() => self.settle_cancelled(&mut receiver),

            result = &mut receiver => match result {
                Ok(args) => Ok(self.complete(args)),
                Err(_) if self.state.get() == WaitState::Cancelled || token.is_cancelled() => {
                    self.handle.remove();
                    Err(Error::WaitCancelled)
                }
                Err(_) => {
                    self.state.advance(WaitState::Armed, WaitState::Expired);
                    debug!(id = %self.handle.id(), "Wait expired");
                    Err(Error::WaitExpired)
                }
            },
        }
    }

    /// Resolves a wait whose token has fired.
    fn settle_cancelled(&self, receiver: &mut oneshot::Receiver<Vec<Value>>) -> Result<Vec<Value>> {
        self.state.advance(WaitState::Armed, WaitState::Cancelled);
        self.handle.remove();

        match self.state.get() {
            // Matched before the token fired; the args were sent under the
            // same lock that recorded the match.
            WaitState::Matched => receiver
                .try_recv()
                .map(|args| self.complete(args))
                .map_err(|_| Error::WaitExpired),
            WaitState::Expired => Err(Error::WaitExpired),
            _ => Err(Error::WaitCancelled),
        }
    }

    /// Records a successful match.
    fn complete(&self, args: Vec<Value>) -> Vec<Value> {
        self.handle.remove();
        self.state.advance(WaitState::Matched, WaitState::Removed);
        trace!(id = %self.handle.id(), "Wait matched");
        args
    }
}

impl fmt::Debug for EventWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWait")
            .field("interceptor", &self.handle.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for EventWait {
    fn drop(&mut self) {
        if self.handle.remove() {
            trace!(id = %self.handle.id(), "Abandoned wait removed its interceptor");
        }
    }
}

// ============================================================================
// Frame Matching
// ============================================================================

/// Builds a matcher for `webSocketEvent` envelopes carrying a frame that
/// passes `filter`. Matches resolve with the frame arguments.
pub(crate) fn frame_matcher(
    filter: FrameFilter,
) -> impl Fn(&Envelope) -> MatchOutcome + Send + Sync + 'static {
    move |envelope: &Envelope| {
        let Ok(data) = WebSocketEventData::deserialize(&envelope.payload) else {
            return MatchOutcome::skip();
        };

        match data.parse_frame() {
            Some(frame) if filter.matches(data.event, &frame) => {
                MatchOutcome::with_args(frame.args())
            }
            _ => MatchOutcome::skip(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
