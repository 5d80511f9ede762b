//! Per-request handles.
//!
//! A handle moves from Pending to exactly one terminal [`Outcome`]. The first
//! transition claims an atomic flag; any later one (a completion racing a
//! cancel) is discarded. Only the request's own task publishes: a cancel
//! claims the flag and wakes the task, which drops its pool wait or lease
//! before running the callback.

use crate::base::loadstate::{LoadState, LoadStateCell};
use crate::dispatch::callback::OutcomeCallback;
use crate::dispatch::outcome::{Outcome, OutcomeKind};
use crate::http::request::RequestDescriptor;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

pub type RequestId = u64;

pub(crate) struct HandleShared {
    id: RequestId,
    request: Arc<RequestDescriptor>,
    callback: Box<dyn OutcomeCallback>,
    claimed: AtomicBool,
    cancel: Notify,
    spawn_settled: AtomicBool,
    outcome: watch::Sender<Option<Outcome>>,
    load_state: LoadStateCell,
}

impl HandleShared {
    pub(crate) fn new(
        id: RequestId,
        request: Arc<RequestDescriptor>,
        callback: Box<dyn OutcomeCallback>,
    ) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            id,
            request,
            callback,
            claimed: AtomicBool::new(false),
            cancel: Notify::new(),
            spawn_settled: AtomicBool::new(false),
            outcome,
            load_state: LoadStateCell::new(),
        }
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn request(&self) -> &Arc<RequestDescriptor> {
        &self.request
    }

    pub(crate) fn load_state(&self) -> &LoadStateCell {
        &self.load_state
    }

    pub(crate) fn is_published(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Take the single terminal transition. Returns `false` if it was taken.
    pub(crate) fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the transition for Cancelled and wake the task. The outcome is
    /// published by the task once it has let go of the pool.
    pub(crate) fn request_cancel(&self) -> bool {
        if !self.claim() {
            tracing::trace!(request_id = self.id, "cancel after terminal transition ignored");
            return false;
        }
        tracing::trace!(request_id = self.id, "cancel requested");
        // Stores a permit if the task is not waiting yet.
        self.cancel.notify_one();
        true
    }

    /// Resolves once a cancel has claimed the transition.
    pub(crate) async fn cancelled(&self) {
        self.cancel.notified().await
    }

    /// Decide the race between `submit` returning and the runtime dropping an
    /// unpolled task. The first caller wins.
    pub(crate) fn settle_spawn(&self) -> bool {
        self.spawn_settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Run the callback, then make `outcome` visible to waiters.
    ///
    /// Callers must hold the claim (or have seen a cancel take it). A
    /// panicking callback is logged and does not prevent publication.
    pub(crate) fn publish(&self, outcome: Outcome) {
        self.load_state.set(LoadState::Done);
        tracing::debug!(
            request_id = self.id,
            url = %self.request.url(),
            kind = ?outcome.kind(),
            "request finished"
        );

        let callback = AssertUnwindSafe(|| self.callback.on_outcome(&self.request, &outcome));
        if catch_unwind(callback).is_err() {
            tracing::error!(request_id = self.id, "outcome callback panicked");
        }

        self.outcome.send_replace(Some(outcome));
    }

    fn snapshot(&self) -> Option<Outcome> {
        self.outcome.borrow().clone()
    }

    async fn wait(&self) -> Outcome {
        let mut rx = self.outcome.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Outcome::Cancelled;
            }
        }
    }
}

/// Caller-visible token for one submitted request.
pub struct RequestHandle {
    shared: Arc<HandleShared>,
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.shared.id)
            .field("url", &self.shared.request.url().as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Coarse handle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Terminal(OutcomeKind),
}

impl RequestHandle {
    pub(crate) fn new(shared: Arc<HandleShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> RequestId {
        self.shared.id
    }

    pub fn request(&self) -> &Arc<RequestDescriptor> {
        &self.shared.request
    }

    /// Which phase the request is in.
    pub fn load_state(&self) -> LoadState {
        self.shared.load_state.get()
    }

    pub fn state(&self) -> HandleState {
        match self.shared.snapshot() {
            Some(outcome) => HandleState::Terminal(outcome.kind()),
            None => HandleState::Pending,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shared.snapshot().is_some()
    }

    /// The terminal outcome, if reached.
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.shared.snapshot()
    }

    /// Cancel the request. Returns `false` if it had already finished.
    ///
    /// The outcome turns Cancelled once the request's task has given up its
    /// pool slot or its place in the queue; `wait` observes both together.
    pub fn cancel(&self) -> bool {
        self.shared.request_cancel()
    }

    /// A clonable handle that can only cancel, for use from other tasks.
    pub fn canceller(&self) -> Canceller {
        Canceller { shared: Arc::clone(&self.shared) }
    }

    /// Wait for the terminal outcome.
    pub async fn wait(&self) -> Outcome {
        self.shared.wait().await
    }
}

/// Cancels one request from anywhere.
#[derive(Clone)]
pub struct Canceller {
    shared: Arc<HandleShared>,
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller").field("id", &self.shared.id).finish()
    }
}

impl Canceller {
    pub fn cancel(&self) -> bool {
        self.shared.request_cancel()
    }
}
