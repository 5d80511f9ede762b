//! The asynchronous executor.
//!
//! [`Dispatcher::submit`] never waits on the network: it registers a handle
//! and spawns one task on the runtime. The task acquires a pool lease, runs
//! the exchange through the [`Transport`], drops the lease and resolves the
//! handle. Cancelling a handle wakes the task, which drops its in-progress
//! work along with any lease or queued acquire before publishing Cancelled.

use crate::base::dispatcherror::{ConfigError, DispatchError, TimeoutPhase};
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::dispatch::callback::OutcomeCallback;
use crate::dispatch::handle::{HandleShared, RequestHandle, RequestId};
use crate::dispatch::outcome::Outcome;
use crate::http::request::{RequestDescriptor, RequestTimeouts};
use crate::http::response::HttpResponse;
use crate::http::transport::{ExchangeContext, HttpTransport, Transport};
use crate::socket::pool::{ConnectionPool, DEFAULT_MAX_PER_DESTINATION, DEFAULT_MAX_TOTAL};
use dashmap::DashMap;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// What [`Dispatcher::close`] does with requests still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Let them finish.
    #[default]
    Drain,
    /// Resolve them all to Cancelled.
    Cancel,
}

struct Inner {
    pool: ConnectionPool,
    transport: Arc<dyn Transport>,
    defaults: RequestTimeouts,
    shutdown: ShutdownMode,
    runtime: Handle,
    closed: RwLock<bool>,
    in_flight: DashMap<RequestId, Arc<HandleShared>>,
    next_id: AtomicU64,
    idle: Notify,
}

impl Inner {
    fn finish(&self, id: RequestId) {
        self.in_flight.remove(&id);
        self.idle.notify_waiters();
    }
}

/// Bounded-concurrency request dispatcher.
///
/// Cloning is cheap; clones share the pool, the transport and the set of
/// in-flight requests.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.inner.pool)
            .field("defaults", &self.inner.defaults)
            .field("shutdown", &self.inner.shutdown)
            .field("in_flight", &self.inner.in_flight.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Dispatcher with default caps, timeouts and the HTTP/1.1 transport.
    /// Must be called inside a tokio runtime.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn default_timeouts(&self) -> RequestTimeouts {
        self.inner.defaults
    }

    /// Submitted requests that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `request` for execution. Returns immediately.
    ///
    /// `callback` runs exactly once, when the request reaches its terminal
    /// state. Fails with [`DispatchError::ExecutorClosed`] once `close` has
    /// begun, or when the runtime it spawns onto has shut down.
    pub fn submit<C>(&self, request: RequestDescriptor, callback: C) -> Result<RequestHandle, DispatchError>
    where
        C: OutcomeCallback,
    {
        let closed = self.inner.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            tracing::debug!(url = %request.url(), "submit rejected, dispatcher closed");
            return Err(DispatchError::ExecutorClosed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(HandleShared::new(id, Arc::new(request), Box::new(callback)));
        self.inner.in_flight.insert(id, Arc::clone(&shared));
        tracing::trace!(
            request_id = id,
            destination = %shared.request().destination(),
            "request submitted"
        );

        let task = Task { inner: Arc::clone(&self.inner), shared: Arc::clone(&shared), started: false };
        self.inner.runtime.spawn(task.run());
        drop(closed);

        // A shut-down runtime drops the task inside `spawn`, unpolled.
        if !shared.settle_spawn() {
            tracing::debug!(request_id = id, "submit rejected, runtime shut down");
            return Err(DispatchError::ExecutorClosed);
        }

        Ok(RequestHandle::new(shared))
    }

    /// Submit every request with a clone of `callback`.
    ///
    /// Stops at the first rejected submission; handles already returned keep
    /// running.
    pub fn submit_all<I, C>(&self, requests: I, callback: C) -> Result<Vec<RequestHandle>, DispatchError>
    where
        I: IntoIterator<Item = RequestDescriptor>,
        C: OutcomeCallback + Clone,
    {
        requests
            .into_iter()
            .map(|request| self.submit(request, callback.clone()))
            .collect()
    }

    /// Stop accepting requests and wait for in-flight ones per the configured
    /// [`ShutdownMode`]. Calling it again is harmless.
    pub async fn close(&self) {
        self.close_with(self.inner.shutdown).await
    }

    pub async fn close_with(&self, mode: ShutdownMode) {
        {
            let mut closed = self.inner.closed.write().unwrap_or_else(PoisonError::into_inner);
            if !*closed {
                tracing::debug!(?mode, in_flight = self.inner.in_flight.len(), "dispatcher closing");
            }
            *closed = true;
        }

        if mode == ShutdownMode::Cancel {
            let pending: Vec<Arc<HandleShared>> =
                self.inner.in_flight.iter().map(|entry| Arc::clone(entry.value())).collect();
            for shared in pending {
                shared.request_cancel();
            }
        }

        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.in_flight.is_empty() {
                break;
            }
            notified.await;
        }
        tracing::debug!("dispatcher closed");
    }
}

/// One spawned request.
///
/// Dropping it unregisters the request. A task dropped before it published
/// (the runtime shut down under it) resolves the handle to Cancelled, unless
/// it was never polled during `submit`, which then reports the failure.
struct Task {
    inner: Arc<Inner>,
    shared: Arc<HandleShared>,
    started: bool,
}

impl Drop for Task {
    fn drop(&mut self) {
        let refused = !self.started && self.shared.settle_spawn();
        if !refused && !self.shared.is_published() {
            self.shared.claim();
            self.shared.publish(Outcome::Cancelled);
        }
        self.inner.finish(self.shared.id());
    }
}

impl Task {
    async fn run(mut self) {
        self.started = true;
        let work = AssertUnwindSafe(execute(&self.inner, &self.shared)).catch_unwind();

        let finished = tokio::select! {
            biased;
            _ = self.shared.cancelled() => None,
            result = work => Some(result),
        };

        // `work` is dropped here, and with it any lease or queued acquire.
        let outcome = match finished {
            Some(result) if self.shared.claim() => match result {
                Ok(result) => Outcome::from(result),
                Err(_) => {
                    tracing::error!(request_id = self.shared.id(), "transport panicked");
                    Outcome::Failed(DispatchError::Transport(NetError::ConnectionAborted))
                }
            },
            _ => Outcome::Cancelled,
        };
        self.shared.publish(outcome);
    }
}

async fn execute(inner: &Inner, shared: &HandleShared) -> Result<HttpResponse, DispatchError> {
    let request = shared.request();
    let destination = request.destination();
    let timeouts = request.timeouts().resolve(&inner.defaults);

    shared.load_state().set(LoadState::WaitingForAvailableSocket);
    let lease = match timeouts.acquire {
        Some(limit) => tokio::time::timeout(limit, inner.pool.acquire(destination))
            .await
            .map_err(|_| {
                tracing::debug!(request_id = shared.id(), destination = %destination, "no slot granted in time");
                DispatchError::PoolExhaustionTimeout { destination: destination.clone(), waited: limit }
            })?,
        None => inner.pool.acquire(destination).await,
    };
    tracing::trace!(request_id = shared.id(), lease = lease.id(), destination = %destination, "lease granted");

    let ctx = ExchangeContext {
        request_id: shared.id(),
        destination: destination.clone(),
        lease: lease.id(),
        connect_timeout: timeouts.connect,
        load_state: shared.load_state().clone(),
    };
    let exchange = inner.transport.execute(Arc::clone(request), ctx);

    let result = match timeouts.response {
        Some(limit) => match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout { phase: TimeoutPhase::Response, after: limit }),
        },
        None => exchange.await,
    };

    // The slot is free before anyone observes the outcome.
    drop(lease);
    result
}

/// Builder for [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    pool: Option<ConnectionPool>,
    max_total: Option<usize>,
    max_per_destination: Option<usize>,
    transport: Option<Arc<dyn Transport>>,
    timeouts: Option<RequestTimeouts>,
    shutdown: ShutdownMode,
    runtime: Option<Handle>,
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("max_total", &self.max_total)
            .field("max_per_destination", &self.max_per_destination)
            .field("timeouts", &self.timeouts)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl DispatcherBuilder {
    /// Use an existing pool. Takes precedence over the cap setters.
    pub fn pool(mut self, pool: ConnectionPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn max_total(mut self, max: usize) -> Self {
        self.max_total = Some(max);
        self
    }

    pub fn max_per_destination(mut self, max: usize) -> Self {
        self.max_per_destination = Some(max);
        self
    }

    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Defaults for requests that do not override a phase.
    pub fn timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown = mode;
        self
    }

    /// Spawn request tasks on this runtime instead of the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<Dispatcher, ConfigError> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => ConnectionPool::new(
                self.max_total.unwrap_or(DEFAULT_MAX_TOTAL),
                self.max_per_destination.unwrap_or(DEFAULT_MAX_PER_DESTINATION),
            )?,
        };
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };
        let transport = self.transport.unwrap_or_else(|| Arc::new(HttpTransport::new()));

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                pool,
                transport,
                defaults: self.timeouts.unwrap_or_else(RequestTimeouts::dispatcher_defaults),
                shutdown: self.shutdown,
                runtime,
                closed: RwLock::new(false),
                in_flight: DashMap::new(),
                next_id: AtomicU64::new(1),
                idle: Notify::new(),
            }),
        })
    }
}
