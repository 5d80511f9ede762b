use crate::base::dispatcherror::PoolError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

/// Chromium's per-group default.
pub const DEFAULT_MAX_PER_DESTINATION: usize = 6;
/// Chromium's pool-wide default.
pub const DEFAULT_MAX_TOTAL: usize = 256;

pub type LeaseId = u64;

/// Identifies a connection group (scheme, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationKey {
    scheme: String,
    host: String,
    port: u16,
}

impl DestinationKey {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Port falls back to the scheme default when the URL has none.
    pub fn from_url(url: &Url) -> Option<Self> {
        Some(Self::new(url.scheme(), url.host_str()?, url.port_or_known_default()?))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// A queued `acquire` waiting for a slot.
struct Waiter {
    destination: DestinationKey,
    sender: oneshot::Sender<Lease>,
}

/// Per-destination counters.
#[derive(Default)]
struct Group {
    active: usize,
    peak: usize,
}

#[derive(Default)]
struct PoolState {
    total_active: usize,
    peak_total: usize,
    groups: HashMap<DestinationKey, Group>,
    waiters: VecDeque<Waiter>,
    outstanding: HashSet<LeaseId>,
}

struct PoolShared {
    max_total: usize,
    max_per_destination: usize,
    next_lease: AtomicU64,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Counters are updated without panicking paths, a poisoned lock still holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_room(&self, state: &PoolState, destination: &DestinationKey) -> bool {
        if state.total_active >= self.max_total {
            return false;
        }
        let active = state.groups.get(destination).map_or(0, |g| g.active);
        active < self.max_per_destination
    }

    /// Count a new slot and mint its lease. Caller checked `has_room`.
    fn grant(self: &Arc<Self>, state: &mut PoolState, destination: DestinationKey) -> Lease {
        let id = self.next_lease.fetch_add(1, Ordering::Relaxed);
        let group = state.groups.entry(destination.clone()).or_default();
        group.active += 1;
        group.peak = group.peak.max(group.active);
        state.total_active += 1;
        state.peak_total = state.peak_total.max(state.total_active);
        state.outstanding.insert(id);

        tracing::trace!(
            lease = id,
            destination = %destination,
            total_active = state.total_active,
            "lease granted"
        );

        Lease {
            id,
            destination,
            pool: Arc::clone(self),
            released: AtomicBool::new(false),
        }
    }

    fn uncount(&self, state: &mut PoolState, id: LeaseId, destination: &DestinationKey) {
        if !state.outstanding.remove(&id) {
            return;
        }
        if let Some(group) = state.groups.get_mut(destination) {
            group.active = group.active.saturating_sub(1);
        }
        state.total_active = state.total_active.saturating_sub(1);
    }

    /// Hand freed capacity to queued waiters, oldest first.
    fn grant_waiters(self: &Arc<Self>, state: &mut PoolState) {
        let mut i = 0;
        while i < state.waiters.len() && state.total_active < self.max_total {
            if state.waiters[i].sender.is_closed() {
                // Acquirer gave up (timeout or cancellation)
                state.waiters.remove(i);
                continue;
            }
            if !self.has_room(state, &state.waiters[i].destination) {
                i += 1;
                continue;
            }
            let Some(waiter) = state.waiters.remove(i) else {
                break;
            };
            let lease = self.grant(state, waiter.destination);
            if let Err(lease) = waiter.sender.send(lease) {
                // Receiver vanished between the check and the send
                lease.released.store(true, Ordering::Release);
                self.uncount(state, lease.id, &lease.destination);
            }
        }
    }

    fn return_slot(self: &Arc<Self>, id: LeaseId, destination: &DestinationKey) {
        let mut state = self.lock();
        self.uncount(&mut state, id, destination);
        tracing::trace!(
            lease = id,
            destination = %destination,
            total_active = state.total_active,
            "lease released"
        );
        self.grant_waiters(&mut state);
    }
}

/// The right to use one connection slot for one destination.
///
/// Dropping a lease returns its slot; [`ConnectionPool::release`] does the
/// same explicitly and reports a second release as an error.
pub struct Lease {
    id: LeaseId,
    destination: DestinationKey,
    pool: Arc<PoolShared>,
    released: AtomicBool,
}

impl Lease {
    pub fn id(&self) -> LeaseId {
        self.id
    }

    pub fn destination(&self) -> &DestinationKey {
        &self.destination
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.pool.return_slot(self.id, &self.destination);
        }
    }
}

/// Snapshot of one destination's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DestinationStats {
    pub active: usize,
    pub peak: usize,
}

/// Snapshot of the pool counters.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub max_total: usize,
    pub max_per_destination: usize,
    pub total_active: usize,
    pub peak_total: usize,
    pub pending: usize,
    pub destinations: HashMap<DestinationKey, DestinationStats>,
}

impl PoolStats {
    /// Highest concurrent lease count seen for any single destination.
    pub fn peak_per_destination(&self) -> usize {
        self.destinations.values().map(|d| d.peak).max().unwrap_or(0)
    }
}

/// Bounds concurrent connections globally and per destination.
///
/// `acquire` suspends until both caps allow another lease. Waiters are served
/// in arrival order among those whose destination has room, so a busy
/// destination never starves the others.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_total", &self.shared.max_total)
            .field("max_per_destination", &self.shared.max_per_destination)
            .field("total_active", &self.active_count())
            .finish()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::from_valid_limits(DEFAULT_MAX_TOTAL, DEFAULT_MAX_PER_DESTINATION)
    }
}

impl ConnectionPool {
    /// Create a pool. Both caps must be positive and `max_per_destination <= max_total`.
    pub fn new(max_total: usize, max_per_destination: usize) -> Result<Self, PoolError> {
        if max_total == 0 || max_per_destination == 0 || max_per_destination > max_total {
            return Err(PoolError::InvalidLimits { max_total, max_per_destination });
        }
        Ok(Self::from_valid_limits(max_total, max_per_destination))
    }

    fn from_valid_limits(max_total: usize, max_per_destination: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                max_total,
                max_per_destination,
                next_lease: AtomicU64::new(1),
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    pub fn max_total(&self) -> usize {
        self.shared.max_total
    }

    pub fn max_per_destination(&self) -> usize {
        self.shared.max_per_destination
    }

    /// Wait for a slot to `destination`.
    ///
    /// Cancel-safe: dropping the returned future before it completes leaves no
    /// slot behind. A lease that was granted concurrently with the drop is
    /// returned to the pool by its own `Drop`.
    pub async fn acquire(&self, destination: &DestinationKey) -> Lease {
        loop {
            let rx = {
                let mut state = self.shared.lock();
                if self.shared.has_room(&state, destination) {
                    return self.shared.grant(&mut state, destination.clone());
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { destination: destination.clone(), sender: tx });
                tracing::debug!(
                    destination = %destination,
                    pending = state.waiters.len(),
                    "pool limit reached, request queued"
                );
                rx
            };

            // The sender is only dropped unsent when the waiter is discarded; queue again.
            if let Ok(lease) = rx.await {
                return lease;
            }
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub async fn acquire_timeout(
        &self,
        destination: &DestinationKey,
        timeout: Duration,
    ) -> Result<Lease, PoolError> {
        tokio::time::timeout(timeout, self.acquire(destination))
            .await
            .map_err(|_| PoolError::AcquireTimeout { destination: destination.clone(), waited: timeout })
    }

    /// Grant a lease only if one is free right now.
    pub fn try_acquire(&self, destination: &DestinationKey) -> Option<Lease> {
        let mut state = self.shared.lock();
        if self.shared.has_room(&state, destination) {
            Some(self.shared.grant(&mut state, destination.clone()))
        } else {
            None
        }
    }

    /// Return a lease's slot to the pool.
    ///
    /// Releasing the same lease twice is a bug in the caller and fails with
    /// [`PoolError::DoubleRelease`] without touching any counter.
    pub fn release(&self, lease: &Lease) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&lease.pool, &self.shared) {
            return Err(PoolError::ForeignLease { lease: lease.id });
        }
        if lease.released.swap(true, Ordering::AcqRel) {
            tracing::error!(lease = lease.id, destination = %lease.destination, "lease released twice");
            return Err(PoolError::DoubleRelease { lease: lease.id });
        }
        self.shared.return_slot(lease.id, &lease.destination);
        Ok(())
    }

    /// Get total active lease count.
    pub fn active_count(&self) -> usize {
        self.shared.lock().total_active
    }

    /// Active leases for one destination.
    pub fn active_for(&self, destination: &DestinationKey) -> usize {
        self.shared.lock().groups.get(destination).map_or(0, |g| g.active)
    }

    /// Acquirers currently queued (abandoned waiters excluded).
    pub fn pending_count(&self) -> usize {
        self.shared.lock().waiters.iter().filter(|w| !w.sender.is_closed()).count()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            max_total: self.shared.max_total,
            max_per_destination: self.shared.max_per_destination,
            total_active: state.total_active,
            peak_total: state.peak_total,
            pending: state.waiters.iter().filter(|w| !w.sender.is_closed()).count(),
            destinations: state
                .groups
                .iter()
                .map(|(k, g)| (k.clone(), DestinationStats { active: g.active, peak: g.peak }))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(host: &str) -> DestinationKey {
        DestinationKey::new("http", host, 80)
    }

    #[test]
    fn test_destination_from_url_defaults_port() {
        let url = Url::parse("https://Example.COM/path?q=1").unwrap();
        let key = DestinationKey::from_url(&url).unwrap();
        assert_eq!(key.host(), "example.com");
        assert_eq!(key.port(), 443);
        assert_eq!(key.to_string(), "https://example.com:443");
    }

    #[test]
    fn test_destination_distinguishes_port() {
        let a = DestinationKey::from_url(&Url::parse("http://h:8080/").unwrap()).unwrap();
        let b = DestinationKey::from_url(&Url::parse("http://h/").unwrap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        assert!(matches!(ConnectionPool::new(0, 1), Err(PoolError::InvalidLimits { .. })));
        assert!(matches!(ConnectionPool::new(4, 0), Err(PoolError::InvalidLimits { .. })));
        assert!(matches!(ConnectionPool::new(2, 3), Err(PoolError::InvalidLimits { .. })));
        assert!(ConnectionPool::new(4, 4).is_ok());
    }

    #[test]
    fn test_per_destination_cap() {
        let pool = ConnectionPool::new(10, 2).unwrap();
        let a1 = pool.try_acquire(&key("a")).unwrap();
        let _a2 = pool.try_acquire(&key("a")).unwrap();
        assert!(pool.try_acquire(&key("a")).is_none());
        // Other destinations are unaffected
        assert!(pool.try_acquire(&key("b")).is_some());

        drop(a1);
        assert!(pool.try_acquire(&key("a")).is_some());
    }

    #[test]
    fn test_global_cap() {
        let pool = ConnectionPool::new(2, 2).unwrap();
        let _a = pool.try_acquire(&key("a")).unwrap();
        let _b = pool.try_acquire(&key("b")).unwrap();
        assert!(pool.try_acquire(&key("c")).is_none());
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_double_release() {
        let pool = ConnectionPool::new(4, 4).unwrap();
        let lease = pool.try_acquire(&key("a")).unwrap();
        let other = pool.try_acquire(&key("a")).unwrap();

        pool.release(&lease).unwrap();
        assert_eq!(
            pool.release(&lease),
            Err(PoolError::DoubleRelease { lease: lease.id() })
        );
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.active_for(&key("a")), 1);

        drop(lease);
        assert_eq!(pool.active_count(), 1, "drop after release is a no-op");
        drop(other);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_foreign_lease_rejected() {
        let pool = ConnectionPool::new(4, 4).unwrap();
        let other_pool = ConnectionPool::new(4, 4).unwrap();
        let lease = other_pool.try_acquire(&key("a")).unwrap();
        assert!(matches!(pool.release(&lease), Err(PoolError::ForeignLease { .. })));
        assert_eq!(other_pool.active_count(), 1);
    }

    #[tokio::test]
    async fn test_waiter_woken_on_release() {
        let pool = ConnectionPool::new(1, 1).unwrap();
        let held = pool.acquire(&key("a")).await;

        let waiter_pool = pool.clone();
        let waiter = tokio::spawn(async move { waiter_pool.acquire(&key("a")).await.id() });

        while pool.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        pool.release(&held).unwrap();

        let id = waiter.await.unwrap();
        assert_ne!(id, held.id());
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_skipped() {
        let pool = ConnectionPool::new(1, 1).unwrap();
        let held = pool.acquire(&key("a")).await;

        let result = pool.acquire_timeout(&key("a"), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(PoolError::AcquireTimeout { .. })));
        assert_eq!(pool.pending_count(), 0);

        drop(held);
        assert_eq!(pool.active_count(), 0, "slot not handed to the abandoned waiter");
        assert!(pool.try_acquire(&key("a")).is_some());
    }

    #[tokio::test]
    async fn test_stats_track_peaks() {
        let pool = ConnectionPool::new(8, 3).unwrap();
        let leases: Vec<_> = (0..3).map(|_| pool.try_acquire(&key("a")).unwrap()).collect();
        drop(leases);

        let stats = pool.stats();
        assert_eq!(stats.total_active, 0);
        assert_eq!(stats.peak_total, 3);
        assert_eq!(stats.peak_per_destination(), 3);
        assert_eq!(stats.destinations[&key("a")], DestinationStats { active: 0, peak: 3 });
    }
}
