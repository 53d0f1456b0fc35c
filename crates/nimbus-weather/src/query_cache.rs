//! Keyed, time-bounded query cache.
//!
//! Entries are fresh until `stale_after`, usable but revalidated in the
//! background until `expires_after`, and evicted after that. Concurrent
//! lookups for one key share a single in-flight request.
//!
//! In-flight requests are [`Shared`] futures. The cache only keeps a weak
//! handle to each, so a request whose callers all went away is dropped
//! without ever writing to the cache.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use nimbus_core::config::MAX_CACHE_MINUTES;
use nimbus_core::{CacheConfig, FreshnessConfig, Units};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::types::{CanonicalForecast, CanonicalWeather, Fetched, GeoPoint};

const EVENT_CAPACITY: usize = 64;

/// Which query an entry answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Current,
    Forecast,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Current => "current",
            QueryKind::Forecast => "forecast",
        }
    }
}

/// Cache identity: operation, rounded coordinates and canonical units.
///
/// Display metadata on the [`GeoPoint`] is not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub kind: QueryKind,
    pub lat: i32,
    pub lon: i32,
    pub units: Units,
}

impl QueryKey {
    pub fn new(kind: QueryKind, point: &GeoPoint, units: Units) -> Self {
        let (lat, lon) = point.rounded();
        Self {
            kind,
            lat,
            lon,
            units,
        }
    }

    pub fn current(point: &GeoPoint, units: Units) -> Self {
        Self::new(QueryKind::Current, point, units)
    }

    pub fn forecast(point: &GeoPoint, units: Units) -> Self {
        Self::new(QueryKind::Forecast, point, units)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:.4},{:.4}:{}",
            self.kind.as_str(),
            f64::from(self.lat) / 10_000.0,
            f64::from(self.lon) / 10_000.0,
            self.units
        )
    }
}

/// A cached result
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Current(Fetched<CanonicalWeather>),
    Forecast(Fetched<CanonicalForecast>),
}

impl QueryValue {
    pub fn is_from_snapshot(&self) -> bool {
        match self {
            QueryValue::Current(f) => f.is_from_snapshot(),
            QueryValue::Forecast(f) => f.is_from_snapshot(),
        }
    }

    pub fn into_current(self) -> Option<Fetched<CanonicalWeather>> {
        match self {
            QueryValue::Current(f) => Some(f),
            QueryValue::Forecast(_) => None,
        }
    }

    pub fn into_forecast(self) -> Option<Fetched<CanonicalForecast>> {
        match self {
            QueryValue::Forecast(f) => Some(f),
            QueryValue::Current(_) => None,
        }
    }
}

/// How long an entry stays fresh, and how long it is kept at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub stale_after: Duration,
    pub expires_after: Duration,
}

impl FreshnessPolicy {
    /// Lifetimes are capped at [`MAX_CACHE_MINUTES`].
    pub fn from_minutes(stale: u64, cache: u64) -> Self {
        let minutes = |m: u64| Duration::from_secs(m.min(MAX_CACHE_MINUTES) * 60);
        let stale_after = minutes(stale);
        Self {
            stale_after,
            // An entry never expires before it goes stale
            expires_after: minutes(cache).max(stale_after),
        }
    }
}

impl From<&FreshnessConfig> for FreshnessPolicy {
    fn from(config: &FreshnessConfig) -> Self {
        Self::from_minutes(config.stale_minutes, config.cache_minutes)
    }
}

/// Per-kind freshness policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicies {
    pub current: FreshnessPolicy,
    pub forecast: FreshnessPolicy,
}

impl Default for CachePolicies {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CachePolicies {
    fn from(config: &CacheConfig) -> Self {
        Self {
            current: FreshnessPolicy::from(&config.current),
            forecast: FreshnessPolicy::from(&config.forecast),
        }
    }
}

impl CachePolicies {
    pub fn for_kind(&self, kind: QueryKind) -> FreshnessPolicy {
        match kind {
            QueryKind::Current => self.current,
            QueryKind::Forecast => self.forecast,
        }
    }
}

/// A stored value with its lifetime markers.
///
/// `fetched_at <= stale_after <= expires_after` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub value: QueryValue,
    pub fetched_at: Instant,
    pub stale_after: Instant,
    pub expires_after: Instant,
}

impl CacheEntry {
    fn new(key: QueryKey, value: QueryValue, policy: FreshnessPolicy, now: Instant) -> Self {
        // Snapshot-served data is revalidated on the next lookup
        let deadline = |after: Duration| now.checked_add(after).unwrap_or(now);
        let stale_after = if value.is_from_snapshot() {
            now
        } else {
            deadline(policy.stale_after)
        };
        Self {
            key,
            value,
            fetched_at: now,
            stale_after,
            expires_after: deadline(policy.expires_after).max(stale_after),
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.stale_after
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_after
    }
}

/// Notifications about cache contents
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A fetch completed and its value was stored
    Updated(QueryKey),
    Invalidated(QueryKey),
    Removed(QueryKey),
    /// A background refresh failed; the stale value is kept
    RefreshFailed { key: QueryKey, error: FetchError },
    Cleared,
}

type FetchResult = Result<QueryValue, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct InFlight {
    id: u64,
    handle: WeakShared<BoxFuture<'static, FetchResult>>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, CacheEntry>,
    in_flight: HashMap<QueryKey, InFlight>,
}

struct Inner {
    state: Mutex<State>,
    policies: CachePolicies,
    events: broadcast::Sender<CacheEvent>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Record the outcome of in-flight request `id`.
    fn complete(&self, key: &QueryKey, id: u64, cancel: &CancellationToken, result: &FetchResult, background: bool) {
        let mut state = self.state.lock();

        let current = state.in_flight.get(key).is_some_and(|f| f.id == id);
        if current {
            state.in_flight.remove(key);
        }
        if cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(value) if value.is_from_snapshot() && Self::holds_network_value(&state, key) => {
                // The provider failed; the network value already cached is better
                drop(state);
                tracing::warn!("Refresh of {} fell back to the snapshot, keeping cached value", key);
                self.emit(CacheEvent::RefreshFailed {
                    key: key.clone(),
                    error: FetchError::Transient {
                        status: None,
                        message: "provider unreachable, only offline data available".into(),
                    },
                });
            }
            Ok(value) => {
                let policy = self.policies.for_kind(key.kind);
                let entry = CacheEntry::new(key.clone(), value.clone(), policy, Instant::now());
                state.entries.insert(key.clone(), entry);
                drop(state);

                tracing::debug!("Cached {}", key);
                self.emit(CacheEvent::Updated(key.clone()));
            }
            Err(error) if background => {
                drop(state);
                tracing::warn!("Background refresh of {} failed: {}", key, error);
                self.emit(CacheEvent::RefreshFailed {
                    key: key.clone(),
                    error: error.clone(),
                });
            }
            Err(_) => {}
        }
    }

    fn holds_network_value(state: &State, key: &QueryKey) -> bool {
        state
            .entries
            .get(key)
            .is_some_and(|entry| !entry.value.is_from_snapshot())
    }
}

/// Shared handle to the cache
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("QueryCache")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .field("policies", &self.inner.policies)
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CachePolicies::default())
    }
}

impl QueryCache {
    pub fn new(policies: CachePolicies) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                policies,
                events,
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn policies(&self) -> &CachePolicies {
        &self.inner.policies
    }

    /// Look up `key`, fetching with `fetch` when needed.
    ///
    /// - fresh entry: returned as-is
    /// - stale entry: returned as-is, and one background refresh is started
    ///   unless a request for the key is already in flight
    /// - missing or expired: joins the in-flight request for the key, or
    ///   starts one and waits for it
    ///
    /// `fetch` receives the request's own cancellation token. Cancelling
    /// `cancel` abandons this caller's wait only; the request keeps running
    /// while anyone else still waits on it.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: QueryKey,
        cancel: &CancellationToken,
        fetch: F,
    ) -> Result<QueryValue, FetchError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let now = Instant::now();

        let shared = {
            let mut state = self.inner.state.lock();

            match state.entries.get(&key) {
                Some(entry) if entry.is_fresh(now) => {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(entry.value.clone());
                }
                Some(entry) if !entry.is_expired(now) => {
                    let value = entry.value.clone();
                    tracing::debug!("Stale hit for {}", key);
                    if let Some(refresh) = self.start_locked(&mut state, &key, fetch, true) {
                        tokio::spawn(async move {
                            let _ = refresh.await;
                        });
                    }
                    return Ok(value);
                }
                Some(_) => {
                    tracing::debug!("Evicting expired entry {}", key);
                    state.entries.remove(&key);
                }
                None => {}
            }

            match Self::join_locked(&state, &key) {
                Some(shared) => {
                    tracing::debug!("Joining in-flight request for {}", key);
                    shared
                }
                None => match self.start_locked(&mut state, &key, fetch, false) {
                    Some(shared) => shared,
                    None => return Err(FetchError::Cancelled),
                },
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = shared => result,
        }
    }

    fn join_locked(state: &State, key: &QueryKey) -> Option<SharedFetch> {
        state
            .in_flight
            .get(key)
            .filter(|f| !f.cancel.is_cancelled())
            .and_then(|f| f.handle.upgrade())
    }

    /// Register a new in-flight request for `key` unless a live one exists.
    ///
    /// Returns the strong handle when a request was started.
    fn start_locked<F, Fut>(
        &self,
        state: &mut State,
        key: &QueryKey,
        fetch: F,
        background: bool,
    ) -> Option<SharedFetch>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        if Self::join_locked(state, key).is_some() || self.inner.shutdown.is_cancelled() {
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.shutdown.child_token();
        let inner = Arc::downgrade(&self.inner);
        let request_key = key.clone();
        let request_token = token.clone();

        let future: BoxFuture<'static, FetchResult> = async move {
            let result = tokio::select! {
                _ = request_token.cancelled() => Err(FetchError::Cancelled),
                result = fetch(request_token.clone()) => result,
            };
            let result = if request_token.is_cancelled() {
                Err(FetchError::Cancelled)
            } else {
                result
            };

            if let Some(inner) = inner.upgrade() {
                inner.complete(&request_key, id, &request_token, &result, background);
            }
            result
        }
        .boxed();

        let shared = future.shared();
        let handle = shared.downgrade()?;
        state.in_flight.insert(
            key.clone(),
            InFlight {
                id,
                handle,
                cancel: token,
            },
        );
        Some(shared)
    }

    /// Unexpired cached value regardless of freshness, without fetching.
    pub fn peek(&self, key: &QueryKey) -> Option<QueryValue> {
        let now = Instant::now();
        let state = self.inner.state.lock();
        state
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    /// Full entry for `key`, expired or not.
    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.state.lock().entries.get(key).cloned()
    }

    /// Mark `key` stale so the next lookup revalidates. The value stays.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let now = Instant::now();
        let found = {
            let mut state = self.inner.state.lock();
            match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.stale_after = entry.stale_after.min(now);
                    true
                }
                None => false,
            }
        };

        if found {
            tracing::debug!("Invalidated {}", key);
            self.inner.emit(CacheEvent::Invalidated(key.clone()));
        }
        found
    }

    /// Invalidate every entry.
    pub fn invalidate_all(&self) {
        let now = Instant::now();
        let keys: Vec<QueryKey> = {
            let mut state = self.inner.state.lock();
            state
                .entries
                .values_mut()
                .map(|entry| {
                    entry.stale_after = entry.stale_after.min(now);
                    entry.key.clone()
                })
                .collect()
        };

        for key in keys {
            self.inner.emit(CacheEvent::Invalidated(key));
        }
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.inner.state.lock().entries.remove(key).is_some();
        if removed {
            self.inner.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Drop every entry. In-flight requests are left running.
    pub fn clear(&self) {
        self.inner.state.lock().entries.clear();
        self.inner.emit(CacheEvent::Cleared);
    }

    /// Evict expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<QueryKey> = {
            let mut state = self.inner.state.lock();
            let expired: Vec<QueryKey> = state
                .entries
                .values()
                .filter(|e| e.is_expired(now))
                .map(|e| e.key.clone())
                .collect();
            for key in &expired {
                state.entries.remove(key);
            }
            expired
        };

        if !expired.is_empty() {
            tracing::debug!("Purged {} expired cache entries", expired.len());
        }
        let count = expired.len();
        for key in expired {
            self.inner.emit(CacheEvent::Removed(key));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a request for `key` is currently running
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        Self::join_locked(&self.inner.state.lock(), key).is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel the in-flight request for `key`. Its waiters receive
    /// [`FetchError::Cancelled`] and nothing is written.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        let in_flight = self.inner.state.lock().in_flight.remove(key);
        match in_flight {
            Some(f) => {
                tracing::debug!("Cancelled request for {}", key);
                f.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let in_flight: Vec<InFlight> = self
            .inner
            .state
            .lock()
            .in_flight
            .drain()
            .map(|(_, f)| f)
            .collect();
        for f in in_flight {
            f.cancel.cancel();
        }
    }

    /// Periodically purge expired entries until [`shutdown`](Self::shutdown).
    ///
    /// Calling it again while a sweeper runs has no effect.
    pub fn start_sweeper(&self, every: Duration) {
        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = inner.upgrade() else { break };
                QueryCache { inner }.purge_expired();
            }
            tracing::debug!("Cache sweeper stopped");
        }));
        tracing::info!("Cache sweeper started (every {:?})", every);
    }

    /// Stop the sweeper and cancel every in-flight request. Cached values
    /// stay readable; no new requests are started.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.cancel_all();
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
        }
        tracing::info!("Query cache shut down");
    }
}
