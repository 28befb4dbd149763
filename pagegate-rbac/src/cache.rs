//! Permission cache with request coalescing.
//!
//! The cache holds at most one [`CacheEntry`] per process: the snapshot for
//! the identity that was active when it was fetched. An entry is valid while
//! `now < expires_at` and its identity matches the caller's current identity.
//! Expiry is evaluated lazily on [`PermissionCache::get`]; there is no
//! background timer here (see [`crate::monitor`]).
//!
//! On a miss, exactly one fetch is started per identity. Concurrent callers
//! for the same identity await the same in-flight fetch and receive the same
//! `Arc<PermissionSnapshot>`. The fetch runs on its own task, so it resolves
//! even if every caller goes away.
//!
//! Entries are replaced whole (construct, then swap the `Arc`), never
//! mutated in place.

use crate::config::CacheConfig;
use crate::fallback::{FallbackPolicy, FetchOutcome};
use crate::signal::InvalidationBus;
use futures::future::{BoxFuture, FutureExt, Shared};
use pagegate_core::{FetchError, Identity, PermissionFetcher, PermissionSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

type SharedFetch = Shared<BoxFuture<'static, Arc<PermissionSnapshot>>>;

/// The cached snapshot and the identity it belongs to.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Arc<PermissionSnapshot>,
    pub identity_at_cache: Identity,
    pub expires_at: Instant,
    /// Served by the fallback policy after a failed fetch
    pub stale: bool,
}

impl CacheEntry {
    /// Valid iff unexpired and cached for `identity`.
    pub fn is_valid_for(&self, identity: &Identity, now: Instant) -> bool {
        now < self.expires_at && &self.identity_at_cache == identity
    }
}

/// Cache counters.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Fetches actually issued to the fetcher
    pub fetches: u64,
    /// Callers that joined an in-flight fetch
    pub coalesced: u64,
    pub fresh: u64,
    pub denied: u64,
    pub stale_served: u64,
    pub deny_all_served: u64,
    pub invalidations: u64,
    /// Results discarded because a fetch for another identity replaced them
    pub superseded: u64,
}

struct InFlight {
    identity: Identity,
    generation: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    entry: Option<Arc<CacheEntry>>,
    /// Last authoritative snapshot, kept across invalidation for fallback
    last_good: Option<Arc<PermissionSnapshot>>,
    in_flight: Option<InFlight>,
    generation: u64,
    last_installed: Option<Identity>,
}

impl CacheState {
    fn is_current(&self, generation: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
    }
}

struct Notifier {
    bus: InvalidationBus,
    origin: Uuid,
}

struct CacheInner {
    fetcher: Arc<dyn PermissionFetcher>,
    policy: FallbackPolicy,
    fetch_timeout: Duration,
    state: Mutex<CacheState>,
    stats: Mutex<CacheStats>,
    notifier: Option<Notifier>,
}

/// Shared handle to the permission cache. Clones share state.
#[derive(Clone)]
pub struct PermissionCache {
    inner: Arc<CacheInner>,
}

impl PermissionCache {
    pub fn new(fetcher: Arc<dyn PermissionFetcher>, config: &CacheConfig) -> Self {
        Self::build(fetcher, config, None)
    }

    /// Cache that publishes an [`InvalidationSignal`](crate::signal::InvalidationSignal)
    /// whenever it installs permissions for a new identity.
    pub fn with_notifier(
        fetcher: Arc<dyn PermissionFetcher>,
        config: &CacheConfig,
        bus: InvalidationBus,
        origin: Uuid,
    ) -> Self {
        Self::build(fetcher, config, Some(Notifier { bus, origin }))
    }

    fn build(
        fetcher: Arc<dyn PermissionFetcher>,
        config: &CacheConfig,
        notifier: Option<Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                policy: FallbackPolicy::new(config.ttl(), config.stale_retry()),
                fetch_timeout: config.fetch_timeout(),
                state: Mutex::new(CacheState::default()),
                stats: Mutex::new(CacheStats::default()),
                notifier,
            }),
        }
    }

    /// Snapshot for `identity`, fetching at most once per miss.
    ///
    /// Never fails: fetch failures are resolved by the fallback policy.
    pub async fn get(&self, identity: &Identity) -> Arc<PermissionSnapshot> {
        let fetch = {
            let mut state = self.inner.state.lock();

            if let Some(entry) = state
                .entry
                .as_ref()
                .filter(|entry| entry.is_valid_for(identity, Instant::now()))
            {
                self.inner.stats.lock().hits += 1;
                trace!(identity = %identity, stale = entry.stale, "Permission cache hit");
                return Arc::clone(&entry.snapshot);
            }

            self.inner.stats.lock().misses += 1;

            match state
                .in_flight
                .as_ref()
                .filter(|in_flight| &in_flight.identity == identity)
            {
                Some(in_flight) => {
                    self.inner.stats.lock().coalesced += 1;
                    debug!(identity = %identity, "Joining in-flight permission fetch");
                    in_flight.future.clone()
                }
                None => self.start_fetch(&mut state, identity),
            }
        };

        fetch.await
    }

    fn start_fetch(&self, state: &mut CacheState, identity: &Identity) -> SharedFetch {
        state.generation += 1;
        let generation = state.generation;

        if let Some(previous) = state.in_flight.as_ref() {
            debug!(
                previous = %previous.identity,
                identity = %identity,
                "Superseding in-flight fetch for another identity"
            );
        }

        debug!(
            identity = %identity,
            fetcher = self.inner.fetcher.fetcher_type(),
            "Permission cache miss, fetching"
        );
        self.inner.stats.lock().fetches += 1;

        let inner = Arc::clone(&self.inner);
        let task_identity = identity.clone();
        let task = tokio::spawn(async move { inner.run_fetch(task_identity, generation).await });

        let inner = Arc::clone(&self.inner);
        let fallback_identity = identity.clone();
        let future = async move {
            match task.await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!(identity = %fallback_identity, error = %e, "Permission fetch task failed");
                    inner.abandon(fallback_identity, generation)
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            identity: identity.clone(),
            generation,
            future: future.clone(),
        });

        future
    }

    /// Drop the cached entry; the next [`get`](Self::get) fetches.
    ///
    /// The last authoritative snapshot is kept for the fallback policy, and
    /// an in-flight fetch is left to complete.
    pub fn invalidate(&self) {
        let removed = self.inner.state.lock().entry.take();
        self.inner.stats.lock().invalidations += 1;
        if let Some(entry) = removed {
            debug!(identity = %entry.identity_at_cache, "Permission cache invalidated");
        }
    }

    /// Discard everything, including the fallback snapshot.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.entry = None;
        state.last_good = None;
        state.last_installed = None;
        debug!("Permission cache cleared");
    }

    /// The cached entry, valid or not.
    pub fn entry(&self) -> Option<Arc<CacheEntry>> {
        self.inner.state.lock().entry.clone()
    }

    /// Whatever the cache holds for `identity`, without fetching.
    pub fn peek(&self, identity: &Identity) -> Option<Arc<PermissionSnapshot>> {
        self.inner
            .state
            .lock()
            .entry
            .as_ref()
            .filter(|entry| &entry.identity_at_cache == identity)
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    /// Identity of the cached entry, or of the last authoritative snapshot.
    pub fn cached_identity(&self) -> Option<Identity> {
        let state = self.inner.state.lock();
        state
            .entry
            .as_ref()
            .map(|entry| entry.identity_at_cache.clone())
            .or_else(|| state.last_good.as_ref().map(|snapshot| snapshot.identity.clone()))
    }

    /// Whether the cached entry is a fallback served after a failure.
    pub fn is_stale(&self) -> bool {
        self.inner
            .state
            .lock()
            .entry
            .as_ref()
            .is_some_and(|entry| entry.stale)
    }

    /// Whether a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.lock().clone()
    }
}

impl CacheInner {
    async fn run_fetch(self: Arc<Self>, identity: Identity, generation: u64) -> Arc<PermissionSnapshot> {
        let result = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&identity)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::transport(format!(
                "permission fetch timed out after {:?}",
                self.fetch_timeout
            ))),
        };

        self.complete(&identity, generation, result)
    }

    /// Settle a fetch whose task died without completing.
    ///
    /// Nothing is cached, so the next `get()` starts a new fetch.
    fn abandon(&self, identity: Identity, generation: u64) -> Arc<PermissionSnapshot> {
        let mut state = self.state.lock();
        if state.is_current(generation) {
            state.in_flight = None;
            self.stats.lock().deny_all_served += 1;
        } else {
            self.stats.lock().superseded += 1;
        }
        Arc::new(PermissionSnapshot::deny_all(identity))
    }

    fn complete(
        &self,
        identity: &Identity,
        generation: u64,
        result: Result<PermissionSnapshot, FetchError>,
    ) -> Arc<PermissionSnapshot> {
        let mut state = self.state.lock();
        let resolution = self
            .policy
            .resolve(identity, result, state.last_good.as_ref());

        if !state.is_current(generation) {
            self.stats.lock().superseded += 1;
            debug!(identity = %identity, "Discarding result of superseded permission fetch");
            return resolution.snapshot;
        }
        state.in_flight = None;

        {
            let mut stats = self.stats.lock();
            match resolution.outcome {
                FetchOutcome::Fresh => stats.fresh += 1,
                FetchOutcome::Denied => stats.denied += 1,
                FetchOutcome::Stale => stats.stale_served += 1,
                FetchOutcome::DenyAll => stats.deny_all_served += 1,
            }
        }

        if let Some(lifetime) = resolution.cache_for {
            state.entry = Some(Arc::new(CacheEntry {
                snapshot: Arc::clone(&resolution.snapshot),
                identity_at_cache: identity.clone(),
                expires_at: Instant::now() + lifetime,
                stale: resolution.outcome == FetchOutcome::Stale,
            }));
        }

        if resolution.outcome.is_authoritative() {
            state.last_good = Some(Arc::clone(&resolution.snapshot));

            if state.last_installed.as_ref() != Some(identity) {
                let previous = state.last_installed.replace(identity.clone());
                info!(
                    previous = ?previous.as_ref().map(Identity::as_str),
                    identity = %identity,
                    roles = resolution.snapshot.roles.len(),
                    "Installed permissions for new identity"
                );
                if let Some(notifier) = &self.notifier {
                    notifier.bus.publish(notifier.origin, identity);
                }
            }
        }

        resolution.snapshot
    }
}
