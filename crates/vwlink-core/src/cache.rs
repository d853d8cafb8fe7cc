// ── Cached request layer ──
//
// Freshness-windowed cache with per-key single-flight. Concurrent callers
// for the same key await one shared future; the shared future itself
// stores the result, so the entry lands even if the caller that started
// the fetch is dropped. Invalidation bumps a per-key generation so a fetch
// that was in flight at the time cannot repopulate the entry afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::FetchError;
use crate::model::ResourceKey;

/// How old a cached payload may be and still be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Window(Duration),
    /// Valid until explicitly invalidated.
    Lifetime,
}

/// Where a [`RequestCache::fetch_with_source`] result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A stored entry was fresh enough.
    Cache,
    /// A load ran, started here or joined while in flight.
    Network,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant, freshness: Freshness) -> bool {
        match freshness {
            Freshness::Lifetime => true,
            Freshness::Window(max_age) => now.saturating_duration_since(self.fetched_at) < max_age,
        }
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

struct InFlight<V> {
    generation: u64,
    fetch: SharedFetch<V>,
}

struct CacheInner<V> {
    entries: DashMap<ResourceKey, CacheEntry<V>>,
    in_flight: DashMap<ResourceKey, InFlight<V>>,
    generations: DashMap<ResourceKey, u64>,
}

impl<V: Clone> CacheInner<V> {
    fn generation(&self, key: &ResourceKey) -> u64 {
        self.generations.get(key).map_or(0, |g| *g)
    }

    fn fresh(&self, key: &ResourceKey, freshness: Freshness) -> Option<V> {
        let entry = self.entries.get(key)?;
        entry
            .is_fresh(Instant::now(), freshness)
            .then(|| entry.payload.clone())
    }

    fn complete(&self, key: &ResourceKey, generation: u64, result: &Result<V, FetchError>) {
        match result {
            Ok(payload) if self.generation(key) == generation => {
                self.entries.insert(
                    key.clone(),
                    CacheEntry {
                        payload: payload.clone(),
                        fetched_at: Instant::now(),
                    },
                );
            }
            Ok(_) => debug!(%key, "discarding result of invalidated fetch"),
            // A failed fetch leaves the previous entry in place.
            Err(e) => debug!(%key, error = %e, "fetch failed"),
        }
        self.in_flight
            .remove_if(key, |_, flight| flight.generation == generation);
    }
}

/// Cache of vendor payloads keyed by [`ResourceKey`].
///
/// Cheaply cloneable; clones share the same entries.
pub struct RequestCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for RequestCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for RequestCache<V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                generations: DashMap::new(),
            }),
        }
    }
}

impl<V> RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached payload if it is fresh enough, otherwise run `load`.
    ///
    /// At most one `load` runs per key at a time; callers arriving while it
    /// runs receive its result instead of starting their own. A failure is
    /// returned to every waiter and leaves any earlier entry untouched.
    pub async fn fetch<F, Fut>(
        &self,
        key: ResourceKey,
        freshness: Freshness,
        load: F,
    ) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        self.fetch_with_source(key, freshness, load)
            .await
            .map(|(payload, _)| payload)
    }

    /// Like [`fetch`](Self::fetch), also telling whether `load` ran.
    pub async fn fetch_with_source<F, Fut>(
        &self,
        key: ResourceKey,
        freshness: Freshness,
        load: F,
    ) -> Result<(V, Source), FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        if let Some(hit) = self.inner.fresh(&key, freshness) {
            trace!(%key, "cache hit");
            return Ok((hit, Source::Cache));
        }

        let fetch = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(flight) => {
                trace!(%key, "joining in-flight fetch");
                flight.get().fetch.clone()
            }
            Entry::Vacant(slot) => {
                // A fetch may have finished between the check above and
                // taking the slot.
                if let Some(hit) = self.inner.fresh(&key, freshness) {
                    return Ok((hit, Source::Cache));
                }
                let generation = self.inner.generation(&key);
                let inner = Arc::clone(&self.inner);
                let task_key = key.clone();
                let request = load();
                let fetch = async move {
                    let result = request.await;
                    inner.complete(&task_key, generation, &result);
                    result
                }
                .boxed()
                .shared();
                slot.insert(InFlight {
                    generation,
                    fetch: fetch.clone(),
                });
                trace!(%key, "cache miss, fetching");
                fetch
            }
        };

        fetch.await.map(|payload| (payload, Source::Network))
    }

    /// Force the next `fetch` for `key` to go to the network.
    pub fn invalidate(&self, key: &ResourceKey) {
        *self.inner.generations.entry(key.clone()).or_insert(0) += 1;
        self.inner.entries.remove(key);
        self.inner.in_flight.remove(key);
        debug!(%key, "cache entry invalidated");
    }

    /// Drop everything cached for one vehicle.
    pub fn invalidate_vehicle(&self, vin: &str) {
        let keys: Vec<ResourceKey> = self
            .inner
            .entries
            .iter()
            .map(|e| e.key().clone())
            .chain(self.inner.in_flight.iter().map(|e| e.key().clone()))
            .filter(|k| k.vin.as_deref() == Some(vin))
            .collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Last stored payload regardless of age.
    pub fn peek(&self, key: &ResourceKey) -> Option<V> {
        self.inner.entries.get(key).map(|e| e.payload.clone())
    }

    /// Age of the stored payload, if any.
    pub fn age(&self, key: &ResourceKey) -> Option<Duration> {
        self.inner
            .entries
            .get(key)
            .map(|e| Instant::now().saturating_duration_since(e.fetched_at))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::TransientError;
    use crate::model::ResourceKind;

    fn key() -> ResourceKey {
        ResourceKey::vehicle("WVWZZZ1KZAW000001", ResourceKind::Charging)
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<&'static str, FetchError>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, FetchError>(value)
            }
            .boxed()
        }
    }

    fn failing() -> BoxFuture<'static, Result<&'static str, FetchError>> {
        async {
            Err(FetchError::Transient(TransientError::Timeout {
                timeout_secs: 30,
            }))
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn serves_cached_payload_inside_window() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Freshness::Window(Duration::from_secs(60));

        let first = cache.fetch(key(), window, counting(&calls, "A")).await.unwrap();
        assert_eq!(first, "A");

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = cache.fetch(key(), window, counting(&calls, "B")).await.unwrap();
        assert_eq!(second, "A");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let third = cache.fetch(key(), window, counting(&calls, "B")).await.unwrap();
        assert_eq!(third, "B");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_whether_payload_came_from_cache() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (_, first) = cache
            .fetch_with_source(key(), Freshness::Lifetime, counting(&calls, "A"))
            .await
            .unwrap();
        let (value, second) = cache
            .fetch_with_source(key(), Freshness::Lifetime, counting(&calls, "B"))
            .await
            .unwrap();
        assert_eq!(first, Source::Network);
        assert_eq!((value, second), ("A", Source::Cache));

        let (a, b) = tokio::join!(
            cache.fetch_with_source(key(), Freshness::Window(Duration::ZERO), counting(&calls, "C")),
            cache.fetch_with_source(key(), Freshness::Window(Duration::ZERO), counting(&calls, "D")),
        );
        assert_eq!(a.unwrap(), ("C", Source::Network));
        assert_eq!(b.unwrap(), ("C", Source::Network));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Freshness::Window(Duration::from_secs(60));

        let (a, b, c) = tokio::join!(
            cache.fetch(key(), window, counting(&calls, "A")),
            cache.fetch(key(), window, counting(&calls, "B")),
            cache.fetch(key(), window, counting(&calls, "C")),
        );
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), ("A", "A", "A"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_stale_entry_and_surfaces_error() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Freshness::Window(Duration::from_secs(60));

        cache.fetch(key(), window, counting(&calls, "A")).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;

        let err = cache.fetch(key(), window, failing).await.unwrap_err();
        assert!(matches!(err, FetchError::Transient(_)));
        assert_eq!(cache.peek(&key()), Some("A"));

        // The failure did not refresh the timestamp, so the next call retries.
        let next = cache.fetch(key(), window, counting(&calls, "B")).await.unwrap();
        assert_eq!(next, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .fetch(key(), Freshness::Lifetime, counting(&calls, "A"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        let hit = cache
            .fetch(key(), Freshness::Lifetime, counting(&calls, "B"))
            .await
            .unwrap();
        assert_eq!(hit, "A");

        cache.invalidate(&key());
        let fresh = cache
            .fetch(key(), Freshness::Lifetime, counting(&calls, "B"))
            .await
            .unwrap();
        assert_eq!(fresh, "B");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidated_in_flight_result_is_not_stored() {
        let cache: RequestCache<&'static str> = RequestCache::new();
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());

        let waiter = {
            let cache = cache.clone();
            let started = Arc::clone(&started);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                cache
                    .fetch(key(), Freshness::Lifetime, move || async move {
                        started.notify_one();
                        gate.notified().await;
                        Ok::<_, FetchError>("before-command")
                    })
                    .await
            })
        };
        started.notified().await;

        cache.invalidate(&key());
        gate.notify_one();

        // The original caller still gets its answer...
        assert_eq!(waiter.await.unwrap().unwrap(), "before-command");
        // ...but it does not become the cached value.
        assert_eq!(cache.peek(&key()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_always_fetches() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Freshness::Window(Duration::ZERO);

        cache.fetch(key(), window, counting(&calls, "A")).await.unwrap();
        cache.fetch(key(), window, counting(&calls, "A")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_vehicle_only_touches_that_vehicle() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let other = ResourceKey::vehicle("WVWZZZ1KZAW000002", ResourceKind::Charging);

        cache
            .fetch(key(), Freshness::Lifetime, counting(&calls, "A"))
            .await
            .unwrap();
        cache
            .fetch(other.clone(), Freshness::Lifetime, counting(&calls, "B"))
            .await
            .unwrap();

        cache.invalidate_vehicle("WVWZZZ1KZAW000001");
        assert_eq!(cache.peek(&key()), None);
        assert_eq!(cache.peek(&other), Some("B"));
    }
}
