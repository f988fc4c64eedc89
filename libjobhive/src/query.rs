//! Keyed query cache with request coalescing
//!
//! Every remote read goes through a `QueryCache<T>`. An entry is identified
//! by a `QueryKey` (resource name plus all parameters) and remembers the
//! last successful value, the last error, and the request currently in
//! flight, if any.
//!
//! # Coalescing
//!
//! While a request for a key is in flight, further loads for the same key
//! await the same `futures::future::Shared` future instead of issuing a
//! second request. The shared future writes its outcome back into the
//! cache itself, so the entry is settled exactly once whichever caller
//! happens to drive it.
//!
//! # Freshness
//!
//! Each load declares a `Freshness`. A cached value that is still fresh is
//! returned without touching the network. `refetch` ignores freshness but
//! still joins an in-flight request. Errors are never cached as values:
//! the previous data stays available next to the error and the next load
//! tries again.
//!
//! # Example
//!
//! ```no_run
//! use libjobhive::query::{Freshness, QueryCache, QueryKey};
//!
//! # async fn example() -> Result<(), libjobhive::ApiError> {
//! let cache: QueryCache<Vec<String>> = QueryCache::new();
//! let key = QueryKey::new("tags").param("lang", "en");
//!
//! let tags = cache
//!     .fetch(key, Freshness::Forever, || async { Ok(vec!["rust".to_string()]) })
//!     .await?;
//! assert_eq!(tags.len(), 1);
//! # Ok(())
//! # }
//! ```

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ApiError;

/// Resource name plus parameters identifying one cached result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: &'static str,
    params: Vec<(String, String)>,
}

impl QueryKey {
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn resource(&self) -> &str {
        self.resource
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}

/// How long a cached value may be served without a new request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fresh until invalidated
    Forever,
    /// Fresh for a fixed window after the fetch completed
    For(Duration),
}

impl Freshness {
    fn is_fresh(&self, fetched_at: Instant, now: Instant) -> bool {
        match self {
            Freshness::Forever => true,
            Freshness::For(ttl) => now.duration_since(fetched_at) < *ttl,
        }
    }
}

/// Observable state of one query
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub is_loading: bool,
    pub error: Option<ApiError>,
}

impl<T> QueryState<T> {
    /// State of a query that has not run (or cannot run yet)
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }
}

// Manual impl: `T` itself need not be `Clone`, only the `Arc` is copied
impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

type FetchOutcome<T> = Result<Arc<T>, ApiError>;
type SharedFetch<T> = Shared<BoxFuture<'static, FetchOutcome<T>>>;

struct InFlight<T> {
    id: u64,
    future: SharedFetch<T>,
}

struct Entry<T> {
    data: Option<(Arc<T>, Instant)>,
    error: Option<ApiError>,
    in_flight: Option<InFlight<T>>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            in_flight: None,
        }
    }
}

struct CacheInner<T> {
    entries: HashMap<QueryKey, Entry<T>>,
    next_fetch_id: u64,
}

/// Cache of one resource type; clones share the same entries
pub struct QueryCache<T> {
    inner: Arc<Mutex<CacheInner<T>>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(inner: &Mutex<CacheInner<T>>) -> MutexGuard<'_, CacheInner<T>> {
    // Entries are only replaced wholesale, so a poisoned map is still consistent
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: Send + Sync + 'static> QueryCache<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_fetch_id: 0,
            })),
        }
    }

    /// Return the cached value if fresh, otherwise fetch (or join the fetch
    /// already in flight for this key)
    ///
    /// `fetcher` is only invoked when a new request is actually needed.
    pub async fn fetch<F, Fut>(&self, key: QueryKey, freshness: Freshness, fetcher: F) -> FetchOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.load(key, Some(freshness), fetcher).await
    }

    /// Fetch regardless of freshness, joining a request already in flight
    pub async fn refetch<F, Fut>(&self, key: QueryKey, fetcher: F) -> FetchOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.load(key, None, fetcher).await
    }

    async fn load<F, Fut>(&self, key: QueryKey, freshness: Option<Freshness>, fetcher: F) -> FetchOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let future = {
            let mut inner = lock(&self.inner);
            let fetch_id = inner.next_fetch_id;
            let entry = inner.entries.entry(key.clone()).or_default();

            if let (Some(freshness), Some((data, fetched_at))) = (freshness, &entry.data) {
                if freshness.is_fresh(*fetched_at, Instant::now()) {
                    tracing::trace!("Query {} served from cache", key);
                    return Ok(Arc::clone(data));
                }
            }

            if let Some(in_flight) = &entry.in_flight {
                tracing::trace!("Query {} joined in-flight request", key);
                in_flight.future.clone()
            } else {
                tracing::debug!("Query {} fetching", key);
                let request = fetcher();
                let cache = Arc::clone(&self.inner);
                let settle_key = key.clone();
                let future = async move {
                    let outcome = request.await.map(Arc::new);
                    settle(&cache, &settle_key, fetch_id, &outcome);
                    outcome
                }
                .boxed()
                .shared();

                entry.in_flight = Some(InFlight {
                    id: fetch_id,
                    future: future.clone(),
                });
                inner.next_fetch_id += 1;
                future
            }
        };

        future.await
    }

    /// Current state of the entry for `key`
    pub fn state(&self, key: &QueryKey) -> QueryState<T> {
        let inner = lock(&self.inner);
        match inner.entries.get(key) {
            Some(entry) => QueryState {
                data: entry.data.as_ref().map(|(data, _)| Arc::clone(data)),
                is_loading: entry.in_flight.is_some(),
                error: entry.error.clone(),
            },
            None => QueryState::idle(),
        }
    }

    /// Drop the entry for `key`; a request in flight for it will not be cached
    pub fn invalidate(&self, key: &QueryKey) {
        if lock(&self.inner).entries.remove(key).is_some() {
            tracing::debug!("Query {} invalidated", key);
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }
}

/// Record the outcome of fetch `fetch_id`, unless the entry moved on since
fn settle<T>(inner: &Mutex<CacheInner<T>>, key: &QueryKey, fetch_id: u64, outcome: &FetchOutcome<T>) {
    let mut inner = lock(inner);
    let Some(entry) = inner.entries.get_mut(key) else {
        return;
    };
    if entry.in_flight.as_ref().map(|f| f.id) != Some(fetch_id) {
        return;
    }

    entry.in_flight = None;
    match outcome {
        Ok(data) => {
            entry.data = Some((Arc::clone(data), Instant::now()));
            entry.error = None;
        }
        Err(error) => {
            tracing::debug!("Query {} failed: {}", key, error);
            entry.error = Some(error.clone());
        }
    }
}

type Loader<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// A query bound to one key, the unit screens consume
///
/// A query built without a key is disabled: it stays idle and never
/// issues a request.
pub struct Query<T> {
    key: Option<QueryKey>,
    freshness: Freshness,
    cache: QueryCache<T>,
    loader: Loader<T>,
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn new<F, Fut>(key: Option<QueryKey>, freshness: Freshness, cache: QueryCache<T>, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            key,
            freshness,
            cache,
            loader: Arc::new(move || loader().boxed()),
        }
    }

    pub fn key(&self) -> Option<&QueryKey> {
        self.key.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Current state without triggering a request
    pub fn state(&self) -> QueryState<T> {
        match &self.key {
            Some(key) => self.cache.state(key),
            None => QueryState::idle(),
        }
    }

    /// Load the data, served from cache when fresh
    pub async fn load(&self) -> QueryState<T> {
        let Some(key) = &self.key else {
            return QueryState::idle();
        };
        let loader = Arc::clone(&self.loader);
        let outcome = self
            .cache
            .fetch(key.clone(), self.freshness, move || loader())
            .await;
        self.state_after(key, outcome)
    }

    /// Load the data from the network even if the cached copy is fresh
    pub async fn refetch(&self) -> QueryState<T> {
        let Some(key) = &self.key else {
            return QueryState::idle();
        };
        let loader = Arc::clone(&self.loader);
        let outcome = self.cache.refetch(key.clone(), move || loader()).await;
        self.state_after(key, outcome)
    }

    fn state_after(&self, key: &QueryKey, outcome: FetchOutcome<T>) -> QueryState<T> {
        let mut state = self.cache.state(key);
        match outcome {
            Ok(data) => {
                state.data = Some(data);
                state.error = None;
            }
            Err(error) => state.error = Some(error),
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, ApiError>> {
        let counter = Arc::clone(counter);
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[test]
    fn test_query_key_display() {
        let key = QueryKey::new("companies").param("search", "acme").param("page", "2");
        assert_eq!(key.to_string(), "companies?search=acme&page=2");
        assert_eq!(QueryKey::new("top-companies").to_string(), "top-companies");
    }

    #[test]
    fn test_query_keys_differ_by_params() {
        let a = QueryKey::new("companies").param("search", "a");
        let b = QueryKey::new("companies").param("search", "b");
        assert_ne!(a, b);
        assert_eq!(a, QueryKey::new("companies").param("search", "a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_coalesce() {
        let cache: QueryCache<u32> = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("n");

        let (a, b) = tokio::join!(
            cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 1)),
            cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 2)),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_do_not_coalesce() {
        let cache: QueryCache<u32> = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.fetch(QueryKey::new("n").param("id", "1"), Freshness::Forever, counting_fetch(&counter, 1)),
            cache.fetch(QueryKey::new("n").param("id", "2"), Freshness::Forever, counting_fetch(&counter, 2)),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forever_fresh_is_served_from_cache() {
        let cache: QueryCache<u32> = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("n");

        cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(24 * 3600)).await;
        let second = cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 2)).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*second, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_triggers_new_fetch() {
        let cache: QueryCache<u32> = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("n");
        let ttl = Freshness::For(Duration::from_secs(60));

        cache.fetch(key.clone(), ttl, counting_fetch(&counter, 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(*cache.fetch(key.clone(), ttl, counting_fetch(&counter, 2)).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(*cache.fetch(key.clone(), ttl, counting_fetch(&counter, 3)).await.unwrap(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_previous_data_and_is_not_cached() {
        let cache: QueryCache<u32> = QueryCache::new();
        let key = QueryKey::new("n");

        cache.fetch(key.clone(), Freshness::Forever, || async { Ok(7) }).await.unwrap();
        let err = cache
            .refetch(key.clone(), || async { Err(ApiError::Transport("offline".to_string())) })
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Transport("offline".to_string()));

        let state = cache.state(&key);
        assert_eq!(state.data.as_deref(), Some(&7));
        assert_eq!(state.error, Some(ApiError::Transport("offline".to_string())));
        assert!(!state.is_loading);

        // A failed first load leaves nothing fresh behind, so the next load retries
        let other = QueryKey::new("m");
        let _ = cache
            .fetch(other.clone(), Freshness::Forever, || async { Err(ApiError::MissingToken) })
            .await;
        let value = cache.fetch(other.clone(), Freshness::Forever, || async { Ok(1) }).await.unwrap();
        assert_eq!(*value, 1);
        assert!(cache.state(&other).error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_joins_in_flight_request() {
        let cache: QueryCache<u32> = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("n");

        let (a, b) = tokio::join!(
            cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 1)),
            cache.refetch(key.clone(), counting_fetch(&counter, 2)),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*a.unwrap(), *b.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let cache: QueryCache<u32> = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("n");

        cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 1)).await.unwrap();
        cache.invalidate(&key);
        assert!(cache.state(&key).data.is_none());

        let value = cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 2)).await.unwrap();
        assert_eq!(*value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_state_while_in_flight() {
        let cache: QueryCache<u32> = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("n");

        let observer = cache.clone();
        let observed_key = key.clone();
        let (value, seen_loading) = tokio::join!(
            cache.fetch(key.clone(), Freshness::Forever, counting_fetch(&counter, 5)),
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                observer.state(&observed_key).is_loading
            }
        );

        assert_eq!(*value.unwrap(), 5);
        assert!(seen_loading);
        assert!(!cache.state(&key).is_loading);
    }

    #[tokio::test]
    async fn test_disabled_query_never_fetches() {
        let counter = Arc::new(AtomicUsize::new(0));
        let loader_counter = Arc::clone(&counter);
        let query: Query<u32> = Query::new(None, Freshness::Forever, QueryCache::new(), move || {
            let counter = Arc::clone(&loader_counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        });

        assert!(!query.is_enabled());
        let state = query.load().await;
        assert!(state.data.is_none());
        assert!(!state.is_loading);
        assert!(query.refetch().await.data.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
