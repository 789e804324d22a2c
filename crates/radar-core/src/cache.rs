//! Single-flight Timed Cache
//!
//! A `TimedCache` holds one lazily computed value together with the instant it
//! was computed. It is the building block for the schema caches and for the
//! bearer token holder.
//!
//! ## Lifecycle of the cached slot
//!
//! ```text
//!            compute ok                     age >= refresh
//!  Empty ─────────────────→ Value ───────────────────────────→ recompute
//!    │                        │
//!    │                        └─ predicate fails, age >= retry ─→ recompute
//!    │ compute err
//!    └────────────→ Failed ── age >= exception_cache_duration ─→ recompute
//! ```
//!
//! ## Single-flight
//!
//! A recomputation is a `Shared` future registered in the in-flight list.
//! At most `max_simultaneous_compute` computations run at once; any caller
//! beyond that joins the most recent in-flight computation instead of starting
//! another one. The list only holds weak handles: if every caller of a
//! computation is cancelled, the computation is dropped, its guard removes it
//! from the list, and nothing is written to the slot. The next caller starts
//! a fresh attempt.
//!
//! The state lock is a plain synchronous mutex. It is only taken for short,
//! non-async sections and never held across an `.await`.

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Timing and concurrency settings of a [`TimedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a computed value is trusted.
    pub refresh_duration: Duration,

    /// Minimum time before a value that failed a query predicate is
    /// recomputed.
    pub retry_duration: Duration,

    /// How long a failed computation is replayed before retrying.
    pub exception_cache_duration: Duration,

    /// Maximum number of concurrently running computations.
    pub max_simultaneous_compute: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_duration: Duration::from_secs(24 * 60 * 60),
            retry_duration: Duration::from_secs(60),
            exception_cache_duration: Duration::from_secs(10),
            max_simultaneous_compute: 1,
        }
    }
}

impl CacheConfig {
    pub fn with_refresh_duration(mut self, duration: Duration) -> Self {
        self.refresh_duration = duration;
        self
    }

    pub fn with_retry_duration(mut self, duration: Duration) -> Self {
        self.retry_duration = duration;
        self
    }

    pub fn with_exception_cache_duration(mut self, duration: Duration) -> Self {
        self.exception_cache_duration = duration;
        self
    }

    pub fn with_max_simultaneous_compute(mut self, count: usize) -> Self {
        self.max_simultaneous_compute = count;
        self
    }
}

/// Outcome of [`TimedCache::query`].
///
/// Both variants carry a value; `Miss` means the value did not satisfy the
/// predicate, either because it was recomputed and still fails or because it
/// is too fresh to be recomputed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResult<T> {
    Hit(T),
    Miss(T),
}

impl<T> CacheResult<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            CacheResult::Hit(value) | CacheResult::Miss(value) => value,
        }
    }

    pub fn as_ref(&self) -> &T {
        match self {
            CacheResult::Hit(value) | CacheResult::Miss(value) => value,
        }
    }
}

/// Hit and miss counters of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type ComputeFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type SharedCompute<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

enum Slot<T, E> {
    Empty,
    Value { value: T, fetched_at: Instant },
    Failed { error: E, failed_at: Instant },
}

struct InFlight<T, E> {
    id: u64,
    future: WeakShared<BoxFuture<'static, Result<T, E>>>,
}

/// Everything a cache tracks, behind one synchronous mutex.
///
/// Claiming an in-flight slot, storing a result and clearing are each a
/// single short critical section, which takes the place of a
/// compare-and-swap on the pending computation. No section awaits, so a
/// task never holds the lock while suspended.
struct State<T, E> {
    slot: Slot<T, E>,
    in_flight: Vec<InFlight<T, E>>,
    generation: u64,
    next_id: u64,
}

/// Removes its computation from the in-flight list when the computation
/// completes or is dropped unfinished.
struct FlightGuard<T, E> {
    state: Arc<Mutex<State<T, E>>>,
    id: u64,
}

impl<T, E> Drop for FlightGuard<T, E> {
    fn drop(&mut self) {
        let id = self.id;
        lock(&self.state).in_flight.retain(|flight| flight.id != id);
    }
}

fn lock<T, E>(state: &Mutex<State<T, E>>) -> MutexGuard<'_, State<T, E>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A lazily computed value with refresh, retry and error TTLs and
/// single-flight recomputation.
pub struct TimedCache<T, E> {
    config: CacheConfig,
    compute: ComputeFn<T, E>,
    state: Arc<Mutex<State<T, E>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T, E> TimedCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty cache that computes its value with `compute`.
    pub fn new<F, Fut>(config: CacheConfig, compute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let compute: ComputeFn<T, E> = Arc::new(move || compute().boxed());
        Self {
            config,
            compute,
            state: Arc::new(Mutex::new(State {
                slot: Slot::Empty,
                in_flight: Vec::new(),
                generation: 0,
                next_id: 0,
            })),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the cached value, recomputing it when it is missing, older than
    /// the refresh duration, or a cached failure has expired.
    pub async fn get(&self) -> Result<T, E> {
        self.query(|value| value.clone(), |_| true)
            .await
            .map(CacheResult::into_inner)
    }

    /// Query the cached value through `map` and validate the result with
    /// `predicate`.
    ///
    /// A fresh value that passes the predicate is a `Hit` without any
    /// recomputation. A fresh value that fails it is recomputed once it is
    /// older than the retry duration; before that it is returned as a `Miss`.
    pub async fn query<R, M, P>(&self, map: M, predicate: P) -> Result<CacheResult<R>, E>
    where
        M: Fn(&T) -> R + Send,
        P: Fn(&R) -> bool + Send,
        R: Send,
    {
        let now = Instant::now();
        let cached = {
            let state = lock(&self.state);
            match &state.slot {
                Slot::Empty => None,
                Slot::Value { value, fetched_at } => {
                    Some(Ok((value.clone(), now.saturating_duration_since(*fetched_at))))
                }
                Slot::Failed { error, failed_at } => {
                    if now.saturating_duration_since(*failed_at)
                        < self.config.exception_cache_duration
                    {
                        Some(Err(error.clone()))
                    } else {
                        None
                    }
                }
            }
        };

        match cached {
            Some(Ok((value, age))) if age < self.config.refresh_duration => {
                let result = map(&value);
                if predicate(&result) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    trace!(age_ms = age.as_millis() as u64, "Timed cache hit");
                    return Ok(CacheResult::Hit(result));
                }
                if age < self.config.retry_duration {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        age_ms = age.as_millis() as u64,
                        "Cached value is invalid but too recent to retry"
                    );
                    return Ok(CacheResult::Miss(result));
                }
            }
            Some(Err(error)) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!("Replaying cached failure");
                return Err(error);
            }
            _ => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = self.compute_shared().await?;
        let result = map(&value);
        if predicate(&result) {
            Ok(CacheResult::Hit(result))
        } else {
            Ok(CacheResult::Miss(result))
        }
    }

    /// Return the cached value if it is still within the refresh duration,
    /// without computing anything.
    pub fn get_cached(&self) -> Option<T> {
        let state = lock(&self.state);
        match &state.slot {
            Slot::Value { value, fetched_at }
                if fetched_at.elapsed() < self.config.refresh_duration =>
            {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Store an externally obtained value as if it was just computed.
    pub fn set(&self, value: T) {
        let mut state = lock(&self.state);
        state.slot = Slot::Value {
            value,
            fetched_at: Instant::now(),
        };
    }

    /// Invalidate the cached value. Computations started before the call
    /// still complete for their callers but no longer update the cache.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.slot = Slot::Empty;
        state.in_flight.clear();
    }

    /// Whether the cache holds nothing worth keeping: it is empty, its value
    /// is past the refresh duration, or its cached failure has expired.
    /// Caches with a computation in flight are never stale.
    pub fn is_stale(&self) -> bool {
        let state = lock(&self.state);
        if !state.in_flight.is_empty() {
            return false;
        }
        match &state.slot {
            Slot::Empty => true,
            Slot::Value { fetched_at, .. } => {
                fetched_at.elapsed() >= self.config.refresh_duration
            }
            Slot::Failed { failed_at, .. } => {
                failed_at.elapsed() >= self.config.exception_cache_duration
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn compute_shared(&self) -> Result<T, E> {
        let limit = self.config.max_simultaneous_compute.max(1);
        let shared = {
            let mut state = lock(&self.state);
            let joined = if state.in_flight.len() >= limit {
                state
                    .in_flight
                    .iter()
                    .rev()
                    .find_map(|flight| flight.future.upgrade())
            } else {
                None
            };
            match joined {
                Some(shared) => {
                    trace!(in_flight = state.in_flight.len(), "Joining in-flight computation");
                    shared
                }
                None => self.start_computation(&mut state),
            }
        };
        shared.await
    }

    fn start_computation(&self, state: &mut State<T, E>) -> SharedCompute<T, E> {
        let id = state.next_id;
        state.next_id += 1;
        let generation = state.generation;
        let guard = FlightGuard {
            state: Arc::clone(&self.state),
            id,
        };
        let computation = (self.compute)();

        let shared = async move {
            let result = computation.await;
            {
                let mut state = lock(&guard.state);
                if state.generation == generation {
                    let now = Instant::now();
                    state.slot = match &result {
                        Ok(value) => Slot::Value {
                            value: value.clone(),
                            fetched_at: now,
                        },
                        Err(error) => Slot::Failed {
                            error: error.clone(),
                            failed_at: now,
                        },
                    };
                }
            }
            drop(guard);
            result
        }
        .boxed()
        .shared();

        if let Some(future) = shared.downgrade() {
            state.in_flight.push(InFlight { id, future });
        }
        trace!(id, in_flight = state.in_flight.len(), "Started computation");
        shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_cache(
        config: CacheConfig,
        delay: Duration,
    ) -> (TimedCache<usize, String>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = TimedCache::new(config, move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(n)
            }
        });
        (cache, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_caches_within_refresh_duration() {
        let config = CacheConfig::default().with_refresh_duration(Duration::from_secs(10));
        let (cache, calls) = counting_cache(config, Duration::ZERO);

        assert_eq!(cache.get().await.unwrap(), 1);
        assert_eq!(cache.get().await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_multi_single_compute() {
        let (cache, calls) = counting_cache(CacheConfig::default(), Duration::from_millis(100));

        let results = futures::future::join_all((0..8).map(|_| cache.get())).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_multi_two_simultaneous_computes() {
        let config = CacheConfig::default().with_max_simultaneous_compute(2);
        let (cache, calls) = counting_cache(config, Duration::from_millis(100));

        let results = futures::future::join_all((0..6).map(|_| cache.get())).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        for result in results {
            let value = result.unwrap();
            assert!(value == 1 || value == 2, "unexpected value {}", value);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_replayed_until_expiry() {
        let config = CacheConfig::default()
            .with_exception_cache_duration(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: TimedCache<usize, String> = TimedCache::new(config, move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    Err("registry down".to_string())
                } else {
                    Ok(n)
                }
            }
        });

        assert_eq!(cache.get().await.unwrap_err(), "registry down");
        assert_eq!(cache.get().await.unwrap_err(), "registry down");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_retries_invalid_value_after_retry_duration() {
        let config = CacheConfig::default()
            .with_refresh_duration(Duration::from_secs(3600))
            .with_retry_duration(Duration::from_secs(60));
        let (cache, calls) = counting_cache(config, Duration::ZERO);

        let valid = |n: &usize| *n >= 3;

        assert_eq!(cache.query(|n| *n, valid).await.unwrap(), CacheResult::Miss(1));
        // too recent to retry
        assert_eq!(cache.query(|n| *n, valid).await.unwrap(), CacheResult::Miss(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.query(|n| *n, valid).await.unwrap(), CacheResult::Miss(2));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.query(|n| *n, valid).await.unwrap(), CacheResult::Hit(3));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.query(|n| *n, valid).await.unwrap(), CacheResult::Hit(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_forces_recompute() {
        let (cache, calls) = counting_cache(CacheConfig::default(), Duration::ZERO);

        assert_eq!(cache.get().await.unwrap(), 1);
        cache.clear();
        assert!(cache.get_cached().is_none());
        assert_eq!(cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_in_flight_result() {
        let (cache, calls) = counting_cache(CacheConfig::default(), Duration::from_millis(100));

        let (first, _) = tokio::join!(cache.get(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.clear();
        });

        // The waiting caller still gets its value, the cache does not keep it
        assert_eq!(first.unwrap(), 1);
        assert!(cache.get_cached().is_none());
        assert_eq!(cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_populates_without_compute() {
        let (cache, calls) = counting_cache(CacheConfig::default(), Duration::ZERO);

        cache.set(42);
        assert_eq!(cache.get().await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_compute_leaves_cache_empty() {
        let (cache, calls) = counting_cache(CacheConfig::default(), Duration::from_secs(1));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), cache.get()).await;
        assert!(cancelled.is_err());
        assert!(cache.get_cached().is_none());
        assert!(cache.is_stale());

        assert_eq!(cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_stale_tracks_refresh_duration() {
        let config = CacheConfig::default().with_refresh_duration(Duration::from_secs(10));
        let (cache, _calls) = counting_cache(config, Duration::ZERO);

        assert!(cache.is_stale());
        cache.get().await.unwrap();
        assert!(!cache.is_stale());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.is_stale());
    }
}
