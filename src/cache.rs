use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio::time::sleep;

use crate::error::ApiError;

/// Freshness and retry rules for one query kind.
#[derive(Clone, Copy, Debug)]
pub struct CachePolicy {
    /// Age under which a cached value is returned without fetching.
    pub fresh_for: Duration,
    /// Idle time after which a slot is dropped entirely.
    pub evict_after: Duration,
    /// Total fetch attempts before the error is surfaced.
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl CachePolicy {
    pub const fn new(fresh_for: Duration, evict_after: Duration) -> Self {
        Self {
            fresh_for,
            evict_after,
            retries: 2,
            retry_backoff: Duration::from_millis(300),
        }
    }
}

/// What a caller sees for a query key. Errors never unwind into the
/// caller; they ride alongside whatever data the slot still holds.
#[derive(Clone, Debug)]
pub struct QueryState<V> {
    pub data: Option<V>,
    /// True only while a fetch is outstanding and no data has ever been
    /// produced for this key; background refreshes do not re-enter it.
    pub is_loading: bool,
    pub error: Option<Arc<ApiError>>,
}

impl<V> QueryState<V> {
    /// State of a query that is disabled or has never run.
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }
}

struct CacheSlot<V> {
    data: Option<V>,
    fetched_at: Option<Instant>,
    error: Option<Arc<ApiError>>,
    last_access: Instant,
    // present while exactly one fetch for this key is in flight; waiters
    // subscribe and re-read the slot once signalled
    inflight: Option<broadcast::Sender<()>>,
}

impl<V> CacheSlot<V> {
    fn new(now: Instant) -> Self {
        Self {
            data: None,
            fetched_at: None,
            error: None,
            last_access: now,
            inflight: None,
        }
    }

    fn state(&self) -> QueryState<V>
    where
        V: Clone,
    {
        QueryState {
            data: self.data.clone(),
            is_loading: self.inflight.is_some() && self.data.is_none(),
            error: self.error.clone(),
        }
    }
}

/// Explicit in-memory request cache: one slot per fingerprint, at most one
/// outstanding fetch per slot, stale data served while a refetch fails.
pub struct QueryCache<K, V> {
    policy: CachePolicy,
    slots: Arc<Mutex<HashMap<K, CacheSlot<V>>>>,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve `key` through the cache. `refresh` skips the freshness check
    /// but still coalesces with any fetch already in flight. The returned
    /// state reflects the slot after completion: a failed fetch keeps the
    /// previous data and records the error next to it.
    ///
    /// The fetch itself runs on a detached task: dropping a caller
    /// mid-flight neither orphans the result nor blocks later callers for
    /// the key — the fetch completes and populates the slot regardless.
    pub async fn fetch<F, Fut>(&self, key: K, refresh: bool, fetcher: F) -> QueryState<V>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let now = Instant::now();
        let mut rx = {
            let mut slots = self.slots.lock().await;
            sweep(&mut slots, now, self.policy.evict_after);
            let slot = slots.entry(key.clone()).or_insert_with(|| CacheSlot::new(now));
            slot.last_access = now;

            let fresh = slot.data.is_some()
                && slot
                    .fetched_at
                    .is_some_and(|t| now.duration_since(t) < self.policy.fresh_for);
            if !refresh && fresh {
                return QueryState {
                    data: slot.data.clone(),
                    is_loading: false,
                    error: slot.error.clone(),
                };
            }

            match &slot.inflight {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    slot.inflight = Some(tx);
                    self.spawn_fetch(key.clone(), fetcher);
                    rx
                }
            }
        };

        if rx.recv().await.is_err() {
            // the fetch task died without signalling; clear the stale
            // marker so the next caller can fetch again
            let mut slots = self.slots.lock().await;
            if let Some(slot) = slots.get_mut(&key) {
                slot.inflight = None;
            }
        }
        self.state_of(&key).await
    }

    /// Peek at a key without fetching.
    pub async fn state_of(&self, key: &K) -> QueryState<V> {
        let slots = self.slots.lock().await;
        match slots.get(key) {
            Some(slot) => slot.state(),
            None => QueryState::idle(),
        }
    }

    fn spawn_fetch<F, Fut>(&self, key: K, fetcher: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let policy = self.policy;
        tokio::spawn(async move {
            let result = run_attempts(policy, fetcher).await;

            let mut slots = slots.lock().await;
            let slot = slots
                .entry(key)
                .or_insert_with(|| CacheSlot::new(Instant::now()));
            let tx = slot.inflight.take();
            match result {
                Ok(value) => {
                    slot.data = Some(value);
                    slot.fetched_at = Some(Instant::now());
                    slot.error = None;
                }
                Err(err) => {
                    slot.error = Some(Arc::new(err));
                }
            }
            drop(slots);
            if let Some(tx) = tx {
                let _ = tx.send(());
            }
        });
    }
}

async fn run_attempts<V, F, Fut>(policy: CachePolicy, fetcher: F) -> Result<V, ApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<V, ApiError>>,
{
    let attempts = policy.retries.max(1);
    let mut attempt = 1;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                tracing::debug!("fetch attempt {attempt} failed, retrying: {err}");
                attempt += 1;
                sleep(policy.retry_backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn sweep<K, V>(slots: &mut HashMap<K, CacheSlot<V>>, now: Instant, evict_after: Duration) {
    slots.retain(|_, slot| {
        slot.inflight.is_some() || now.duration_since(slot.last_access) <= evict_after
    });
}
