//! Two-tier cache with request coalescing.
//!
//! Lookup order for [`SingleFlightCache::resolve`]:
//!
//! 1. Durable tier (if a store is attached); a fresh hit seeds memory
//! 2. Memory tier
//! 3. In-flight request for the same key (awaited, not repeated)
//! 4. Loader, run as a detached task
//!
//! Errors are never cached. Whether an empty ("negative") value is cached,
//! and for how long, is decided by the [`TtlPolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use curio_core::constants::{
    DEFAULT_MEMORY_CAPACITY, IDENTITY_DURABLE_TTL, IDENTITY_MEMORY_TTL, IDENTITY_NEGATIVE_TTL,
    OWNER_TTL,
};
use curio_core::error::{CurioError, Result};
use curio_core::{CacheEntry, Clock, SystemClock};

use crate::durable::DurableTier;
use crate::ttl::{normalize_key, MemoryTier, MemoryTierConfig};

/// A value that can live in a [`SingleFlightCache`].
pub trait CacheValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Returns true if the value records "no result".
    fn is_negative(&self) -> bool {
        false
    }
}

impl<T> CacheValue for Option<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    fn is_negative(&self) -> bool {
        self.is_none()
    }
}

impl CacheValue for String {
    fn is_negative(&self) -> bool {
        self.trim().is_empty()
    }
}

/// Per-instance cache lifetimes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Lifetime of a positive value in memory
    pub memory_ttl: Duration,
    /// Lifetime of a positive value in the durable tier
    pub durable_ttl: Duration,
    /// Lifetime of a negative value in both tiers; `None` disables negative caching
    pub negative_ttl: Option<Duration>,
}

impl TtlPolicy {
    /// Identity lookups: long positive lifetimes, short negative window.
    pub fn identity() -> Self {
        Self {
            memory_ttl: IDENTITY_MEMORY_TTL,
            durable_ttl: IDENTITY_DURABLE_TTL,
            negative_ttl: Some(IDENTITY_NEGATIVE_TTL),
        }
    }

    /// Contract owners: one lifetime for both tiers, negatives never cached.
    pub fn owner() -> Self {
        Self {
            memory_ttl: OWNER_TTL,
            durable_ttl: OWNER_TTL,
            negative_ttl: None,
        }
    }

    fn memory_ttl_for<V: CacheValue>(&self, value: &V) -> Option<Duration> {
        if value.is_negative() {
            self.negative_ttl.map(|ttl| ttl.min(self.memory_ttl))
        } else {
            Some(self.memory_ttl)
        }
    }

    fn durable_ttl_for<V: CacheValue>(&self, value: &V) -> Option<Duration> {
        if value.is_negative() {
            self.negative_ttl
        } else {
            Some(self.durable_ttl)
        }
    }
}

type SharedLoad<V> = Shared<BoxFuture<'static, std::result::Result<V, Arc<CurioError>>>>;

struct Inner<V> {
    namespace: String,
    memory: MemoryTier<V>,
    durable: DurableTier,
    pending: DashMap<String, SharedLoad<V>>,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
}

impl<V: CacheValue> Inner<V> {
    fn durable_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    async fn read_durable(&self, key: &str) -> Option<V> {
        let entry: CacheEntry<V> = self.durable.read(&self.durable_key(key)).await?;
        let ttl = self.policy.durable_ttl_for(&entry.value)?;
        if entry.is_fresh(self.clock.now_ms(), ttl) {
            Some(entry.value)
        } else {
            None
        }
    }

    fn seed_memory(&self, key: &str, value: &V) {
        if let Some(ttl) = self.policy.memory_ttl_for(value) {
            self.memory.insert_for(key, value.clone(), ttl);
        }
    }

    async fn store(&self, key: &str, value: &V) {
        if self.policy.durable_ttl_for(value).is_none() {
            debug!(key, "Negative value not cached");
            return;
        }
        self.seed_memory(key, value);
        let entry = CacheEntry::new(value.clone(), self.clock.now_ms());
        self.durable.write(&self.durable_key(key), &entry).await;
    }

    async fn lookup(&self, key: &str) -> Option<V> {
        if let Some(value) = self.read_durable(key).await {
            self.seed_memory(key, &value);
            return Some(value);
        }
        self.memory.get(key)
    }
}

/// Memory + durable cache that runs at most one loader per key at a time.
pub struct SingleFlightCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for SingleFlightCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: CacheValue> SingleFlightCache<V> {
    /// Creates a cache. Durable keys are `namespace + key`.
    pub fn new(
        namespace: impl Into<String>,
        policy: TtlPolicy,
        durable: DurableTier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = MemoryTierConfig {
            capacity: DEFAULT_MEMORY_CAPACITY,
            default_ttl: policy.memory_ttl,
        };
        Self {
            inner: Arc::new(Inner {
                namespace: namespace.into(),
                memory: MemoryTier::new(config, Arc::clone(&clock)),
                durable,
                pending: DashMap::new(),
                policy,
                clock,
            }),
        }
    }

    /// Creates a memory-only cache on the wall clock.
    pub fn in_memory(namespace: impl Into<String>, policy: TtlPolicy) -> Self {
        Self::new(namespace, policy, DurableTier::disabled(), Arc::new(SystemClock))
    }

    /// Returns the cache's lifetimes.
    pub fn policy(&self) -> TtlPolicy {
        self.inner.policy
    }

    /// Returns the cached value for `key`, or runs `loader` to produce it.
    ///
    /// Concurrent calls for the same key share one loader run and receive
    /// the same result. The loader keeps running if every caller goes away.
    #[instrument(skip(self, loader), fields(namespace = %self.inner.namespace))]
    pub async fn resolve<F, Fut>(&self, key: &str, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let key = normalize_key(key);

        if let Some(value) = self.inner.lookup(&key).await {
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }

        let shared = match self.inner.pending.entry(key.clone()) {
            Entry::Occupied(pending) => {
                debug!(key = %key, "Joining in-flight request");
                pending.get().clone()
            }
            Entry::Vacant(slot) => {
                // A load may have settled between the lookup and taking the slot.
                if let Some(value) = self.inner.memory.get(&key) {
                    return Ok(value);
                }

                debug!(key = %key, "Cache miss, loading");
                let inner = Arc::clone(&self.inner);
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let result = loader().await;
                    if let Ok(value) = &result {
                        inner.store(&task_key, value).await;
                    }
                    inner.pending.remove(&task_key);
                    result.map_err(Arc::new)
                });

                let load: SharedLoad<V> = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(Arc::new(CurioError::InternalError(format!(
                            "loader task failed: {}",
                            e
                        )))),
                    }
                }
                .boxed()
                .shared();

                slot.insert(load.clone());
                load
            }
        };

        shared.await.map_err(CurioError::from)
    }

    /// Returns a cached value without loading.
    pub async fn peek(&self, key: &str) -> Option<V> {
        self.inner.lookup(&normalize_key(key)).await
    }

    /// Writes a value to both tiers, subject to the negative-value policy.
    pub async fn put(&self, key: &str, value: V) {
        self.inner.store(&normalize_key(key), &value).await;
    }

    /// Drops a key from both tiers.
    pub async fn invalidate(&self, key: &str) {
        let key = normalize_key(key);
        self.inner.memory.remove(&key);
        self.inner.durable.delete(&self.inner.durable_key(&key)).await;
    }

    /// Clears the memory tier only.
    pub fn clear_memory(&self) {
        self.inner.memory.clear();
    }

    /// Returns the number of loads in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }
}
