//! Address → display name, with a fallback chain.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use curio_cache::{DurableTier, SingleFlightCache, TtlPolicy};
use curio_core::constants::{
    BASENAME_KEY_PREFIX, FALLBACK_STAGGER, IDENTITY_BATCH_CHUNK, IDENTITY_MIN_INTERVAL,
    UNKNOWN_IDENTITY, USERNAME_KEY_PREFIX,
};
use curio_core::traits::{Clock, IdentityService, NameService};
use curio_core::types::normalize_address;

use crate::ratelimit::RateLimiter;

/// Resolver configuration.
#[derive(Clone, Debug)]
pub struct IdentityResolverConfig {
    /// Minimum spacing between calls to each identity service
    pub min_interval: Duration,
    /// Addresses per batch request
    pub batch_chunk: usize,
    /// Delay between individual secondary-service retries after a batch
    pub fallback_stagger: Duration,
}

impl Default for IdentityResolverConfig {
    fn default() -> Self {
        Self {
            min_interval: IDENTITY_MIN_INTERVAL,
            batch_chunk: IDENTITY_BATCH_CHUNK,
            fallback_stagger: FALLBACK_STAGGER,
        }
    }
}

impl IdentityResolverConfig {
    /// No pacing at all; for tests and local fakes.
    pub fn unthrottled() -> Self {
        Self {
            min_interval: Duration::ZERO,
            fallback_stagger: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Sets the per-service call spacing.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Sets the batch chunk size (at least 1).
    pub fn with_batch_chunk(mut self, chunk: usize) -> Self {
        self.batch_chunk = chunk.max(1);
        self
    }

    /// Sets the secondary retry stagger.
    pub fn with_fallback_stagger(mut self, stagger: Duration) -> Self {
        self.fallback_stagger = stagger;
        self
    }
}

/// Resolves one address to a display name.
///
/// Order: primary username service → secondary name service → `"unknown"`.
/// Both lookups are coalesced and cached; empty answers are cached briefly,
/// failures not at all. Never returns an error.
#[derive(Clone)]
pub struct IdentityResolver {
    pub(crate) primary: Arc<dyn IdentityService>,
    pub(crate) secondary: Option<Arc<dyn NameService>>,
    pub(crate) usernames: SingleFlightCache<Option<String>>,
    pub(crate) basenames: SingleFlightCache<Option<String>>,
    pub(crate) primary_limiter: Arc<RateLimiter>,
    pub(crate) secondary_limiter: Arc<RateLimiter>,
    pub(crate) config: IdentityResolverConfig,
}

impl IdentityResolver {
    /// Creates a resolver.
    pub fn new(
        primary: Arc<dyn IdentityService>,
        secondary: Option<Arc<dyn NameService>>,
        config: IdentityResolverConfig,
        durable: DurableTier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let usernames = SingleFlightCache::new(
            USERNAME_KEY_PREFIX,
            TtlPolicy::identity(),
            durable.clone(),
            Arc::clone(&clock),
        );
        let basenames =
            SingleFlightCache::new(BASENAME_KEY_PREFIX, TtlPolicy::identity(), durable, clock);

        Self {
            primary,
            secondary,
            usernames,
            basenames,
            primary_limiter: Arc::new(RateLimiter::new("identity", config.min_interval)),
            secondary_limiter: Arc::new(RateLimiter::new("basename", config.min_interval)),
            config,
        }
    }

    /// Returns the resolver configuration.
    pub fn config(&self) -> &IdentityResolverConfig {
        &self.config
    }

    /// Resolves an address to a display name, or `"unknown"`.
    #[instrument(skip(self))]
    pub async fn resolve_one(&self, address: &str) -> String {
        let address = normalize_address(address);
        if address.is_empty() {
            return UNKNOWN_IDENTITY.to_string();
        }

        if let Some(name) = self.username(&address).await {
            return name;
        }
        if let Some(name) = self.basename(&address).await {
            return name;
        }

        debug!(address = %address, "No identity found");
        UNKNOWN_IDENTITY.to_string()
    }

    /// Primary lookup. Failures (rate limiting included) are logged and uncached.
    pub(crate) async fn username(&self, address: &str) -> Option<String> {
        let primary = Arc::clone(&self.primary);
        let limiter = Arc::clone(&self.primary_limiter);
        let key = address.to_string();

        let result = self
            .usernames
            .resolve(address, move || async move {
                limiter.gate().await;
                primary.username_by_address(&key).await
            })
            .await;

        match result {
            Ok(name) => name,
            Err(e) if e.is_rate_limited() => {
                warn!(address, "Identity service rate limited");
                None
            }
            Err(e) => {
                warn!(address, error = %e, "Identity lookup failed");
                None
            }
        }
    }

    /// Secondary lookup; `None` when no secondary service is configured.
    pub(crate) async fn basename(&self, address: &str) -> Option<String> {
        let secondary = Arc::clone(self.secondary.as_ref()?);
        let limiter = Arc::clone(&self.secondary_limiter);
        let key = address.to_string();

        let result = self
            .basenames
            .resolve(address, move || async move {
                limiter.gate().await;
                secondary.name_by_address(&key).await
            })
            .await;

        match result {
            Ok(name) => name,
            Err(e) => {
                warn!(address, error = %e, "Basename lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use curio_cache::MemoryStore;
    use curio_core::error::{CurioError, Result};
    use curio_core::types::BatchUsernames;
    use curio_core::{KeyValueStore, ManualClock};
    use futures::future::join_all;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counting identity service backed by a fixed table.
    #[derive(Default)]
    pub(crate) struct FakeIdentity {
        pub names: HashMap<String, String>,
        pub single_calls: AtomicUsize,
        pub batch_calls: AtomicUsize,
        pub rate_limited: AtomicBool,
        pub delay: Duration,
    }

    impl FakeIdentity {
        pub fn with_names(pairs: &[(&str, &str)]) -> Self {
            Self {
                names: pairs
                    .iter()
                    .map(|(a, n)| (a.to_string(), n.to_string()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl IdentityService for FakeIdentity {
        async fn username_by_address(&self, address: &str) -> Result<Option<String>> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.rate_limited.load(Ordering::SeqCst) {
                return Err(CurioError::RateLimited("fake".into()));
            }
            Ok(self.names.get(address).cloned())
        }

        async fn usernames_by_addresses(&self, addresses: &[String]) -> Result<BatchUsernames> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.rate_limited.load(Ordering::SeqCst) {
                return Ok(BatchUsernames {
                    rate_limited: true,
                    ..Default::default()
                });
            }
            let usernames = addresses
                .iter()
                .filter_map(|a| self.names.get(a).map(|n| (a.clone(), Some(n.clone()))))
                .collect();
            Ok(BatchUsernames {
                usernames,
                rate_limited: false,
            })
        }
    }

    /// Counting name service backed by a fixed table.
    #[derive(Default)]
    pub(crate) struct FakeNames {
        pub names: HashMap<String, String>,
        pub calls: AtomicUsize,
    }

    impl FakeNames {
        pub fn with_names(pairs: &[(&str, &str)]) -> Self {
            Self {
                names: pairs
                    .iter()
                    .map(|(a, n)| (a.to_string(), n.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NameService for FakeNames {
        async fn name_by_address(&self, address: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.names.get(address).cloned())
        }
    }

    pub(crate) fn resolver(
        primary: Arc<FakeIdentity>,
        secondary: Option<Arc<FakeNames>>,
        store: Arc<MemoryStore>,
    ) -> IdentityResolver {
        IdentityResolver::new(
            primary,
            secondary.map(|s| s as Arc<dyn NameService>),
            IdentityResolverConfig::unthrottled(),
            DurableTier::new(Some(store)),
            Arc::new(ManualClock::new(1_000_000)),
        )
    }

    #[tokio::test]
    async fn test_primary_hit() {
        let primary = Arc::new(FakeIdentity::with_names(&[("0xabc", "alice")]));
        let resolver = resolver(primary.clone(), None, Arc::new(MemoryStore::new()));

        assert_eq!(resolver.resolve_one("0xABC").await, "alice");
        assert_eq!(resolver.resolve_one("0xabc").await, "alice");
        assert_eq!(primary.single_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_coalesce() {
        let primary = Arc::new(FakeIdentity {
            delay: Duration::from_millis(30),
            ..FakeIdentity::with_names(&[("0xabc", "alice")])
        });
        let resolver = resolver(primary.clone(), None, Arc::new(MemoryStore::new()));

        let names = join_all((0..8).map(|_| resolver.resolve_one("0xabc"))).await;

        assert!(names.iter().all(|n| n == "alice"));
        assert_eq!(primary.single_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary_then_unknown() {
        let primary = Arc::new(FakeIdentity::default());
        let secondary = Arc::new(FakeNames::with_names(&[("0xb", "bob.base.eth")]));
        let resolver = resolver(primary, Some(secondary.clone()), Arc::new(MemoryStore::new()));

        assert_eq!(resolver.resolve_one("0xb").await, "bob.base.eth");
        assert_eq!(resolver.resolve_one("0xc").await, UNKNOWN_IDENTITY);
        assert_eq!(resolver.resolve_one("").await, UNKNOWN_IDENTITY);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_result_is_cached() {
        let primary = Arc::new(FakeIdentity::default());
        let secondary = Arc::new(FakeNames::default());
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(primary.clone(), Some(secondary.clone()), store.clone());

        resolver.resolve_one("0xabc").await;
        resolver.resolve_one("0xabc").await;

        assert_eq!(primary.single_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
        assert!(store.get("identity:username:0xabc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rate_limited_lookup_is_not_cached() {
        let primary = Arc::new(FakeIdentity::with_names(&[("0xabc", "alice")]));
        primary.rate_limited.store(true, Ordering::SeqCst);
        let resolver = resolver(primary.clone(), None, Arc::new(MemoryStore::new()));

        assert_eq!(resolver.resolve_one("0xabc").await, UNKNOWN_IDENTITY);

        primary.rate_limited.store(false, Ordering::SeqCst);
        assert_eq!(resolver.resolve_one("0xabc").await, "alice");
        assert_eq!(primary.single_calls.load(Ordering::SeqCst), 2);
    }
}
