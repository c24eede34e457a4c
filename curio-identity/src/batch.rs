//! Many addresses → display names, in chunked batch calls.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, instrument, warn};

use curio_core::constants::UNKNOWN_IDENTITY;
use curio_core::types::normalize_address;

use crate::resolver::IdentityResolver;

type NameMap = HashMap<String, String>;
type SharedBatch = Shared<BoxFuture<'static, Arc<NameMap>>>;

/// Outcome of the cache pass for one address.
enum Cached {
    Name(String),
    Unknown,
    /// Primary already answered "none"; only the secondary remains
    NeedsFallback,
    Miss,
}

/// Batch front end over an [`IdentityResolver`].
///
/// Shares the resolver's caches, so a name learned by either path is seen
/// by both. Identical concurrent batches (same address set) run once.
#[derive(Clone)]
pub struct BatchIdentityResolver {
    resolver: IdentityResolver,
    pending: Arc<DashMap<String, SharedBatch>>,
}

impl BatchIdentityResolver {
    /// Wraps a resolver.
    pub fn new(resolver: IdentityResolver) -> Self {
        Self {
            resolver,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Returns the single-address resolver.
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Resolves one address. See [`IdentityResolver::resolve_one`].
    pub async fn resolve_one(&self, address: &str) -> String {
        self.resolver.resolve_one(address).await
    }

    /// Resolves many addresses.
    ///
    /// Keys of the returned map are normalised addresses; every non-empty
    /// input address has an entry.
    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    pub async fn resolve_many(&self, addresses: &[String]) -> NameMap {
        let unique: BTreeSet<String> = addresses
            .iter()
            .map(|a| normalize_address(a))
            .filter(|a| !a.is_empty())
            .collect();

        let mut names = NameMap::with_capacity(unique.len());
        let mut to_fetch = Vec::new();
        let mut fallback_only = Vec::new();

        for address in unique {
            match self.cached(&address).await {
                Cached::Name(name) => {
                    names.insert(address, name);
                }
                Cached::Unknown => {
                    names.insert(address, UNKNOWN_IDENTITY.to_string());
                }
                Cached::NeedsFallback => fallback_only.push(address),
                Cached::Miss => to_fetch.push(address),
            }
        }

        debug!(
            cached = names.len(),
            to_fetch = to_fetch.len(),
            fallback_only = fallback_only.len(),
            "Partitioned batch"
        );

        if to_fetch.is_empty() && fallback_only.is_empty() {
            return names;
        }

        let fetched = self.fetch_coalesced(to_fetch, fallback_only).await;
        names.extend(fetched.iter().map(|(a, n)| (a.clone(), n.clone())));
        names
    }

    async fn cached(&self, address: &str) -> Cached {
        match self.resolver.usernames.peek(address).await {
            Some(Some(name)) => Cached::Name(name),
            Some(None) if self.resolver.secondary.is_none() => Cached::Unknown,
            Some(None) => match self.resolver.basenames.peek(address).await {
                Some(Some(name)) => Cached::Name(name),
                Some(None) => Cached::Unknown,
                None => Cached::NeedsFallback,
            },
            None => Cached::Miss,
        }
    }

    async fn fetch_coalesced(&self, to_fetch: Vec<String>, fallback_only: Vec<String>) -> Arc<NameMap> {
        let mut key_parts: Vec<&str> = to_fetch
            .iter()
            .chain(fallback_only.iter())
            .map(String::as_str)
            .collect();
        key_parts.sort_unstable();
        let batch_key = key_parts.join(",");

        let shared = match self.pending.entry(batch_key.clone()) {
            Entry::Occupied(pending) => {
                debug!("Joining in-flight batch");
                pending.get().clone()
            }
            Entry::Vacant(slot) => {
                let resolver = self.resolver.clone();
                let pending = Arc::clone(&self.pending);
                let task_key = batch_key.clone();
                let handle = tokio::spawn(async move {
                    let names = fetch_batch(&resolver, to_fetch, fallback_only).await;
                    pending.remove(&task_key);
                    Arc::new(names)
                });

                let batch: SharedBatch = async move {
                    match handle.await {
                        Ok(names) => names,
                        Err(e) => {
                            warn!(error = %e, "Batch task failed");
                            Arc::new(NameMap::new())
                        }
                    }
                }
                .boxed()
                .shared();

                slot.insert(batch.clone());
                batch
            }
        };

        shared.await
    }
}

/// Runs the chunked primary calls, then the staggered secondary retries.
async fn fetch_batch(
    resolver: &IdentityResolver,
    to_fetch: Vec<String>,
    mut fallback: Vec<String>,
) -> NameMap {
    let mut names = NameMap::new();

    for chunk in to_fetch.chunks(resolver.config.batch_chunk) {
        resolver.primary_limiter.gate().await;

        let batch = match resolver.primary.usernames_by_addresses(chunk).await {
            Ok(batch) if !batch.rate_limited => batch,
            Ok(_) => {
                warn!(size = chunk.len(), "Batch rate limited");
                mark_unknown(&mut names, chunk);
                continue;
            }
            Err(e) if e.is_rate_limited() => {
                warn!(size = chunk.len(), "Batch rate limited");
                mark_unknown(&mut names, chunk);
                continue;
            }
            Err(e) => {
                warn!(size = chunk.len(), error = %e, "Batch lookup failed");
                fallback.extend(chunk.iter().cloned());
                continue;
            }
        };

        for address in chunk {
            match batch.get(address) {
                Some(name) => {
                    resolver.usernames.put(address, Some(name.to_string())).await;
                    names.insert(address.clone(), name.to_string());
                }
                None => {
                    resolver.usernames.put(address, None).await;
                    fallback.push(address.clone());
                }
            }
        }
    }

    for (i, address) in fallback.into_iter().enumerate() {
        if i > 0 && !resolver.config.fallback_stagger.is_zero() {
            tokio::time::sleep(resolver.config.fallback_stagger).await;
        }
        let name = resolver
            .basename(&address)
            .await
            .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string());
        names.insert(address, name);
    }

    info!(resolved = names.len(), "Batch resolved");
    names
}

fn mark_unknown(names: &mut NameMap, chunk: &[String]) {
    for address in chunk {
        names.insert(address.clone(), UNKNOWN_IDENTITY.to_string());
    }
}
