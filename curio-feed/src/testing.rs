//! Counting fakes shared by the aggregator and driver tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use curio_cache::{DurableTier, MemoryStore};
use curio_core::error::{CurioError, Result};
use curio_core::traits::{
    CandidateSource, Clock, IdentityService, KeyValueStore, LedgerReader, MetadataSource,
};
use curio_core::types::{BatchUsernames, ItemConfig, ItemKey, ItemMetadata};
use curio_core::ManualClock;
use curio_identity::{BatchIdentityResolver, IdentityResolver, IdentityResolverConfig};
use curio_ledger::{ContractOwnerResolver, OwnerResolverConfig};

use crate::aggregator::{FeedAggregator, FeedServices};
use crate::config::FeedConfig;
use crate::sources::StaticCandidateSource;

/// `count` configs spread over four contracts `0xc0`..`0xc3`.
pub fn configs(count: usize) -> Vec<ItemConfig> {
    (0..count)
        .map(|i| ItemConfig::new(format!("0xC{}", i % 4), i.to_string()))
        .collect()
}

/// Owner of `0xcN` is `0xcN-owner`.
#[derive(Default)]
pub struct FakeLedger {
    pub reads: AtomicUsize,
}

#[async_trait]
impl LedgerReader for FakeLedger {
    async fn owner_of(&self, contract_ref: &str) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-owner", contract_ref))
    }

    async fn metadata_uri_of(&self, _contract_ref: &str, _item_id: &str) -> Result<String> {
        Err(CurioError::InternalError("unused".into()))
    }
}

/// `0xc0-owner` is alice and `0xc1-owner` is bob; nobody else has a name.
#[derive(Default)]
pub struct FakeIdentity {
    pub batch_calls: AtomicUsize,
}

impl FakeIdentity {
    fn name(address: &str) -> Option<String> {
        match address {
            "0xc0-owner" => Some("alice".into()),
            "0xc1-owner" => Some("bob".into()),
            _ => None,
        }
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn username_by_address(&self, address: &str) -> Result<Option<String>> {
        Ok(Self::name(address))
    }

    async fn usernames_by_addresses(&self, addresses: &[String]) -> Result<BatchUsernames> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BatchUsernames {
            usernames: addresses
                .iter()
                .map(|a| (a.clone(), Self::name(a)))
                .collect(),
            rate_limited: false,
        })
    }
}

/// Metadata named `Piece N`; keys in `failing` return an error.
#[derive(Default)]
pub struct FakeMetadata {
    pub failing: Mutex<HashSet<ItemKey>>,
    pub calls: Mutex<HashMap<ItemKey, usize>>,
    pub delay: Duration,
}

impl FakeMetadata {
    pub fn failing(keys: &[ItemConfig]) -> Self {
        Self {
            failing: Mutex::new(keys.iter().map(ItemConfig::key).collect()),
            ..Default::default()
        }
    }

    pub fn calls_for(&self, config: &ItemConfig) -> usize {
        self.calls.lock().get(&config.key()).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn recover(&self) {
        self.failing.lock().clear();
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn fetch_item_metadata(&self, config: &ItemConfig) -> Result<ItemMetadata> {
        let key = config.key();
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.lock().contains(&key) {
            return Err(CurioError::AllGatewaysFailed {
                attempts: 2,
                last_error: "HTTP 502".into(),
            });
        }
        Ok(ItemMetadata {
            name: Some(format!("Piece {}", config.item_id)),
            image: Some(format!("ipfs://image-{}", config.item_id)),
            ..Default::default()
        })
    }
}

/// Candidate source that always fails.
pub struct BrokenCandidates;

#[async_trait]
impl CandidateSource for BrokenCandidates {
    async fn candidate_list(&self) -> Result<Vec<ItemConfig>> {
        Err(CurioError::HttpError("candidates returned 500".into()))
    }
}

/// Collaborators of one test feed.
pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub identity: Arc<FakeIdentity>,
    pub metadata: Arc<FakeMetadata>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: FeedConfig,
}

impl Harness {
    pub fn new(metadata: FakeMetadata) -> Self {
        Self {
            ledger: Arc::new(FakeLedger::default()),
            identity: Arc::new(FakeIdentity::default()),
            metadata: Arc::new(metadata),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::new(1_000_000)),
            config: FeedConfig::unpaced(),
        }
    }

    pub fn feed(&self, configs: Vec<ItemConfig>) -> FeedAggregator {
        self.feed_from(Arc::new(StaticCandidateSource::new(configs)))
    }

    pub fn feed_from(&self, candidates: Arc<dyn CandidateSource>) -> FeedAggregator {
        self.build(candidates, self.clock.clone())
    }

    /// A feed whose timers run on `clock` instead of the manual clock.
    pub fn feed_on(&self, configs: Vec<ItemConfig>, clock: Arc<dyn Clock>) -> FeedAggregator {
        self.build(Arc::new(StaticCandidateSource::new(configs)), clock)
    }

    fn build(&self, candidates: Arc<dyn CandidateSource>, clock: Arc<dyn Clock>) -> FeedAggregator {
        let durable = DurableTier::new(Some(Arc::clone(&self.store) as Arc<dyn KeyValueStore>));

        let owners = ContractOwnerResolver::new(
            self.ledger.clone(),
            OwnerResolverConfig::unpaced(),
            durable.clone(),
            Arc::clone(&clock),
        );
        let identities = BatchIdentityResolver::new(IdentityResolver::new(
            self.identity.clone(),
            None,
            IdentityResolverConfig::unthrottled(),
            durable.clone(),
            Arc::clone(&clock),
        ));

        FeedAggregator::new(
            FeedServices {
                candidates,
                owners,
                identities,
                metadata: self.metadata.clone(),
            },
            self.config.clone(),
            durable,
            clock,
        )
    }
}
