//! Contract → authorial address, cached.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use curio_cache::{DurableTier, SingleFlightCache, TtlPolicy};
use curio_core::constants::{LEDGER_READ_DELAY, OWNER_KEY_PREFIX, ZERO_ADDRESS};
use curio_core::error::{CurioError, Result};
use curio_core::traits::{Clock, LedgerReader};
use curio_core::types::normalize_address;

use crate::retry::{retry_with_backoff, RetryPolicy};

/// Owner resolver configuration.
#[derive(Clone, Copy, Debug)]
pub struct OwnerResolverConfig {
    /// Pause before every ledger read
    pub read_delay: Duration,
    /// Retry policy for one resolution
    pub retry: RetryPolicy,
}

impl Default for OwnerResolverConfig {
    fn default() -> Self {
        Self {
            read_delay: LEDGER_READ_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

impl OwnerResolverConfig {
    /// Same attempt count, no pauses.
    pub fn unpaced() -> Self {
        Self {
            read_delay: Duration::ZERO,
            retry: RetryPolicy::immediate(RetryPolicy::default().attempts),
        }
    }
}

/// Resolves the authorial address of a contract.
///
/// Successful answers are cached in both tiers for a day. Failures are
/// never cached: the next request goes back to the ledger.
#[derive(Clone)]
pub struct ContractOwnerResolver {
    ledger: Arc<dyn LedgerReader>,
    cache: SingleFlightCache<String>,
    config: OwnerResolverConfig,
}

impl ContractOwnerResolver {
    /// Creates a resolver.
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        config: OwnerResolverConfig,
        durable: DurableTier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            cache: SingleFlightCache::new(OWNER_KEY_PREFIX, TtlPolicy::owner(), durable, clock),
            config,
        }
    }

    /// Returns the owner of `contract_ref`.
    #[instrument(skip(self))]
    pub async fn resolve_owner(&self, contract_ref: &str) -> Result<String> {
        let contract = normalize_address(contract_ref);
        if contract.is_empty() {
            return Err(CurioError::ValidationError("empty contract reference".into()));
        }

        let ledger = Arc::clone(&self.ledger);
        let config = self.config;
        let key = contract.clone();

        self.cache
            .resolve(&contract, move || async move {
                retry_with_backoff(&config.retry, &key, || {
                    let ledger = Arc::clone(&ledger);
                    let key = key.clone();
                    async move {
                        if !config.read_delay.is_zero() {
                            tokio::time::sleep(config.read_delay).await;
                        }
                        let owner = ledger.owner_of(&key).await?;
                        checked_owner(&key, &owner)
                    }
                })
                .await
            })
            .await
    }

    /// Like [`resolve_owner`](Self::resolve_owner), degrading to the empty owner.
    pub async fn resolve_owner_or_empty(&self, contract_ref: &str) -> String {
        match self.resolve_owner(contract_ref).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!(contract_ref, error = %e, "Owner unresolved");
                String::new()
            }
        }
    }

    /// Returns the cached owner without touching the ledger.
    pub async fn cached_owner(&self, contract_ref: &str) -> Option<String> {
        self.cache.peek(&normalize_address(contract_ref)).await
    }
}

fn checked_owner(contract: &str, owner: &str) -> Result<String> {
    let owner = normalize_address(owner);
    if owner.is_empty() || owner == ZERO_ADDRESS {
        debug!(contract, "Ledger returned no owner");
        return Err(CurioError::NotFound(format!("owner of {}", contract)));
    }
    Ok(owner)
}
