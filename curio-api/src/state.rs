//! App state: resolvers, feed, allowlist, config.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use curio_cache::{DurableTier, FileStore, MemoryStore};
use curio_core::constants::{DEFAULT_IPFS_GATEWAYS, DEFAULT_RPC_URL};
use curio_core::error::Result;
use curio_core::traits::{Allowlist, Clock, KeyValueStore, LedgerReader, NameService};
use curio_core::types::normalize_address;
use curio_core::SystemClock;
use curio_feed::{
    FeedAggregator, FeedConfig, FeedServices, HostEnvironment, HttpCandidateSource,
    LedgerMetadataSource,
};
use curio_gateway::{GatewayConfig, MetadataClient};
use curio_identity::{
    BasenameClient, BatchIdentityResolver, HttpIdentityClient, IdentityResolver,
    IdentityResolverConfig,
};
use curio_ledger::{ContractOwnerResolver, JsonRpcLedger, OwnerResolverConfig};

const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8787";
const DEFAULT_APP_URL: &str = "http://localhost:3000";

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Primary identity service base URL
    pub identity_url: String,
    /// Secondary name service base URL
    pub basename_url: Option<String>,
    /// Candidate list base URL
    pub candidates_url: String,
    /// JSON-RPC endpoint for ledger reads
    pub rpc_url: String,
    /// IPFS gateways, tried in order
    pub ipfs_gateways: Vec<String>,
    /// JSON file backing the durable tier; in-memory when unset
    pub store_path: Option<PathBuf>,
    /// Addresses on the allowlist
    pub allowlist: Vec<String>,
    /// Public URL of the app, used in share links
    pub app_url: String,
    /// Embedding host, if the app runs inside one
    pub host: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            identity_url: DEFAULT_SERVICE_URL.into(),
            basename_url: None,
            candidates_url: DEFAULT_SERVICE_URL.into(),
            rpc_url: DEFAULT_RPC_URL.into(),
            ipfs_gateways: DEFAULT_IPFS_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            store_path: None,
            allowlist: Vec::new(),
            app_url: DEFAULT_APP_URL.into(),
            host: None,
        }
    }
}

impl ApiConfig {
    /// Reads `CURIO_*` variables, loading `.env` first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            identity_url: var("CURIO_IDENTITY_URL").unwrap_or(defaults.identity_url),
            basename_url: var("CURIO_BASENAME_URL"),
            candidates_url: var("CURIO_CANDIDATES_URL").unwrap_or(defaults.candidates_url),
            rpc_url: var("CURIO_RPC_URL").unwrap_or(defaults.rpc_url),
            ipfs_gateways: var("CURIO_GATEWAYS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.ipfs_gateways),
            store_path: var("CURIO_STORE_PATH").map(PathBuf::from),
            allowlist: var("CURIO_ALLOWLIST")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            app_url: var("CURIO_APP_URL").unwrap_or(defaults.app_url),
            host: var("CURIO_HOST"),
        }
    }

    /// Gateway configuration for metadata fetches.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default().with_ipfs_gateways(self.ipfs_gateways.clone())
    }
}

/// Splits a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Fixed allowlist of addresses.
#[derive(Clone, Debug, Default)]
pub struct StaticAllowlist {
    members: HashSet<String>,
}

impl StaticAllowlist {
    /// Creates an allowlist; addresses are normalised.
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            members: members
                .into_iter()
                .map(|m| normalize_address(m.as_ref()))
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if nobody is on the list.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl Allowlist for StaticAllowlist {
    async fn is_member(&self, address: &str) -> Result<bool> {
        Ok(self.members.contains(&normalize_address(address)))
    }
}

/// Shared state of the API handlers.
pub struct AppState {
    /// Server configuration
    pub config: ApiConfig,
    /// The feed
    pub feed: Arc<FeedAggregator>,
    /// Address → display name
    pub identities: BatchIdentityResolver,
    /// Contract → author address
    pub owners: ContractOwnerResolver,
    /// Membership check
    pub allowlist: Arc<dyn Allowlist>,
    /// Where the presentation layer runs
    pub environment: HostEnvironment,
    /// When the state was assembled; uptime counts from here
    pub started_at: Instant,
}

impl AppState {
    /// Assembles state from already-built components.
    pub fn new(
        config: ApiConfig,
        feed: Arc<FeedAggregator>,
        identities: BatchIdentityResolver,
        owners: ContractOwnerResolver,
        allowlist: Arc<dyn Allowlist>,
    ) -> Self {
        let environment = HostEnvironment::from_host(config.host.as_deref());
        Self {
            config,
            feed,
            identities,
            owners,
            allowlist,
            environment,
            started_at: Instant::now(),
        }
    }

    /// Builds every component from configuration, with HTTP-backed collaborators.
    pub async fn from_config(config: ApiConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = match &config.store_path {
            Some(path) => Arc::new(FileStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };
        let durable = DurableTier::new(Some(store));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let ledger: Arc<dyn LedgerReader> = Arc::new(JsonRpcLedger::new(config.rpc_url.clone())?);
        let owners = ContractOwnerResolver::new(
            Arc::clone(&ledger),
            OwnerResolverConfig::default(),
            durable.clone(),
            Arc::clone(&clock),
        );

        let secondary: Option<Arc<dyn NameService>> = match &config.basename_url {
            Some(url) => Some(Arc::new(BasenameClient::new(url.clone())?)),
            None => None,
        };
        let identities = BatchIdentityResolver::new(IdentityResolver::new(
            Arc::new(HttpIdentityClient::new(config.identity_url.clone())?),
            secondary,
            IdentityResolverConfig::default(),
            durable.clone(),
            Arc::clone(&clock),
        ));

        let metadata = MetadataClient::with_config(config.gateway_config())?;
        let services = FeedServices {
            candidates: Arc::new(HttpCandidateSource::new(config.candidates_url.clone())?),
            owners: owners.clone(),
            identities: identities.clone(),
            metadata: Arc::new(LedgerMetadataSource::new(ledger, metadata)),
        };
        let feed = FeedAggregator::new(services, FeedConfig::default(), durable, clock);

        let allowlist = Arc::new(StaticAllowlist::new(&config.allowlist));
        Ok(Self::new(config, Arc::new(feed), identities, owners, allowlist))
    }

    /// Writes out the shared durable store.
    pub async fn flush(&self) {
        self.feed.flush().await;
    }
}
