//! Pipeline constants for Curio.
//!
//! Every timing and sizing default used by the resolvers and the feed
//! aggregator lives here so the `*Config` defaults agree with each other.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// FEED PAGINATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Number of candidate configs resolved per `load_more` window.
pub const PAGE_SIZE: usize = 8;

/// Attempts allowed for an item in the failure retry queue before it is dropped.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the failure queue is drained after it was (re)armed.
pub const FAILURE_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Delay before the background driver asks for the next window.
pub const CONTINUATION_DELAY: Duration = Duration::from_millis(1500);

/// Delay preceding each sequential metadata fetch within a window.
pub const INTER_ITEM_DELAY: Duration = Duration::from_millis(50);

/// Start offset between owner lookups of one window (`index × stagger`).
pub const OWNER_STAGGER: Duration = Duration::from_millis(30);

/// Configs scanned when loading items for one artist.
pub const ARTIST_SCAN_LIMIT: usize = 50;

/// Matches loaded for one artist query.
pub const ARTIST_MATCH_LIMIT: usize = 8;

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE LIFETIMES
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory lifetime of a resolved identity.
pub const IDENTITY_MEMORY_TTL: Duration = Duration::from_secs(10 * 60);

/// Durable lifetime of a resolved identity.
pub const IDENTITY_DURABLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifetime of an identity lookup that returned nothing (both tiers).
pub const IDENTITY_NEGATIVE_TTL: Duration = Duration::from_secs(5 * 60);

/// Lifetime of a resolved contract owner (both tiers).
pub const OWNER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifetime of persisted feed state.
pub const FEED_STATE_TTL: Duration = Duration::from_secs(30 * 60);

/// Lifetime of a persisted per-item author record.
pub const AUTHOR_RECORD_TTL: Duration = Duration::from_secs(30 * 60);

/// Default capacity of an in-memory cache tier.
pub const DEFAULT_MEMORY_CAPACITY: usize = 5_000;

// ═══════════════════════════════════════════════════════════════════════════════
// UPSTREAM PACING
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum spacing between calls to the identity service.
pub const IDENTITY_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Maximum addresses per batch identity request.
pub const IDENTITY_BATCH_CHUNK: usize = 100;

/// Delay between individual secondary-service lookups after a batch miss.
pub const FALLBACK_STAGGER: Duration = Duration::from_millis(100);

/// Fixed delay preceding every ledger read.
pub const LEDGER_READ_DELAY: Duration = Duration::from_millis(100);

/// Ledger read attempts before an owner lookup fails.
pub const OWNER_RETRY_ATTEMPTS: u32 = 3;

/// Base delay of the owner lookup backoff; doubles per attempt.
pub const OWNER_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Per-attempt timeout for a metadata gateway request.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for identity and JSON-RPC requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

// ═══════════════════════════════════════════════════════════════════════════════
// FALLBACK VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Display name used when no identity service knows an address.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Name shown for an item whose metadata has no name.
pub const UNTITLED_ITEM: &str = "Untitled";

/// Image shown for an item whose metadata has no image.
pub const PLACEHOLDER_IMAGE_URL: &str = "/placeholder.png";

/// The zero address; an owner read returning it is treated as unresolved.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// ═══════════════════════════════════════════════════════════════════════════════
// NETWORK DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// IPFS gateways tried in order for `ipfs://` metadata.
pub const DEFAULT_IPFS_GATEWAYS: &[&str] = &[
    "https://ipfs.io",
    "https://cloudflare-ipfs.com",
    "https://dweb.link",
    "https://gateway.pinata.cloud",
];

/// Gateway for `ar://` metadata.
pub const ARWEAVE_GATEWAY: &str = "https://arweave.net";

/// Default JSON-RPC endpoint for ledger reads.
pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTED KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Namespace for primary identity lookups.
pub const USERNAME_KEY_PREFIX: &str = "identity:username:";

/// Namespace for secondary (basename) identity lookups.
pub const BASENAME_KEY_PREFIX: &str = "identity:basename:";

/// Namespace for contract owner lookups.
pub const OWNER_KEY_PREFIX: &str = "owner:";

/// Key of the persisted feed state.
pub const FEED_STATE_KEY: &str = "feed:state";

/// Namespace for per-item author records.
pub const AUTHOR_KEY_PREFIX: &str = "feed:author:";

// ═══════════════════════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Stamped entries older than this are swept from a file store.
/// Matches the longest durable lifetime.
pub const STORE_RETENTION: Duration = IDENTITY_DURABLE_TTL;

/// Writes gathered before a file store is rewritten.
pub const STORE_FLUSH_DELAY: Duration = Duration::from_millis(250);

/// Minimum time between sweeps of a file store.
pub const STORE_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
