//! Collaborator traits for Curio.
//!
//! These traits mark the boundary between the pipeline and everything it
//! consumes: identity services, the ledger, the candidate list, metadata
//! documents, persistence and time. Production code wires HTTP clients in;
//! tests wire counting fakes in.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BatchUsernames, ItemConfig, ItemMetadata};

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTITY SERVICES
// ═══════════════════════════════════════════════════════════════════════════════

/// Primary identity service: address → username.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Looks up the username registered for one address.
    ///
    /// Returns `Ok(None)` when the address has no username and
    /// `Err(CurioError::RateLimited)` when the service refused the call.
    async fn username_by_address(&self, address: &str) -> Result<Option<String>>;

    /// Looks up usernames for many addresses in one request.
    async fn usernames_by_addresses(&self, addresses: &[String]) -> Result<BatchUsernames>;
}

/// Secondary identity service: address → on-chain name.
#[async_trait]
pub trait NameService: Send + Sync {
    /// Looks up the name registered for one address.
    async fn name_by_address(&self, address: &str) -> Result<Option<String>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER & CONTENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Read access to ledger state.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Returns the authorial address of a contract.
    async fn owner_of(&self, contract_ref: &str) -> Result<String>;

    /// Returns the metadata URI of one item.
    async fn metadata_uri_of(&self, contract_ref: &str, item_id: &str) -> Result<String>;
}

/// Source of an item's metadata document.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetches and parses the metadata of one item.
    async fn fetch_item_metadata(&self, config: &ItemConfig) -> Result<ItemMetadata>;

    /// Rewrites an image URI into something a client can display.
    fn display_image_url(&self, image: &str) -> String {
        image.to_string()
    }
}

/// The authoritative list of feed candidates.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Returns every candidate config.
    async fn candidate_list(&self) -> Result<Vec<ItemConfig>>;
}

/// Boolean membership check against an authorization list.
#[async_trait]
pub trait Allowlist: Send + Sync {
    /// Returns true if the address is on the list.
    async fn is_member(&self, address: &str) -> Result<bool>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE & TIME
// ═══════════════════════════════════════════════════════════════════════════════

/// Durable string key-value store.
///
/// Values are opaque JSON blobs. Implementations might use:
/// - In-memory storage (for testing)
/// - A JSON file (single-process deployments)
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Deletes a value. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Writes out anything buffered. Write-through stores keep the default.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time in epoch milliseconds.
    fn now_ms(&self) -> u64;
}
