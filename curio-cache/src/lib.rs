//! Caching for Curio lookups.
//!
//! - [`MemoryTier`]: bounded in-memory map with per-entry expiry
//! - [`SingleFlightCache`]: memory + durable tiers with request coalescing
//! - [`MemoryStore`] / [`FileStore`]: [`KeyValueStore`](curio_core::KeyValueStore) backends

mod durable;
mod single_flight;
mod store;
mod ttl;

pub use durable::DurableTier;
pub use single_flight::{CacheValue, SingleFlightCache, TtlPolicy};
pub use store::{FileStore, FileStoreConfig, MemoryStore};
pub use ttl::{MemoryTier, MemoryTierConfig};
