//! In-memory TTL cache tier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use curio_core::constants::{DEFAULT_MEMORY_CAPACITY, IDENTITY_MEMORY_TTL};
use curio_core::Clock;

#[derive(Clone)]
struct Slot<V> {
    value: V,
    stored_at: u64,
    expires_at: u64,
}

/// Sizing and default lifetime of a [`MemoryTier`].
#[derive(Clone, Copy, Debug)]
pub struct MemoryTierConfig {
    /// Entries kept before the oldest is evicted
    pub capacity: usize,
    /// Lifetime used by [`MemoryTier::insert`]
    pub default_ttl: Duration,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MEMORY_CAPACITY,
            default_ttl: IDENTITY_MEMORY_TTL,
        }
    }
}

/// Bounded map with per-entry expiry, keyed by normalised strings.
///
/// Time comes from the injected [`Clock`]. When full, expired entries are
/// swept first; if that frees nothing the oldest entry goes.
pub struct MemoryTier<V> {
    slots: RwLock<HashMap<String, Slot<V>>>,
    config: MemoryTierConfig,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> MemoryTier<V> {
    /// Creates an empty tier.
    pub fn new(config: MemoryTierConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            config: MemoryTierConfig {
                capacity: config.capacity.max(1),
                ..config
            },
            clock,
        }
    }

    /// Returns the live value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        self.slots
            .read()
            .get(&normalize_key(key))
            .filter(|slot| now < slot.expires_at)
            .map(|slot| slot.value.clone())
    }

    /// Stores a value for the default lifetime.
    pub fn insert(&self, key: &str, value: V) {
        self.insert_for(key, value, self.config.default_ttl);
    }

    /// Stores a value for `ttl`.
    pub fn insert_for(&self, key: &str, value: V, ttl: Duration) {
        let key = normalize_key(key);
        let now = self.clock.now_ms();
        let mut slots = self.slots.write();

        if slots.len() >= self.config.capacity && !slots.contains_key(&key) {
            slots.retain(|_, slot| now < slot.expires_at);
            if slots.len() >= self.config.capacity {
                let oldest = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    slots.remove(&oldest);
                }
            }
        }

        slots.insert(
            key,
            Slot {
                value,
                stored_at: now,
                expires_at: now.saturating_add(ttl.as_millis() as u64),
            },
        );
    }

    /// Drops the entry for `key`.
    pub fn remove(&self, key: &str) {
        self.slots.write().remove(&normalize_key(key));
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.slots.write().clear();
    }

    /// Entries held, expired or not.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// True if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

pub(crate) fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}
