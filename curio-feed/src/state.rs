//! Persisted feed state and per-item author records.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use curio_cache::DurableTier;
use curio_core::constants::{AUTHOR_KEY_PREFIX, FEED_STATE_KEY};
use curio_core::traits::Clock;
use curio_core::types::{AuthorRecord, CacheEntry, FeedState, ItemKey};

/// Saves and restores the aggregator's working set.
#[derive(Clone)]
pub struct FeedStateStore {
    durable: DurableTier,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl FeedStateStore {
    /// Creates a store over a durable tier.
    pub fn new(durable: DurableTier, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            durable,
            clock,
            ttl,
        }
    }

    /// Returns the saved state if it exists, is valid and is younger than the TTL.
    ///
    /// Expired or invalid state is deleted.
    pub async fn load(&self) -> Option<FeedState> {
        let state: FeedState = self.durable.read(FEED_STATE_KEY).await?;
        let now = self.clock.now_ms();

        if !state.is_fresh(now, self.ttl) {
            debug!(age_ms = now.saturating_sub(state.timestamp), "Feed state expired");
            self.durable.delete(FEED_STATE_KEY).await;
            return None;
        }
        if let Err(e) = state.validate() {
            warn!(error = %e, "Discarding invalid feed state");
            self.durable.delete(FEED_STATE_KEY).await;
            return None;
        }

        Some(state)
    }

    /// Saves the state, stamping it with the current time.
    pub async fn save(&self, mut state: FeedState) {
        state.timestamp = self.clock.now_ms();
        self.durable.write(FEED_STATE_KEY, &state).await;
    }

    /// Writes out anything the durable store buffered.
    pub async fn flush(&self) {
        self.durable.flush().await;
    }
}

/// Author records keyed by item, in memory and in the durable tier.
#[derive(Clone)]
pub struct AuthorCache {
    memory: Arc<RwLock<HashMap<ItemKey, CacheEntry<AuthorRecord>>>>,
    durable: DurableTier,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl AuthorCache {
    /// Creates an author cache.
    pub fn new(durable: DurableTier, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            memory: Arc::new(RwLock::new(HashMap::new())),
            durable,
            clock,
            ttl,
        }
    }

    /// Returns a fresh record for the item, if one exists.
    pub async fn get(&self, key: &ItemKey) -> Option<AuthorRecord> {
        let now = self.clock.now_ms();
        if let Some(record) = self.memory_hit(key, now) {
            return Some(record);
        }

        let storage_key = storage_key(key);
        let entry: CacheEntry<AuthorRecord> = self.durable.read(&storage_key).await?;
        if !entry.is_fresh(now, self.ttl) {
            self.durable.delete(&storage_key).await;
            return None;
        }

        let record = entry.value.clone();
        self.memory.write().insert(key.clone(), entry);
        Some(record)
    }

    fn memory_hit(&self, key: &ItemKey, now: u64) -> Option<AuthorRecord> {
        {
            let memory = self.memory.read();
            let entry = memory.get(key)?;
            if entry.is_fresh(now, self.ttl) {
                return Some(entry.value.clone());
            }
        }

        let mut memory = self.memory.write();
        if memory.get(key).is_some_and(|entry| !entry.is_fresh(now, self.ttl)) {
            memory.remove(key);
        }
        None
    }

    /// Stores a record. Records without an address are not kept.
    pub async fn put(&self, key: &ItemKey, record: AuthorRecord) {
        if record.author_address.is_empty() {
            return;
        }
        let now = self.clock.now_ms();
        let entry = CacheEntry::new(record, now);
        {
            let mut memory = self.memory.write();
            memory.retain(|_, held| held.is_fresh(now, self.ttl));
            memory.insert(key.clone(), entry.clone());
        }
        self.durable.write(&storage_key(key), &entry).await;
    }

    /// Number of records held in memory. Expired records go on lookup or
    /// on the next store.
    pub fn len(&self) -> usize {
        self.memory.read().len()
    }

    /// Returns true if no record is held in memory.
    pub fn is_empty(&self) -> bool {
        self.memory.read().is_empty()
    }
}

fn storage_key(key: &ItemKey) -> String {
    format!("{}{}", AUTHOR_KEY_PREFIX, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_cache::{FileStore, FileStoreConfig, MemoryStore};
    use curio_core::types::ItemConfig;
    use curio_core::{KeyValueStore, ManualClock};

    const MINUTE: Duration = Duration::from_secs(60);

    fn tier(store: &Arc<MemoryStore>) -> DurableTier {
        DurableTier::new(Some(Arc::clone(store) as Arc<dyn KeyValueStore>))
    }

    fn record(address: &str) -> AuthorRecord {
        AuthorRecord {
            author_address: address.into(),
            author_display_name: "alice".into(),
        }
    }

    #[tokio::test]
    async fn test_state_round_trip_and_expiry() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let states = FeedStateStore::new(tier(&store), clock.clone(), 30 * MINUTE);

        states
            .save(FeedState {
                all_configs: vec![ItemConfig::new("0xa", "1")],
                cursor: 1,
                ..Default::default()
            })
            .await;

        clock.advance(29 * MINUTE);
        let restored = states.load().await.unwrap();
        assert_eq!(restored.cursor, 1);
        assert_eq!(restored.timestamp, 1_000);

        clock.advance(2 * MINUTE);
        assert!(states.load().await.is_none());
        assert!(store.get(FEED_STATE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_state_discarded() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let states = FeedStateStore::new(tier(&store), clock, 30 * MINUTE);

        states
            .save(FeedState {
                cursor: 4,
                ..Default::default()
            })
            .await;
        assert!(states.load().await.is_none());
    }

    #[tokio::test]
    async fn test_author_record_expires() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let authors = AuthorCache::new(tier(&store), clock.clone(), 30 * MINUTE);
        let key = ItemConfig::new("0xA", "1").key();

        authors.put(&key, record("0xowner")).await;
        assert_eq!(store.keys(), vec!["feed:author:0xa:1".to_string()]);

        clock.advance(10 * MINUTE);
        assert_eq!(authors.get(&key).await.unwrap().author_address, "0xowner");

        clock.advance(25 * MINUTE);
        assert!(authors.get(&key).await.is_none());
        assert!(authors.is_empty());
    }

    #[tokio::test]
    async fn test_expired_records_evicted_on_store() {
        let clock = Arc::new(ManualClock::new(0));
        let authors = AuthorCache::new(DurableTier::disabled(), clock.clone(), 30 * MINUTE);

        for id in ["1", "2", "3"] {
            authors.put(&ItemConfig::new("0xa", id).key(), record("0xowner")).await;
        }
        assert_eq!(authors.len(), 3);

        clock.advance(31 * MINUTE);
        authors.put(&ItemConfig::new("0xa", "4").key(), record("0xowner")).await;
        assert_eq!(authors.len(), 1);
    }

    #[tokio::test]
    async fn test_author_record_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let key = ItemConfig::new("0xa", "2").key();

        AuthorCache::new(tier(&store), clock.clone(), 30 * MINUTE)
            .put(&key, record("0xowner"))
            .await;

        let fresh = AuthorCache::new(tier(&store), clock, 30 * MINUTE);
        assert!(fresh.is_empty());
        assert!(fresh.get(&key).await.is_some());
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn test_state_survives_file_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curio.json");
        let clock = Arc::new(ManualClock::new(0));
        let config = || FileStoreConfig::default().with_clock(clock.clone());

        let store = Arc::new(FileStore::open_with(&path, config()).await.unwrap());
        let saved = FeedStateStore::new(
            DurableTier::new(Some(store as Arc<dyn KeyValueStore>)),
            clock.clone(),
            30 * MINUTE,
        );
        saved
            .save(FeedState {
                all_configs: vec![ItemConfig::new("0xa", "1"), ItemConfig::new("0xa", "2")],
                cursor: 1,
                ..Default::default()
            })
            .await;
        saved.flush().await;

        let reopened = Arc::new(FileStore::open_with(&path, config()).await.unwrap());
        let states = FeedStateStore::new(
            DurableTier::new(Some(reopened as Arc<dyn KeyValueStore>)),
            clock,
            30 * MINUTE,
        );
        let state = states.load().await.unwrap();
        assert_eq!(state.all_configs.len(), 2);
        assert_eq!(state.cursor, 1);
    }

    #[tokio::test]
    async fn test_empty_author_not_stored() {
        let authors = AuthorCache::new(
            DurableTier::disabled(),
            Arc::new(ManualClock::new(0)),
            30 * MINUTE,
        );
        let key = ItemConfig::new("0xa", "3").key();
        authors.put(&key, record("")).await;
        assert!(authors.get(&key).await.is_none());
    }
}
