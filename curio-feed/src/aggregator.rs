//! The feed aggregator: paginated resolution of candidates into displayable items.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use curio_cache::DurableTier;
use curio_core::constants::UNKNOWN_IDENTITY;
use curio_core::traits::{CandidateSource, Clock, MetadataSource};
use curio_core::types::{
    AuthorRecord, FailureQueueEntry, FeedState, ItemConfig, ItemKey, ResolvedItem,
};
use curio_identity::BatchIdentityResolver;
use curio_ledger::ContractOwnerResolver;

use crate::config::FeedConfig;
use crate::retry::{Requeue, RetryScheduler};
use crate::state::{AuthorCache, FeedStateStore};

/// Collaborators the aggregator resolves items through.
pub struct FeedServices {
    /// Authoritative candidate list
    pub candidates: Arc<dyn CandidateSource>,
    /// Contract → author address
    pub owners: ContractOwnerResolver,
    /// Author address → display name
    pub identities: BatchIdentityResolver,
    /// Item → metadata document
    pub metadata: Arc<dyn MetadataSource>,
}

/// Lifecycle phase of the feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedPhase {
    /// Waiting for the next load
    Idle,
    /// Restoring state or fetching the candidate list
    Hydrating,
    /// Resolving a window
    Loading,
    /// Every candidate has been attempted
    Exhausted,
}

/// Where [`FeedAggregator::hydrate`] got its working set from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HydrateSource {
    /// Unexpired persisted state
    Restored,
    /// A fresh candidate list
    Fetched,
}

/// Outcome of one window load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// True if nothing ran (already loading, nothing left, empty query)
    pub skipped: bool,
    /// Candidates attempted
    pub attempted: usize,
    /// Items newly displayed
    pub added: usize,
    /// Candidates queued for retry
    pub failed: usize,
    /// Cursor after the load
    pub cursor: usize,
    /// Total candidates
    pub total: usize,
    /// True if candidates remain past the cursor
    pub has_more: bool,
}

/// Outcome of one failure queue drain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
    /// True if the queue was not due, or a drain was already running
    pub skipped: bool,
    /// Entries taken from the queue
    pub retried: usize,
    /// Entries now displayed
    pub recovered: usize,
    /// Entries kept for another attempt
    pub requeued: usize,
    /// Entries that used their last attempt
    pub dropped: usize,
    /// Queue length after the drain
    pub pending: usize,
}

/// Point-in-time view of the feed.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    /// Displayed items, in presentation order
    pub items: Vec<ResolvedItem>,
    /// Index of the next candidate
    pub cursor: usize,
    /// Total candidates
    pub total: usize,
    /// Current phase
    pub phase: FeedPhase,
    /// True if candidates remain past the cursor
    pub has_more: bool,
    /// Entries waiting in the failure queue
    pub pending_failures: usize,
    /// True while the failure queue is being drained
    pub retrying: bool,
}

struct FeedInner {
    items: Vec<ResolvedItem>,
    displayed: HashSet<ItemKey>,
    configs: Vec<ItemConfig>,
    cursor: usize,
    phase: FeedPhase,
}

impl FeedInner {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            displayed: HashSet::new(),
            configs: Vec::new(),
            cursor: 0,
            phase: FeedPhase::Idle,
        }
    }

    fn has_more(&self) -> bool {
        self.cursor < self.configs.len()
    }

    /// Appends items whose key is not displayed yet.
    fn merge(&mut self, items: Vec<ResolvedItem>) -> usize {
        let mut added = 0;
        for item in items {
            if self.displayed.insert(item.key()) {
                self.items.push(item);
                added += 1;
            }
        }
        added
    }

    fn settle(&mut self) {
        self.phase = if self.has_more() {
            FeedPhase::Idle
        } else {
            FeedPhase::Exhausted
        };
    }

    fn report(&self, attempted: usize, added: usize, failed: usize) -> LoadReport {
        LoadReport {
            skipped: false,
            attempted,
            added,
            failed,
            cursor: self.cursor,
            total: self.configs.len(),
            has_more: self.has_more(),
        }
    }

    fn to_state(&self) -> FeedState {
        FeedState {
            resolved_items: self.items.clone(),
            all_configs: self.configs.clone(),
            cursor: self.cursor,
            failure_queue: Vec::new(),
            timestamp: 0,
        }
    }
}

/// Clears an atomic flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Paginated feed over a candidate list.
///
/// Candidates are resolved a window at a time: owners in parallel,
/// identities in one batch, metadata sequentially. Items whose metadata
/// fails go to a bounded retry queue. The working set and the retry queue
/// are persisted after every change so a restart within the state lifetime
/// resumes where it left off.
pub struct FeedAggregator {
    services: FeedServices,
    config: FeedConfig,
    state_store: FeedStateStore,
    authors: AuthorCache,
    clock: Arc<dyn Clock>,
    inner: RwLock<FeedInner>,
    failures: Mutex<RetryScheduler>,
    loading: AtomicBool,
    retrying: AtomicBool,
}

impl FeedAggregator {
    /// Creates an aggregator. Call [`hydrate`](Self::hydrate) before loading.
    pub fn new(
        services: FeedServices,
        config: FeedConfig,
        durable: DurableTier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state_store = FeedStateStore::new(durable.clone(), Arc::clone(&clock), config.state_ttl);
        let authors = AuthorCache::new(durable, Arc::clone(&clock), config.author_ttl);
        let failures = RetryScheduler::new(config.failure_retry_delay, config.max_retry_attempts);

        Self {
            services,
            config,
            state_store,
            authors,
            clock,
            inner: RwLock::new(FeedInner::empty()),
            failures: Mutex::new(failures),
            loading: AtomicBool::new(false),
            retrying: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Returns the collaborators.
    pub fn services(&self) -> &FeedServices {
        &self.services
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Restores unexpired persisted state, or fetches the candidate list.
    ///
    /// Restored items and configs are reshuffled; configs are shuffled on
    /// either side of the cursor so loaded and unloaded candidates stay apart.
    /// Saved retry entries are queued again. A failing candidate source
    /// yields an empty feed.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> HydrateSource {
        self.inner.write().phase = FeedPhase::Hydrating;

        let (source, (fresh, queued)) = match self.state_store.load().await {
            Some(state) => (HydrateSource::Restored, restored(state)),
            None => {
                let configs = match self.services.candidates.candidate_list().await {
                    Ok(configs) => configs,
                    Err(e) => {
                        warn!(error = %e, "Candidate list unavailable; feed is empty");
                        Vec::new()
                    }
                };
                (HydrateSource::Fetched, (fetched(configs), Vec::new()))
            }
        };

        let pending = {
            let mut failures = self.failures.lock();
            let pending = failures.restore(queued, |key| fresh.displayed.contains(key));
            failures.arm(self.clock.now_ms());
            pending
        };
        let (total, displayed, cursor) = {
            let mut inner = self.inner.write();
            *inner = fresh;
            inner.settle();
            (inner.configs.len(), inner.items.len(), inner.cursor)
        };

        info!(?source, total, displayed, cursor, pending, "Feed hydrated");
        source
    }

    /// Resolves the next window of candidates.
    ///
    /// A no-op if a load is already running or nothing is left. Candidates
    /// already displayed (for example by an artist load) are not fetched
    /// again. The cursor advances past the window whatever the outcome.
    #[instrument(skip(self))]
    pub async fn load_more(&self) -> LoadReport {
        let Some(_loading) = FlagGuard::acquire(&self.loading) else {
            debug!("Load already running");
            return self.skipped_report();
        };

        let Some((end, window)) = self.next_window() else {
            debug!("Nothing left to load");
            return self.skipped_report();
        };

        let authors = self.resolve_authors(&window).await;
        let (resolved, failed) = self.fetch_items(&window, authors).await;
        let (failed_count, queue_was_empty) = self.enqueue_failures(failed);

        let report = {
            let mut inner = self.inner.write();
            let added = inner.merge(resolved);
            inner.cursor = inner.cursor.max(end);
            inner.settle();
            inner.report(window.len(), added, failed_count)
        };

        self.schedule_retry(report.added, report.failed, queue_was_empty);
        self.persist().await;

        info!(
            added = report.added,
            failed = report.failed,
            cursor = report.cursor,
            total = report.total,
            "Window loaded"
        );
        report
    }

    /// Retries queued failures if the queue is due.
    ///
    /// Recovered items are merged; failed ones are requeued until they
    /// have used their retry budget, then dropped for good. The queue is
    /// persisted after every drain.
    #[instrument(skip(self))]
    pub async fn process_failures(&self) -> RetryReport {
        let Some(_retrying) = FlagGuard::acquire(&self.retrying) else {
            return self.skipped_retry();
        };

        let entries = self.failures.lock().take_due(self.clock.now_ms());
        if entries.is_empty() {
            return self.skipped_retry();
        }

        let mut report = RetryReport {
            retried: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            if self.is_displayed(&entry.config.key()) {
                report.recovered += 1;
                continue;
            }

            let single = [entry.config.clone()];
            let authors = self.resolve_authors(&single).await;
            let (resolved, _) = self.fetch_items(&single, authors).await;

            if resolved.is_empty() {
                let outcome = self.failures.lock().requeue(entry.clone());
                match outcome {
                    Requeue::Kept => report.requeued += 1,
                    Requeue::Dropped => {
                        warn!(item = %entry.config.key(), "Giving up on item");
                        report.dropped += 1;
                    }
                }
            } else {
                self.inner.write().merge(resolved);
                report.recovered += 1;
            }
        }

        report.pending = {
            let mut failures = self.failures.lock();
            if report.recovered > 0 || !failures.is_empty() {
                failures.arm(self.clock.now_ms());
            }
            failures.len()
        };

        self.persist().await;

        info!(
            recovered = report.recovered,
            requeued = report.requeued,
            dropped = report.dropped,
            "Failure queue drained"
        );
        report
    }

    /// Writes out anything the durable store buffered.
    pub async fn flush(&self) {
        self.state_store.flush().await;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Displayed items matching `query` by name, author address or author name.
    pub fn query(&self, query: &str) -> Vec<ResolvedItem> {
        self.inner
            .read()
            .items
            .iter()
            .filter(|item| item.matches(query))
            .cloned()
            .collect()
    }

    /// Loads unloaded items by one artist.
    ///
    /// Owners and identities are resolved for a bounded prefix of the
    /// candidates past the cursor; only those whose author address or name
    /// contains `query` are fetched. The cursor does not move.
    #[instrument(skip(self))]
    pub async fn load_artist(&self, query: &str) -> LoadReport {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.skipped_report();
        }
        let Some(_loading) = FlagGuard::acquire(&self.loading) else {
            debug!("Load already running");
            return self.skipped_report();
        };

        let scan: Vec<ItemConfig> = {
            let mut inner = self.inner.write();
            inner.phase = FeedPhase::Loading;
            let scan = inner.configs[inner.cursor..]
                .iter()
                .filter(|c| !inner.displayed.contains(&c.key()))
                .take(self.config.artist_scan_limit)
                .cloned()
                .collect();
            scan
        };

        let authors = self.resolve_authors(&scan).await;
        let (matches, match_authors): (Vec<ItemConfig>, Vec<AuthorRecord>) = scan
            .into_iter()
            .zip(authors)
            .filter(|(_, author)| author_matches(author, &needle))
            .take(self.config.artist_match_limit)
            .unzip();

        let (resolved, failed) = self.fetch_items(&matches, match_authors).await;
        let (failed_count, queue_was_empty) = self.enqueue_failures(failed);

        let report = {
            let mut inner = self.inner.write();
            let added = inner.merge(resolved);
            inner.settle();
            inner.report(matches.len(), added, failed_count)
        };

        if report.added > 0 || report.failed > 0 {
            self.schedule_retry(report.added, report.failed, queue_was_empty);
            self.persist().await;
        }

        info!(query = %needle, matched = matches.len(), added = report.added, "Artist loaded");
        report
    }

    /// Returns a displayed item by key.
    pub fn item(&self, key: &ItemKey) -> Option<ResolvedItem> {
        self.inner
            .read()
            .items
            .iter()
            .find(|item| item.key() == *key)
            .cloned()
    }

    /// Returns a point-in-time view of the feed.
    pub fn snapshot(&self) -> FeedSnapshot {
        let pending_failures = self.failures.lock().len();
        let inner = self.inner.read();
        FeedSnapshot {
            items: inner.items.clone(),
            cursor: inner.cursor,
            total: inner.configs.len(),
            phase: inner.phase,
            has_more: inner.has_more(),
            pending_failures,
            retrying: self.retrying.load(Ordering::Acquire),
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> FeedPhase {
        self.inner.read().phase
    }

    /// Returns true if candidates remain past the cursor.
    pub fn has_more(&self) -> bool {
        self.inner.read().has_more()
    }

    /// Number of displayed items.
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Returns true if nothing is displayed.
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    /// Entries waiting in the failure queue.
    pub fn pending_failures(&self) -> usize {
        self.failures.lock().len()
    }

    /// Time until the failure queue is due, if anything is queued.
    pub fn retry_due_in(&self) -> Option<Duration> {
        let failures = self.failures.lock();
        if failures.is_empty() {
            return None;
        }
        let due = failures.due_at()?;
        Some(Duration::from_millis(
            due.saturating_sub(self.clock.now_ms()),
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PIPELINE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Takes the next window, returning its end index and the candidates in
    /// it that are not displayed yet.
    fn next_window(&self) -> Option<(usize, Vec<ItemConfig>)> {
        let mut inner = self.inner.write();
        if !inner.has_more() {
            inner.settle();
            return None;
        }

        let end = (inner.cursor + self.config.page_size).min(inner.configs.len());
        let window = inner.configs[inner.cursor..end]
            .iter()
            .filter(|c| !inner.displayed.contains(&c.key()))
            .cloned()
            .collect();
        inner.phase = FeedPhase::Loading;
        Some((end, window))
    }

    /// Resolves the author of each config, reusing fresh author records.
    async fn resolve_authors(&self, configs: &[ItemConfig]) -> Vec<AuthorRecord> {
        let mut records = Vec::with_capacity(configs.len());
        for config in configs {
            records.push(self.authors.get(&config.key()).await);
        }

        let missing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_none())
            .map(|(idx, _)| idx)
            .collect();
        if missing.is_empty() {
            return records.into_iter().flatten().collect();
        }

        let stagger = self.config.owner_stagger;
        let owners = join_all(missing.iter().enumerate().map(|(slot, &idx)| {
            let contract = configs[idx].contract_ref.as_str();
            async move {
                if !stagger.is_zero() {
                    tokio::time::sleep(stagger * slot as u32).await;
                }
                self.services.owners.resolve_owner_or_empty(contract).await
            }
        }))
        .await;

        let names = self.services.identities.resolve_many(&owners).await;

        for (idx, owner) in missing.into_iter().zip(owners) {
            let author_display_name = names
                .get(&owner)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string());
            let record = AuthorRecord {
                author_address: owner,
                author_display_name,
            };
            self.authors.put(&configs[idx].key(), record.clone()).await;
            records[idx] = Some(record);
        }

        records
            .into_iter()
            .map(|record| record.unwrap_or_else(unknown_author))
            .collect()
    }

    /// Fetches metadata one item at a time, each preceded by the inter-item delay.
    async fn fetch_items(
        &self,
        configs: &[ItemConfig],
        authors: Vec<AuthorRecord>,
    ) -> (Vec<ResolvedItem>, Vec<ItemConfig>) {
        let mut resolved = Vec::with_capacity(configs.len());
        let mut failed = Vec::new();
        let metadata = &self.services.metadata;

        for (config, author) in configs.iter().zip(authors) {
            if !self.config.inter_item_delay.is_zero() {
                tokio::time::sleep(self.config.inter_item_delay).await;
            }

            match metadata.fetch_item_metadata(config).await {
                Ok(meta) => {
                    let image_url = meta.image_uri().map(|uri| metadata.display_image_url(uri));
                    resolved.push(ResolvedItem::assemble(
                        config,
                        meta,
                        image_url,
                        author.author_address,
                        author.author_display_name,
                    ));
                }
                Err(e) => {
                    warn!(item = %config.key(), error = %e, "Metadata unavailable; queued for retry");
                    failed.push(config.clone());
                }
            }
        }

        (resolved, failed)
    }

    /// Queues failed candidates that are not displayed. Returns how many
    /// were queued and whether the queue was empty before.
    fn enqueue_failures(&self, failed: Vec<ItemConfig>) -> (usize, bool) {
        let inner = self.inner.read();
        let mut failures = self.failures.lock();
        let was_empty = failures.is_empty();
        let queued = failed
            .into_iter()
            .filter(|config| !inner.displayed.contains(&config.key()))
            .filter(|config| failures.enqueue(config.clone()))
            .count();
        (queued, was_empty)
    }

    /// Re-arms the retry timer when the displayed set changed. New failures
    /// only start a timer when none is pending for older entries.
    fn schedule_retry(&self, added: usize, failed: usize, queue_was_empty: bool) {
        let now = self.clock.now_ms();
        let mut failures = self.failures.lock();
        if added > 0 || (failed > 0 && queue_was_empty) {
            failures.arm(now);
        } else if failed > 0 {
            failures.ensure_armed(now);
        }
    }


    fn is_displayed(&self, key: &ItemKey) -> bool {
        self.inner.read().displayed.contains(key)
    }

    async fn persist(&self) {
        let mut state = self.inner.read().to_state();
        state.failure_queue = self.failures.lock().entries().to_vec();
        self.state_store.save(state).await;
    }

    fn skipped_report(&self) -> LoadReport {
        let inner = self.inner.read();
        LoadReport {
            skipped: true,
            ..inner.report(0, 0, 0)
        }
    }

    fn skipped_retry(&self) -> RetryReport {
        RetryReport {
            skipped: true,
            pending: self.pending_failures(),
            ..Default::default()
        }
    }
}

fn author_matches(author: &AuthorRecord, needle: &str) -> bool {
    if author.author_address.is_empty() {
        return false;
    }
    author.author_address.to_lowercase().contains(needle)
        || (author.author_display_name != UNKNOWN_IDENTITY
            && author.author_display_name.to_lowercase().contains(needle))
}

fn unknown_author() -> AuthorRecord {
    AuthorRecord {
        author_address: String::new(),
        author_display_name: UNKNOWN_IDENTITY.to_string(),
    }
}

fn restored(state: FeedState) -> (FeedInner, Vec<FailureQueueEntry>) {
    let FeedState {
        mut resolved_items,
        mut all_configs,
        cursor,
        failure_queue,
        ..
    } = state;

    let mut rng = rand::thread_rng();
    resolved_items.shuffle(&mut rng);
    let (loaded, unloaded) = all_configs.split_at_mut(cursor);
    loaded.shuffle(&mut rng);
    unloaded.shuffle(&mut rng);

    let mut inner = FeedInner::empty();
    inner.merge(resolved_items);
    inner.configs = all_configs;
    inner.cursor = cursor;
    (inner, failure_queue)
}

fn fetched(configs: Vec<ItemConfig>) -> FeedInner {
    let mut seen = HashSet::new();
    let mut configs: Vec<ItemConfig> = configs
        .into_iter()
        .filter(|c| seen.insert(c.key()))
        .collect();
    configs.shuffle(&mut rand::thread_rng());

    let mut inner = FeedInner::empty();
    inner.configs = configs;
    inner
}
