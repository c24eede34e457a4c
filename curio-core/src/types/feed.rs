//! Feed working-state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::item::{ItemConfig, ResolvedItem};
use crate::error::{CurioError, Result};

/// A candidate whose resolution failed, waiting to be retried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureQueueEntry {
    /// Candidate to retry
    pub config: ItemConfig,
    /// Retries already made
    pub attempts: u32,
}

impl FailureQueueEntry {
    /// Creates an entry that has not been retried yet.
    pub fn new(config: ItemConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }
}

/// Persisted working set of the feed aggregator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState {
    /// Items already displayed
    pub resolved_items: Vec<ResolvedItem>,
    /// Full candidate list
    pub all_configs: Vec<ItemConfig>,
    /// Index of the next candidate to load
    pub cursor: usize,
    /// Candidates waiting to be retried; absent in older saves
    #[serde(default)]
    pub failure_queue: Vec<FailureQueueEntry>,
    /// Save time in epoch milliseconds
    pub timestamp: u64,
}

impl FeedState {
    /// Checks `0 <= cursor <= len(all_configs)`.
    pub fn validate(&self) -> Result<()> {
        if self.cursor > self.all_configs.len() {
            return Err(CurioError::ValidationError(format!(
                "cursor {} beyond {} configs",
                self.cursor,
                self.all_configs.len()
            )));
        }
        Ok(())
    }

    /// Returns true if the state is younger than `ttl` at `now`.
    pub fn is_fresh(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.timestamp) < ttl.as_millis() as u64
    }
}

/// Author resolved for one item, kept for reuse across page loads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRecord {
    /// Author address
    pub author_address: String,
    /// Author display name
    pub author_display_name: String,
}
