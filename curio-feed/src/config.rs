//! Feed aggregator configuration.

use std::time::Duration;

use curio_core::constants::{
    ARTIST_MATCH_LIMIT, ARTIST_SCAN_LIMIT, AUTHOR_RECORD_TTL, CONTINUATION_DELAY,
    FAILURE_RETRY_DELAY, FEED_STATE_TTL, INTER_ITEM_DELAY, MAX_RETRY_ATTEMPTS, OWNER_STAGGER,
    PAGE_SIZE,
};

/// Feed aggregator configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Candidates resolved per window
    pub page_size: usize,
    /// Retries allowed per failed candidate
    pub max_retry_attempts: u32,
    /// Delay before an armed failure queue is drained
    pub failure_retry_delay: Duration,
    /// Delay before the driver loads the next window on its own
    pub continuation_delay: Duration,
    /// Delay before each metadata fetch within a window
    pub inter_item_delay: Duration,
    /// Start offset between owner lookups (`index × stagger`)
    pub owner_stagger: Duration,
    /// Unloaded configs scanned by an artist load
    pub artist_scan_limit: usize,
    /// Matches loaded by an artist load
    pub artist_match_limit: usize,
    /// Age after which persisted feed state is ignored
    pub state_ttl: Duration,
    /// Age after which a persisted author record is ignored
    pub author_ttl: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            failure_retry_delay: FAILURE_RETRY_DELAY,
            continuation_delay: CONTINUATION_DELAY,
            inter_item_delay: INTER_ITEM_DELAY,
            owner_stagger: OWNER_STAGGER,
            artist_scan_limit: ARTIST_SCAN_LIMIT,
            artist_match_limit: ARTIST_MATCH_LIMIT,
            state_ttl: FEED_STATE_TTL,
            author_ttl: AUTHOR_RECORD_TTL,
        }
    }
}

impl FeedConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default sizes with every in-window pause removed.
    ///
    /// The failure retry delay is kept; it is measured against the feed's
    /// clock rather than slept.
    pub fn unpaced() -> Self {
        Self {
            inter_item_delay: Duration::ZERO,
            owner_stagger: Duration::ZERO,
            continuation_delay: Duration::from_millis(5),
            ..Self::default()
        }
    }

    /// Sets the page size (at least 1).
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the retry budget of a failed candidate.
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the failure retry delay.
    pub fn failure_retry_delay(mut self, delay: Duration) -> Self {
        self.failure_retry_delay = delay;
        self
    }

    /// Sets the continuation delay.
    pub fn continuation_delay(mut self, delay: Duration) -> Self {
        self.continuation_delay = delay;
        self
    }

    /// Sets the artist scan and match limits.
    pub fn artist_limits(mut self, scan: usize, matches: usize) -> Self {
        self.artist_scan_limit = scan;
        self.artist_match_limit = matches;
        self
    }

    /// Sets the persisted state lifetime.
    pub fn state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }
}
