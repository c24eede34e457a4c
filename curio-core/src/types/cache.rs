//! Timestamped cache entries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A cached value with the epoch-millisecond time it was written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Cached value (may itself be a negative result)
    pub value: T,
    /// Write time in epoch milliseconds
    pub timestamp: u64,
}

impl<T> CacheEntry<T> {
    /// Creates an entry written at `timestamp`.
    pub fn new(value: T, timestamp: u64) -> Self {
        Self { value, timestamp }
    }

    /// Returns true if `now - timestamp < ttl`.
    pub fn is_fresh(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.timestamp) < ttl.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_boundary() {
        let entry = CacheEntry::new("alice".to_string(), 1_000);
        let ttl = Duration::from_millis(500);

        assert!(entry.is_fresh(1_000, ttl));
        assert!(entry.is_fresh(1_499, ttl));
        assert!(!entry.is_fresh(1_500, ttl));
    }

    #[test]
    fn test_clock_skew_counts_as_fresh() {
        let entry = CacheEntry::new(1u8, 5_000);
        assert!(entry.is_fresh(4_000, Duration::from_millis(1)));
    }
}
