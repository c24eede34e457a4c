//! Failure retry queue.

use std::time::Duration;

use curio_core::types::{FailureQueueEntry, ItemConfig, ItemKey};

/// What happened to an entry handed back after a failed retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Kept for another attempt
    Kept,
    /// Retry budget used up; removed for good
    Dropped,
}

/// Candidates whose resolution failed, drained on a delay.
///
/// Entries are unique by item key. The queue is re-armed with a due time
/// whenever the displayed set changes, and armed on first failure if no
/// drain is scheduled; draining takes every entry at once.
#[derive(Debug)]
pub struct RetryScheduler {
    entries: Vec<FailureQueueEntry>,
    due_at: Option<u64>,
    delay_ms: u64,
    max_attempts: u32,
}

impl RetryScheduler {
    /// Creates an empty, unarmed queue.
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            entries: Vec::new(),
            due_at: None,
            delay_ms: delay.as_millis() as u64,
            max_attempts,
        }
    }

    /// Adds a failed candidate. Returns false if it is already queued.
    pub fn enqueue(&mut self, config: ItemConfig) -> bool {
        let key = config.key();
        if self.contains(&key) {
            return false;
        }
        self.entries.push(FailureQueueEntry::new(config));
        true
    }

    /// Returns true if an entry for the key is queued.
    pub fn contains(&self, key: &ItemKey) -> bool {
        self.entries.iter().any(|e| e.config.key() == *key)
    }

    /// Schedules the next drain `delay` after `now`, replacing any earlier schedule.
    pub fn arm(&mut self, now: u64) {
        self.due_at = Some(now.saturating_add(self.delay_ms));
    }

    /// Arms the queue only if no drain is scheduled yet.
    pub fn ensure_armed(&mut self, now: u64) {
        if self.due_at.is_none() {
            self.arm(now);
        }
    }

    /// Replaces the queue with saved entries, skipping duplicates, entries
    /// `skip` rejects and entries past their budget. Returns how many were kept.
    pub fn restore(
        &mut self,
        saved: Vec<FailureQueueEntry>,
        skip: impl Fn(&ItemKey) -> bool,
    ) -> usize {
        self.entries.clear();
        self.due_at = None;
        for entry in saved {
            let key = entry.config.key();
            if entry.attempts >= self.max_attempts || skip(&key) || self.contains(&key) {
                continue;
            }
            self.entries.push(entry);
        }
        self.entries.len()
    }

    /// Returns the scheduled drain time, if armed.
    pub fn due_at(&self) -> Option<u64> {
        self.due_at
    }

    /// Returns true if armed, non-empty and due.
    pub fn is_due(&self, now: u64) -> bool {
        !self.entries.is_empty() && self.due_at.map_or(false, |due| now >= due)
    }

    /// Takes every entry if the queue is due, disarming it.
    pub fn take_due(&mut self, now: u64) -> Vec<FailureQueueEntry> {
        if !self.is_due(now) {
            return Vec::new();
        }
        self.due_at = None;
        std::mem::take(&mut self.entries)
    }

    /// Returns an entry whose retry failed.
    ///
    /// The attempt is counted; an entry that has used its budget is dropped,
    /// along with any copy enqueued while it was out. A copy enqueued in the
    /// meantime otherwise takes over the higher attempt count.
    pub fn requeue(&mut self, mut entry: FailureQueueEntry) -> Requeue {
        entry.attempts += 1;
        let key = entry.config.key();

        if entry.attempts >= self.max_attempts {
            self.remove(&key);
            return Requeue::Dropped;
        }
        match self.entries.iter_mut().find(|e| e.config.key() == key) {
            Some(queued) => queued.attempts = queued.attempts.max(entry.attempts),
            None => self.entries.push(entry),
        }
        Requeue::Kept
    }

    /// Removes the entry for a key, if queued.
    pub fn remove(&mut self, key: &ItemKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.config.key() != *key);
        self.entries.len() != before
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued entries, oldest first.
    pub fn entries(&self) -> &[FailureQueueEntry] {
        &self.entries
    }
}
