//! Sliding-window failure tracking per client key.
//!
//! Each key owns an ascending list of failure instants. Entries older than the
//! attempt window are purged lazily, right before the next append for the same
//! key; the background sweeper and the tracked-key cap bound memory for keys
//! that stop failing.
//!
//! Reaching the cap triggers one capacity pass: stale records are swept and,
//! if that is not enough, the least recently failing keys are evicted down to
//! 90% of the cap. The next tenth of the cap in new keys inserts without
//! scanning the map.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::time::{Duration, Instant};

use crate::observability::metrics;
use crate::security::policy::SharedPolicy;

/// Per-key failure history.
pub struct AttemptTracker {
    records: DashMap<String, Vec<Instant>>,
    policy: SharedPolicy,
    /// Set while a capacity pass runs; concurrent inserts skip their own pass.
    evicting: AtomicBool,
    capacity_passes: AtomicUsize,
}

impl AttemptTracker {
    pub fn new(policy: SharedPolicy) -> Self {
        Self {
            records: DashMap::new(),
            policy,
            evicting: AtomicBool::new(false),
            capacity_passes: AtomicUsize::new(0),
        }
    }

    /// Record a failure for `key` now.
    ///
    /// Returns true when the key has reached the failure threshold and should
    /// be blocked. Blocking itself is the caller's job.
    pub fn record_failure(&self, key: &str) -> bool {
        self.record_failure_at(key, Instant::now())
    }

    /// Record a failure for `key` at an explicit instant.
    pub fn record_failure_at(&self, key: &str, now: Instant) -> bool {
        let policy = self.policy.load();

        if !self.records.contains_key(key) && self.records.len() >= policy.max_tracked_keys {
            self.make_room(now, policy.max_tracked_keys);
        }

        let count = {
            let mut attempts = self.records.entry(key.to_string()).or_default();
            attempts.retain(|ts| within_window(*ts, now, policy.attempt_window));
            attempts.push(now);
            attempts.len()
        };

        metrics::record_failure();
        metrics::set_tracked_keys(self.records.len());

        tracing::debug!(client = %key, attempts = count, "Failure recorded");
        count >= policy.max_failed_attempts
    }

    /// Forget all failures for `key`.
    pub fn clear(&self, key: &str) -> bool {
        let removed = self.records.remove(key).is_some();
        if removed {
            metrics::set_tracked_keys(self.records.len());
        }
        removed
    }

    /// Stored attempt count for `key`, stale entries included.
    pub fn attempts(&self, key: &str) -> usize {
        self.records.get(key).map(|r| r.len()).unwrap_or(0)
    }

    pub fn tracked_key_count(&self) -> usize {
        self.records.len()
    }

    /// Sum of stored attempt-list lengths across all keys.
    pub fn total_attempts(&self) -> usize {
        self.records.iter().map(|r| r.value().len()).sum()
    }

    /// Drop every record whose failures all lie outside the window.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.policy.load().attempt_window;
        let before = self.records.len();
        self.records
            .retain(|_, attempts| attempts.iter().any(|ts| within_window(*ts, now, window)));
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            metrics::set_tracked_keys(self.records.len());
        }
        removed
    }

    /// Full-map passes triggered by the tracked-key cap so far.
    pub fn capacity_passes(&self) -> usize {
        self.capacity_passes.load(Ordering::Relaxed)
    }

    fn make_room(&self, now: Instant, cap: usize) {
        if self
            .evicting
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.capacity_passes.fetch_add(1, Ordering::Relaxed);

        let swept = self.sweep(now);
        let excess = self.records.len().saturating_sub(low_water_mark(cap));

        if excess > 0 {
            let mut candidates: Vec<(Option<Instant>, String)> = self
                .records
                .iter()
                .map(|r| (r.value().last().copied(), r.key().clone()))
                .collect();
            let excess = excess.min(candidates.len());
            if excess > 0 {
                candidates.select_nth_unstable_by_key(excess - 1, |(last, _)| *last);
                for (_, key) in candidates.into_iter().take(excess) {
                    self.records.remove(&key);
                }
            }
            metrics::record_capacity_evictions(excess);
            metrics::set_tracked_keys(self.records.len());
        }

        self.evicting.store(false, Ordering::Release);
        tracing::debug!(swept, evicted = excess, "Made room in attempt tracker at capacity");
    }
}

/// Size a capacity pass shrinks the map to, leaving headroom for new keys.
fn low_water_mark(cap: usize) -> usize {
    cap.saturating_sub((cap / 10).max(1))
}

fn within_window(ts: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(ts) < window
}
