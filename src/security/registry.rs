//! Registry of currently blocked client keys.
//!
//! Every block carries a generation tag and owns a one-shot tokio task that
//! releases it at `expires_at`. Re-blocking or manually unblocking aborts the
//! previous task, and the task only removes the entry whose generation it was
//! scheduled for, so a late timer can never clear a newer block.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::security::policy::SharedPolicy;
use crate::security::tracker::AttemptTracker;

/// What caused a key to be blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockOrigin {
    /// Failure threshold crossed inside the attempt window.
    Automatic,
    /// Operator request through the admin surface.
    Manual,
}

impl BlockOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockOrigin::Automatic => "automatic",
            BlockOrigin::Manual => "manual",
        }
    }
}

impl fmt::Display for BlockOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct BlockEntry {
    expires_at: Instant,
    blocked_at_unix_ms: u64,
    expires_at_unix_ms: u64,
    origin: BlockOrigin,
    generation: u64,
    timer: AbortHandle,
}

impl BlockEntry {
    fn snapshot(&self, key: &str, now: Instant) -> BlockSnapshot {
        BlockSnapshot {
            key: key.to_string(),
            origin: self.origin,
            blocked_at: self.blocked_at_unix_ms,
            expires_at: self.expires_at_unix_ms,
            remaining_secs: self.expires_at.saturating_duration_since(now).as_secs(),
        }
    }
}

/// Point-in-time view of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSnapshot {
    pub key: String,
    pub origin: BlockOrigin,
    /// Epoch millis.
    pub blocked_at: u64,
    /// Epoch millis.
    pub expires_at: u64,
    pub remaining_secs: u64,
}

pub struct BlockRegistry {
    entries: Arc<DashMap<String, BlockEntry>>,
    tracker: Arc<AttemptTracker>,
    policy: SharedPolicy,
    next_generation: AtomicU64,
}

impl BlockRegistry {
    pub fn new(tracker: Arc<AttemptTracker>, policy: SharedPolicy) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            tracker,
            policy,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Block `key` for the configured duration, replacing any existing block.
    ///
    /// Must be called from within a tokio runtime.
    pub fn block(&self, key: &str, origin: BlockOrigin) -> BlockSnapshot {
        let block_duration = self.policy.load().block_duration;
        let now = Instant::now();
        let expires_at = now + block_duration;
        let blocked_at_unix_ms = unix_millis();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let timer = tokio::spawn(expire_after(
            self.entries.clone(),
            self.tracker.clone(),
            key.to_string(),
            generation,
            expires_at,
        ))
        .abort_handle();

        let entry = BlockEntry {
            expires_at,
            blocked_at_unix_ms,
            expires_at_unix_ms: blocked_at_unix_ms + block_duration.as_millis() as u64,
            origin,
            generation,
            timer,
        };
        let snapshot = entry.snapshot(key, now);

        let refreshed = match self.entries.insert(key.to_string(), entry) {
            Some(previous) => {
                previous.timer.abort();
                true
            }
            None => false,
        };

        tracing::warn!(
            client = %key,
            origin = %origin,
            refreshed,
            duration_secs = block_duration.as_secs(),
            "Client blocked"
        );
        metrics::record_block(origin.as_str());
        metrics::set_blocked_keys(self.entries.len());

        snapshot
    }

    /// Lift the block on `key` and reset its failure history.
    ///
    /// Returns whether a block was actually removed.
    pub fn unblock(&self, key: &str) -> bool {
        let removed = self.entries.remove(key);
        self.tracker.clear(key);

        match removed {
            Some((_, entry)) => {
                entry.timer.abort();
                tracing::info!(client = %key, origin = %entry.origin, "Client unblocked");
                metrics::record_unblock("manual");
                metrics::set_blocked_keys(self.entries.len());
                true
            }
            None => false,
        }
    }

    pub fn is_blocked(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The live block for `key`, if any.
    ///
    /// A block past its expiry whose timer has not run yet is released here.
    pub fn get(&self, key: &str) -> Option<BlockSnapshot> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.snapshot(key, now)),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.release_expired(key, now);
        }
        None
    }

    /// Keys with a live block.
    pub fn blocked_keys(&self) -> BTreeSet<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.value().expires_at > now)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Snapshots of every live block, ordered by key.
    pub fn blocks(&self) -> Vec<BlockSnapshot> {
        let now = Instant::now();
        let mut blocks: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.value().expires_at > now)
            .map(|e| e.value().snapshot(e.key(), now))
            .collect();
        blocks.sort_by(|a, b| a.key.cmp(&b.key));
        blocks
    }

    fn release_expired(&self, key: &str, now: Instant) {
        if let Some((_, entry)) = self.entries.remove_if(key, |_, e| e.expires_at <= now) {
            entry.timer.abort();
            self.tracker.clear(key);
            tracing::info!(client = %key, origin = %entry.origin, "Block expired");
            metrics::record_unblock("expired");
            metrics::set_blocked_keys(self.entries.len());
        }
    }
}

async fn expire_after(
    entries: Arc<DashMap<String, BlockEntry>>,
    tracker: Arc<AttemptTracker>,
    key: String,
    generation: u64,
    expires_at: Instant,
) {
    tokio::time::sleep_until(expires_at).await;

    if let Some((_, entry)) = entries.remove_if(&key, |_, e| e.generation == generation) {
        tracker.clear(&key);
        tracing::info!(client = %key, origin = %entry.origin, "Block expired");
        metrics::record_unblock("expired");
        metrics::set_blocked_keys(entries.len());
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
