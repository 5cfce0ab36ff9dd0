//! The abuse guard: owner of the attempt tracker, the block registry and the
//! active policy, plus the operator-facing control surface.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::AbuseConfig;
use crate::security::client_key::{extractor_for, KeyExtractor, PeerIpKey};
use crate::security::policy::{self, AbusePolicy, SharedPolicy};
use crate::security::registry::{BlockOrigin, BlockRegistry, BlockSnapshot};
use crate::security::tracker::AttemptTracker;

/// Aggregate view returned by [`AbuseGuard::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardStats {
    pub blocked_keys: BTreeSet<String>,
    pub tracked_key_count: usize,
    /// Stored attempts across all keys, including entries not yet purged.
    pub total_attempts: usize,
}

pub struct AbuseGuard {
    tracker: Arc<AttemptTracker>,
    registry: BlockRegistry,
    policy: SharedPolicy,
    extractor: Box<dyn KeyExtractor>,
    enabled: AtomicBool,
}

impl AbuseGuard {
    pub fn new(initial: AbusePolicy, extractor: Box<dyn KeyExtractor>) -> Self {
        let policy = policy::shared(initial);
        let tracker = Arc::new(AttemptTracker::new(policy.clone()));
        let registry = BlockRegistry::new(tracker.clone(), policy.clone());
        Self {
            tracker,
            registry,
            policy,
            extractor,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn from_config(config: &AbuseConfig) -> Self {
        let guard = Self::new(
            AbusePolicy::from(config),
            extractor_for(config.key_source, &config.fallback_key),
        );
        guard.enabled.store(config.enabled, Ordering::Relaxed);
        guard
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> Arc<AbusePolicy> {
        self.policy.load_full()
    }

    /// Apply a reloaded abuse configuration.
    ///
    /// Thresholds and the enabled flag change in place; existing blocks keep
    /// their original expiry. The key source is fixed at construction.
    pub fn apply_config(&self, config: &AbuseConfig) {
        let next = AbusePolicy::from(config);
        let previous = self.policy.swap(Arc::new(next.clone()));
        self.enabled.store(config.enabled, Ordering::Relaxed);

        if *previous != next {
            tracing::info!(
                max_failed_attempts = next.max_failed_attempts,
                attempt_window_secs = next.attempt_window.as_secs(),
                block_duration_secs = next.block_duration.as_secs(),
                "Abuse policy updated"
            );
        }
    }

    pub fn client_key(&self, request: &Request<Body>) -> String {
        self.extractor.extract_key(request)
    }

    /// Record a failure and block the key if it crossed the threshold.
    ///
    /// Returns the new block when one was created.
    pub fn record_failure(&self, key: &str) -> Option<BlockSnapshot> {
        if self.tracker.record_failure(key) {
            Some(self.registry.block(key, BlockOrigin::Automatic))
        } else {
            None
        }
    }

    pub fn is_blocked(&self, key: &str) -> bool {
        self.registry.is_blocked(key)
    }

    pub fn block_info(&self, key: &str) -> Option<BlockSnapshot> {
        self.registry.get(key)
    }

    /// Block `key` regardless of its failure history.
    pub fn manual_block(&self, key: &str) -> BlockSnapshot {
        self.registry.block(key, BlockOrigin::Manual)
    }

    /// Lift any block on `key` and reset its failure history.
    pub fn manual_unblock(&self, key: &str) -> bool {
        self.registry.unblock(key)
    }

    pub fn blocks(&self) -> Vec<BlockSnapshot> {
        self.registry.blocks()
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            blocked_keys: self.registry.blocked_keys(),
            tracked_key_count: self.tracker.tracked_key_count(),
            total_attempts: self.tracker.total_attempts(),
        }
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.tracker.attempts(key)
    }

    pub fn sweep(&self) -> usize {
        self.tracker.sweep(Instant::now())
    }

    /// Periodically evict stale attempt records until shutdown.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = self.tracker.tracked_key_count(),
                                "Swept stale attempt records"
                            );
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for AbuseGuard {
    fn default() -> Self {
        Self::new(AbusePolicy::default(), Box::new(PeerIpKey::new("unknown")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_threshold_crossing_blocks_once() {
        let guard = AbuseGuard::default();
        for _ in 0..9 {
            assert!(guard.record_failure("1.2.3.4").is_none());
        }
        assert!(!guard.is_blocked("1.2.3.4"));

        let block = guard.record_failure("1.2.3.4").expect("10th failure blocks");
        assert_eq!(block.origin, BlockOrigin::Automatic);
        assert!(guard.is_blocked("1.2.3.4"));
        assert_eq!(guard.stats().blocked_keys.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_block_without_failures() {
        let guard = AbuseGuard::default();
        guard.manual_block("9.9.9.9");

        let stats = guard.stats();
        assert!(stats.blocked_keys.contains("9.9.9.9"));
        assert_eq!(stats.tracked_key_count, 0);
        assert_eq!(stats.total_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_unblock_lifts_automatic_block() {
        let guard = AbuseGuard::default();
        for _ in 0..10 {
            guard.record_failure("1.2.3.4");
        }
        assert!(guard.is_blocked("1.2.3.4"));

        assert!(guard.manual_unblock("1.2.3.4"));
        assert!(!guard.is_blocked("1.2.3.4"));
        assert_eq!(guard.attempts("1.2.3.4"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_include_stale_attempts() {
        let guard = AbuseGuard::default();
        guard.record_failure("a");
        guard.record_failure("b");
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        guard.record_failure("b");

        let stats = guard.stats();
        assert_eq!(stats.tracked_key_count, 2);
        // "a" still holds its stale attempt; "b" was purged to one on append
        assert_eq!(stats.total_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_config_updates_policy_and_switch() {
        let guard = AbuseGuard::default();
        let config = AbuseConfig {
            enabled: false,
            max_failed_attempts: 3,
            ..AbuseConfig::default()
        };
        guard.apply_config(&config);

        assert!(!guard.is_enabled());
        assert_eq!(guard.policy().max_failed_attempts, 3);
        guard.record_failure("k");
        guard.record_failure("k");
        assert!(guard.record_failure("k").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_until_shutdown() {
        let guard = Arc::new(AbuseGuard::default());
        guard.record_failure("stale");

        let (tx, rx) = broadcast::channel(1);
        let handle = guard.clone().spawn_sweeper(Duration::from_secs(60), rx);

        tokio::time::sleep(Duration::from_secs(6 * 60 + 1)).await;
        assert_eq!(guard.stats().tracked_key_count, 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
