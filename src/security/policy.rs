//! Abuse policy: the operator-tunable thresholds shared by the tracker and the
//! block registry.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::AbuseConfig;

/// How the early gate reports `blockedUntil` to a rejected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedUntilMode {
    /// Report the stored expiry of the block.
    #[default]
    ExpiresAt,
    /// Report `now + block_duration` at check time (legacy behavior).
    Recomputed,
}

/// Thresholds governing when a key gets blocked and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbusePolicy {
    /// Failures within the window that trigger a block.
    pub max_failed_attempts: usize,
    /// Sliding window over which failures are counted.
    pub attempt_window: Duration,
    /// How long a block lasts before automatic release.
    pub block_duration: Duration,
    pub blocked_until: BlockedUntilMode,
    /// Upper bound on distinct keys with an attempt record.
    pub max_tracked_keys: usize,
}

impl Default for AbusePolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 10,
            attempt_window: Duration::from_secs(5 * 60),
            block_duration: Duration::from_secs(30 * 60),
            blocked_until: BlockedUntilMode::ExpiresAt,
            max_tracked_keys: 100_000,
        }
    }
}

impl From<&AbuseConfig> for AbusePolicy {
    fn from(config: &AbuseConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            attempt_window: Duration::from_secs(config.attempt_window_secs),
            block_duration: Duration::from_secs(config.block_duration_secs),
            blocked_until: config.blocked_until,
            max_tracked_keys: config.max_tracked_keys,
        }
    }
}

/// Policy handle shared between guard components; swapped atomically on reload.
pub type SharedPolicy = Arc<ArcSwap<AbusePolicy>>;

pub fn shared(policy: AbusePolicy) -> SharedPolicy {
    Arc::new(ArcSwap::from_pointee(policy))
}
