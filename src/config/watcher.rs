//! Configuration file watcher for hot reload.
//!
//! Only the `[abuse]` section is applied to a running guard. Everything else is
//! bound at startup, so a changed listener, upstream or admin setting is
//! reported and otherwise ignored until the next restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{AbuseConfig, GuardConfig};

/// A watcher that forwards reloaded abuse settings to the running server.
pub struct ConfigWatcher {
    path: PathBuf,
    running: GuardConfig,
    update_tx: mpsc::UnboundedSender<AbuseConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, comparing reloads against `running`.
    ///
    /// Returns the watcher and a receiver for abuse policy updates.
    pub fn new(path: &Path, running: GuardConfig) -> (Self, mpsc::UnboundedReceiver<AbuseConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                running,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for updates to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            running,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?path, "Config file change detected, reloading");
                    match load_config(&path) {
                        Ok(next) => {
                            let _ = update_tx.send(accept_reload(&running, next));
                        }
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Failed to reload config, keeping current abuse policy"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Settings in `next` that differ from `running` but only take effect on restart.
pub fn restart_required(running: &GuardConfig, next: &GuardConfig) -> Vec<&'static str> {
    let checks = [
        ("listener", running.listener != next.listener),
        ("upstream", running.upstream != next.upstream),
        ("timeouts", running.timeouts != next.timeouts),
        ("admin", running.admin != next.admin),
        ("observability", running.observability != next.observability),
        ("abuse.key_source", running.abuse.key_source != next.abuse.key_source),
        ("abuse.fallback_key", running.abuse.fallback_key != next.abuse.fallback_key),
        (
            "abuse.sweep_interval_secs",
            running.abuse.sweep_interval_secs != next.abuse.sweep_interval_secs,
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

/// Warn about restart-only changes and keep the hot-reloadable part.
fn accept_reload(running: &GuardConfig, next: GuardConfig) -> AbuseConfig {
    for field in restart_required(running, &next) {
        tracing::warn!(field, "Config change requires a restart, ignoring until then");
    }
    next.abuse
}
