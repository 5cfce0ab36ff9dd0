//! abuse-guard
//!
//! An HTTP front that blocks clients producing too many 4xx responses.
//!
//! ```text
//!   Client ──▶ listener ──▶ early gate ──▶ upstream
//!                              │    ▲          │
//!                              │    └─ response observer ◀─┘
//!                              ▼
//!                       AbuseGuard (tracker + block registry)
//!                              ▲
//!   Operator ──▶ admin API ────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use abuse_guard::admin::{self, AdminState};
use abuse_guard::config::{load_config, watcher::ConfigWatcher, GuardConfig};
use abuse_guard::lifecycle::{signals::shutdown_signal, Shutdown};
use abuse_guard::observability::{logging, metrics};
use abuse_guard::HttpServer;

#[derive(Parser)]
#[command(name = "abuse-guard")]
#[command(about = "HTTP front that temporarily blocks abusive clients", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!("abuse-guard v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        max_failed_attempts = config.abuse.max_failed_attempts,
        attempt_window_secs = config.abuse.attempt_window_secs,
        block_duration_secs = config.abuse.block_duration_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Hot reload only when a file was given; the watcher must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path, config.clone());
            (Some(watcher.run()?), rx)
        }
        None => {
            let (_, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config.clone());

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(server.guard(), &config.admin.api_key);
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    shutdown_signal().await;
    shutdown.trigger();

    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
