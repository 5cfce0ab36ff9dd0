//! Abuse detection and temporary blocking.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_key.rs (derive key: peer IP / X-Forwarded-For / fallback)
//!     → gate.rs early gate (registry.rs lookup; 403 if blocked)
//!     → rest of the pipeline
//!     → gate.rs response observer (4xx → tracker.rs)
//!         → threshold crossed → registry.rs block + 403 abuse body
//!
//! Operator:
//!     → guard.rs manual block / unblock / stats
//! ```
//!
//! # Design Decisions
//! - One owned `AbuseGuard` instance, injected as axum state
//! - Tracker decides, registry enforces; neither knows about HTTP
//! - Every block is generation-tagged so stale expiry timers are inert
//! - All state is process-local and lost on restart

pub mod client_key;
pub mod gate;
pub mod guard;
pub mod policy;
pub mod registry;
pub mod tracker;

pub use client_key::{ForwardedForKey, KeyExtractor, KeySource, PeerIpKey};
pub use gate::{abuse_guard_middleware, protect, AbuseRejection};
pub use guard::{AbuseGuard, GuardStats};
pub use policy::{AbusePolicy, BlockedUntilMode};
pub use registry::{BlockOrigin, BlockSnapshot};
