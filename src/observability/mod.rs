//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout log stream
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`client`, `origin`, `request_id`) for machine parsing
//! - Request ID set by tower-http and carried into upstream requests
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
