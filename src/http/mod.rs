//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → security::gate (early gate / response observer)
//!     → server.rs proxy handler → upstream
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
