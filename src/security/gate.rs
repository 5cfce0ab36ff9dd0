//! Request gate middleware.
//!
//! Two hooks around the rest of the pipeline:
//! - the early gate rejects requests from blocked keys before any handler runs
//! - the response observer counts 4xx responses and, when a key crosses the
//!   threshold, replaces the in-flight response with the abuse rejection

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::security::guard::AbuseGuard;
use crate::security::policy::BlockedUntilMode;
use crate::security::registry::unix_millis;

pub const ACCESS_FORBIDDEN: &str = "Access forbidden";

/// JSON body sent with every abuse-related 403.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseRejection {
    pub error: String,
    pub message: String,
    /// Epoch millis.
    pub blocked_until: u64,
}

impl AbuseRejection {
    fn new(message: impl Into<String>, blocked_until: u64) -> Self {
        Self {
            error: ACCESS_FORBIDDEN.to_string(),
            message: message.into(),
            blocked_until,
        }
    }
}

impl IntoResponse for AbuseRejection {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, Json(self)).into_response()
    }
}

impl AbuseGuard {
    /// Early gate: a rejection if `key` is currently blocked.
    pub fn check_block(&self, key: &str) -> Option<AbuseRejection> {
        let block = self.block_info(key)?;

        let policy = self.policy();
        let blocked_until = match policy.blocked_until {
            BlockedUntilMode::ExpiresAt => block.expires_at,
            BlockedUntilMode::Recomputed => {
                unix_millis() + policy.block_duration.as_millis() as u64
            }
        };

        tracing::debug!(client = %key, blocked_until, "Rejected blocked client");
        metrics::record_gate_rejection();

        Some(AbuseRejection::new(
            "Your address is temporarily blocked due to repeated failed requests.",
            blocked_until,
        ))
    }

    /// Response observer: feed client errors into the tracker.
    ///
    /// Returns the replacement response when this failure triggered a block.
    pub fn observe_response(&self, key: &str, status: StatusCode) -> Option<AbuseRejection> {
        if !status.is_client_error() {
            return None;
        }

        let block = self.record_failure(key)?;

        Some(AbuseRejection::new(
            format!(
                "Too many failed requests. Your address has been blocked for {}.",
                describe_duration(self.policy().block_duration)
            ),
            block.expires_at,
        ))
    }
}

/// Whole minutes, rounded up; plain seconds below one minute.
fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        return plural(secs, "second");
    }
    plural(secs.div_ceil(60), "minute")
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Axum middleware applying the early gate and the response observer.
pub async fn abuse_guard_middleware(
    State(guard): State<Arc<AbuseGuard>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !guard.is_enabled() {
        return next.run(request).await;
    }

    let key = guard.client_key(&request);

    if let Some(rejection) = guard.check_block(&key) {
        return rejection.into_response();
    }

    let response = next.run(request).await;

    match guard.observe_response(&key, response.status()) {
        Some(rejection) => rejection.into_response(),
        None => response,
    }
}

/// Wrap every route of `router` with the guard.
pub fn protect<S>(router: Router<S>, guard: Arc<AbuseGuard>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(guard, abuse_guard_middleware))
}
