//! Operator admin API.
//!
//! Served on its own listener so it is never subject to the abuse guard.
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::security::AbuseGuard;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub guard: Arc<AbuseGuard>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(guard: Arc<AbuseGuard>, api_key: &str) -> Self {
        Self {
            guard,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/abuse/stats", get(get_stats))
        .route("/admin/abuse/blocks", get(list_blocks))
        .route(
            "/admin/abuse/blocks/{key}",
            get(get_block).post(block_key).delete(unblock_key),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::handlers::{BlockStatus, UnblockResult};
    use crate::security::{BlockOrigin, BlockSnapshot, GuardStats};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    const KEY: &str = "test-admin-key";

    fn router() -> (Router, Arc<AbuseGuard>) {
        let guard = Arc::new(AbuseGuard::default());
        (setup_admin_router(AdminState::new(guard.clone(), KEY)), guard)
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_missing_or_wrong_token() {
        let (router, _) = router();

        let res = router.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router.oneshot(request("GET", "/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_block_and_unblock_round() {
        let (router, guard) = router();

        let res = router
            .clone()
            .oneshot(request("POST", "/admin/abuse/blocks/9.9.9.9", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let block: BlockSnapshot = json(res).await;
        assert_eq!(block.origin, BlockOrigin::Manual);
        assert!(guard.is_blocked("9.9.9.9"));

        let res = router
            .clone()
            .oneshot(request("GET", "/admin/abuse/stats", Some(KEY)))
            .await
            .unwrap();
        let stats: GuardStats = json(res).await;
        assert!(stats.blocked_keys.contains("9.9.9.9"));

        let res = router
            .clone()
            .oneshot(request("DELETE", "/admin/abuse/blocks/9.9.9.9", Some(KEY)))
            .await
            .unwrap();
        let result: UnblockResult = json(res).await;
        assert!(result.released);

        let res = router
            .oneshot(request("GET", "/admin/abuse/blocks/9.9.9.9", Some(KEY)))
            .await
            .unwrap();
        let status: BlockStatus = json(res).await;
        assert!(!status.blocked);
        assert!(status.block.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_blocks() {
        let (router, guard) = router();
        guard.manual_block("b");
        guard.manual_block("a");

        let res = router
            .oneshot(request("GET", "/admin/abuse/blocks", Some(KEY)))
            .await
            .unwrap();
        let blocks: Vec<BlockSnapshot> = json(res).await;
        let keys: Vec<_> = blocks.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
    }
}
