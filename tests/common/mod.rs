//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path},
    http::{Request, StatusCode},
    response::Response,
    routing::get,
    Extension, Router,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tower::ServiceExt;

use abuse_guard::security::{protect, AbuseGuard};

/// Router answering `/status/{code}` with that status, guarded, with every
/// request attributed to `client`.
#[allow(dead_code)]
pub fn guarded_app(guard: Arc<AbuseGuard>, client: [u8; 4]) -> Router {
    let router = Router::new().route(
        "/status/{code}",
        get(|Path(code): Path<u16>| async move {
            StatusCode::from_u16(code).unwrap_or(StatusCode::OK)
        }),
    );
    let peer = SocketAddr::from((client, 40000));
    protect(router, guard).layer(Extension(ConnectInfo(peer)))
}

#[allow(dead_code)]
pub async fn send(app: &Router, code: u16) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(format!("/status/{}", code))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Start a programmable upstream speaking minimal HTTP/1.1.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            401 => "401 Unauthorized",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}
