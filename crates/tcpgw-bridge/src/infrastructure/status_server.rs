//! HTTP status endpoint.
//!
//! Serves `GET /` and `GET /status` on a port separate from the relay, so a
//! load balancer or a human with a browser can check the relay is up.  The
//! relay port itself only speaks newline-delimited JSON.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

/// Body of every status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

impl StatusResponse {
    pub fn online() -> Self {
        Self {
            status: "Online",
            service: "tcpgw-bridge",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse::online())
}

/// Routes of the status endpoint.
pub fn status_router() -> Router {
    Router::new()
        .route("/", get(status))
        .route("/status", get(status))
}

/// Resolves once `running` has been cleared.
pub fn shutdown_flag(running: Arc<AtomicBool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        while running.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

/// Serves the status endpoint on `listener` until `shutdown` resolves.
pub async fn serve_status<F>(listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, status_router())
        .with_graceful_shutdown(shutdown)
        .await
        .context("status endpoint failed")
}

/// Binds `addr` and serves the status endpoint until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn run_status_server(addr: SocketAddr, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind status endpoint on {addr}"))?;
    info!("status endpoint listening on http://{addr}/status");
    serve_status(listener, shutdown_flag(running)).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = status_router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_root_reports_online() {
        // Act
        let (status, body) = get_json("/").await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Online");
        assert_eq!(body["service"], "tcpgw-bridge");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_status_path_matches_root() {
        let (_, root) = get_json("/").await;
        let (status, body) = get_json("/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, root);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (status, _) = get_json("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_stops_when_flag_cleared() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(serve_status(listener, shutdown_flag(Arc::clone(&running))));

        running.store(false, Ordering::Relaxed);
        let result = tokio::time::timeout(Duration::from_secs(2), task).await;

        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
