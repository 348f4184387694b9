use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

use crate::metrics::encode_metrics;
use crate::status::ConnectionStatus;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub symbol: String,
    pub connection: ConnectionStatus,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub symbol: String,
    pub connection: watch::Receiver<ConnectionStatus>,
}

impl ServerState {
    pub fn new(symbol: impl Into<String>, connection: watch::Receiver<ConnectionStatus>) -> Self {
        Self {
            symbol: symbol.into(),
            connection,
        }
    }

    fn current(&self) -> ConnectionStatus {
        *self.connection.borrow()
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        symbol: state.symbol.clone(),
        connection: state.current(),
    })
}

/// Ready endpoint - returns 200 only when connected
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let connection = state.current();
    let connected = connection == ConnectionStatus::Connected;
    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if connected { "ready" } else { "not_ready" }.to_string(),
            symbol: state.symbol.clone(),
            connection,
        }),
    )
}

/// Prometheus text exposition
async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server
pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state(
        status: ConnectionStatus,
    ) -> (watch::Sender<ConnectionStatus>, ServerState) {
        let (tx, rx) = watch::channel(status);
        (tx, ServerState::new("AAPL", rx))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let (_tx, state) = create_test_state(ConnectionStatus::Reconnecting);

        let (status, body) = get_json(create_router(state), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "AAPL");
        assert_eq!(body["connection"], "reconnecting");
    }

    #[tokio::test]
    async fn test_ready_when_connected() {
        let (_tx, state) = create_test_state(ConnectionStatus::Connected);

        let (status, body) = get_json(create_router(state), "/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_ready_tracks_status_changes() {
        let (tx, state) = create_test_state(ConnectionStatus::Connected);
        let app = create_router(state);

        tx.send(ConnectionStatus::Error).unwrap();
        let (status, body) = get_json(app, "/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["connection"], "error");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        crate::metrics::FeedMetrics::new("SERVER-TEST").inc_quote();
        let (_tx, state) = create_test_state(ConnectionStatus::Connected);

        let response = create_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("quotefeed_quotes_total"));
    }
}
