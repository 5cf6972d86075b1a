//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, session reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (fails while draining)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::grpc::QuoteServer;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "draining".
    pub status: HealthStatus,
    /// Server version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Quote session counts.
    pub sessions: SessionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting quote streams.
    Healthy,
    /// Shutting down; new streams are refused.
    Draining,
}

/// Quote session counts.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Sessions currently open.
    pub active: usize,
    /// Sessions opened since start.
    pub opened: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    quote_server: Arc<QuoteServer>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, quote_server: Arc<QuoteServer>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            quote_server,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        self.run_on(listener).await
    }

    /// Run on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` on a fatal HTTP error.
    pub async fn run_on(self, listener: TcpListener) -> Result<(), HealthServerError> {
        let app = router(self.state);

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Health server listening");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Draining => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.quote_server.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let server = &state.quote_server;
    let status = if server.is_shutting_down() {
        HealthStatus::Draining
    } else {
        HealthStatus::Healthy
    };

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        sessions: SessionStatus {
            active: server.active_sessions(),
            opened: server.sessions_opened(),
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockPriceSource;
    use crate::application::services::QuoteResolver;
    use crate::infrastructure::config::SessionSettings;

    fn state() -> Arc<HealthServerState> {
        let mut source = MockPriceSource::new();
        source
            .expect_lookup_forex_price()
            .returning(|_| Ok(Decimal::ONE));
        let server = QuoteServer::new(
            QuoteResolver::new(Arc::new(source)),
            SessionSettings::default(),
        );
        Arc::new(HealthServerState::new("1.2.3".to_string(), Arc::new(server)))
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Draining).unwrap(),
            "\"draining\""
        );
    }

    #[test]
    fn fresh_server_is_healthy() {
        let response = build_health_response(&state());

        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.version, "1.2.3");
        assert_eq!(response.sessions.active, 0);
        assert_eq!(response.sessions.opened, 0);
    }

    #[test]
    fn shutdown_marks_server_draining() {
        let state = state();
        state.quote_server.shutdown();

        assert_eq!(build_health_response(&state).status, HealthStatus::Draining);
    }

    #[tokio::test]
    async fn readiness_follows_shutdown() {
        let state = state();
        let ready = readiness_handler(State(Arc::clone(&state)))
            .await
            .into_response();
        assert_eq!(ready.status(), StatusCode::OK);

        state.quote_server.shutdown();
        let draining = readiness_handler(State(state)).await.into_response();
        assert_eq!(draining.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn serves_liveness_over_http() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = HealthServer::new(0, state(), cancel.clone());
        let handle = tokio::spawn(server.run_on(listener));

        let body = reqwest::get(format!("http://{addr}/healthz"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");

        let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["sessions"]["active"], 0);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
