//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks and Prometheus metrics, used by
//! container orchestrators and monitoring.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (workers running)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" while workers run, "stopping" during drain.
    pub status: &'static str,
    /// Crate version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Configured worker count.
    pub workers: usize,
}

/// Shared state behind the health endpoints.
pub struct HealthServerState {
    version: String,
    workers: usize,
    started_at: Instant,
    ready: AtomicBool,
    stopping: AtomicBool,
}

impl HealthServerState {
    /// Create state for a pipeline with `workers` workers.
    #[must_use]
    pub fn new(version: String, workers: usize) -> Self {
        Self {
            version,
            workers,
            started_at: Instant::now(),
            ready: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    /// Mark the pipeline ready (workers spawned, schema ensured).
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the pipeline as draining for shutdown.
    pub fn set_stopping(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.stopping.load(Ordering::SeqCst)
    }
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    shutdown: CancellationToken,
}

impl HealthServer {
    /// Create a server on `port`.
    #[must_use]
    pub fn new(port: u16, state: Arc<HealthServerState>, shutdown: CancellationToken) -> Self {
        Self {
            port,
            state,
            shutdown,
        }
    }

    /// Bind and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub async fn run(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health))
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .route("/metrics", get(metrics_text))
            .with_state(Arc::clone(&self.state));

        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "health server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(self.shutdown.cancelled_owned())
            .await
    }
}

async fn health(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let stopping = state.stopping.load(Ordering::SeqCst);
    Json(HealthResponse {
        status: if stopping { "stopping" } else { "healthy" },
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        workers: state.workers,
    })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_text() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "metrics not initialized".to_string(),
            )
        },
        |handle| (StatusCode::OK, handle.render()),
    )
}
