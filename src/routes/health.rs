use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "AUTV Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Entry counts for one named cache
#[derive(Serialize)]
struct CacheBucketStats {
    name: &'static str,
    entries: usize,
}

/// Cache stats across the service layer
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheStats {
    channel_lists: Vec<CacheBucketStats>,
    guide_documents: usize,
    guide_indexes: usize,
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    caches: CacheStats,
}

/// GET /health - status, uptime and cache occupancy
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    let channel_lists = state
        .channels
        .cache_sizes()
        .await
        .into_iter()
        .map(|(name, entries)| CacheBucketStats { name, entries })
        .collect();
    let (guide_documents, guide_indexes) = state.guides.cache_sizes().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime,
        caches: CacheStats {
            channel_lists,
            guide_documents,
            guide_indexes,
        },
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Readiness probe (for Kubernetes)
///
/// Upstreams are best-effort by design, so nothing external gates
/// readiness.
pub async fn ready() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}

/// Liveness probe (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
