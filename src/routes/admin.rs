//! Admin endpoints for guide-cache management

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::GuideBucket;
use crate::AppState;

/// Query params for admin operations
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    /// Admin key for authorization (simple protection)
    pub key: Option<String>,
    /// Bucket key for prewarm requests, e.g. `sports`, `au-sydney`
    pub bucket: Option<String>,
}

/// Validate admin key
fn validate_admin_key(state: &AppState, provided_key: Option<&str>) -> bool {
    match provided_key {
        Some(key) => key == state.config.admin_key,
        None => false,
    }
}

/// DELETE /api/admin/guide-cache - Drop every cached guide document and index
///
/// The escape hatch for a stale upstream: the next catalog request rebuilds
/// from fresh fetches.
pub async fn clear_guide_cache(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if !validate_admin_key(&state, query.key.as_deref()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or missing admin key" })),
        ));
    }

    let (documents, indexes) = state.guides.invalidate().await;

    tracing::info!(
        "Admin: guide cache cleared ({} documents, {} indexes)",
        documents,
        indexes
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "cleared": { "documents": documents, "indexes": indexes }
    })))
}

/// POST /api/admin/guide/prewarm - Kick off a bucket build in the background
///
/// Fire-and-forget: answers 202 immediately, the build populates the cache
/// whenever it finishes.
pub async fn prewarm_guide(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if !validate_admin_key(&state, query.key.as_deref()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or missing admin key" })),
        ));
    }

    let bucket = query
        .bucket
        .as_deref()
        .and_then(GuideBucket::from_key)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "Unknown or missing bucket" })),
            )
        })?;

    let guides = state.guides.clone();
    tokio::spawn(async move {
        let _ = guides.get_or_build(bucket, None).await;
    });
    tracing::info!("Admin: prewarm requested for {}", bucket);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "success": true, "bucket": bucket.key() })),
    ))
}
