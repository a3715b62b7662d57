//! Stremio addon-protocol endpoints
//!
//! Resource paths follow the addon convention: every id segment carries a
//! `.json` suffix and catalog extras arrive as a `key=value` path segment.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::models::addon::{CatalogResponse, MetaResponse, StreamsResponse};
use crate::services::catalog::{self, CatalogScope};
use crate::AppState;

fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}

fn strip_json_suffix(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

/// Extracts the value of one `key=value` extra segment, e.g. `genre=EPL`.
fn parse_extra(extra: &str, key: &str) -> Option<String> {
    let (name, value) = strip_json_suffix(extra).split_once('=')?;
    if name != key {
        return None;
    }
    urlencoding::decode(value).ok().map(|v| v.into_owned())
}

/// GET /manifest.json
pub async fn manifest(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.catalog.manifest().await)
}

/// GET /catalog/tv/:catalog_id.json
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Path(catalog_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    serve_catalog(&state, &catalog_id, None).await
}

/// GET /catalog/tv/:catalog_id/:extra.json
pub async fn catalog_with_extra(
    State(state): State<Arc<AppState>>,
    Path((catalog_id, extra)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let genre = parse_extra(&extra, "genre");
    serve_catalog(&state, &catalog_id, genre.as_deref()).await
}

async fn serve_catalog(
    state: &AppState,
    catalog_id: &str,
    genre: Option<&str>,
) -> Result<Json<CatalogResponse>, (StatusCode, Json<serde_json::Value>)> {
    let scope = CatalogScope::from_key(strip_json_suffix(catalog_id)).ok_or_else(not_found)?;
    let metas = state.catalog.catalog(scope, genre).await;
    Ok(Json(CatalogResponse { metas }))
}

/// GET /meta/tv/:meta_id.json
pub async fn meta(
    State(state): State<Arc<AppState>>,
    Path(meta_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let (scope, channel_id) =
        catalog::parse_meta_id(strip_json_suffix(&meta_id)).ok_or_else(not_found)?;
    let meta = state
        .catalog
        .meta(scope, &channel_id)
        .await
        .ok_or_else(not_found)?;
    Ok(Json(MetaResponse { meta }))
}

/// GET /stream/tv/:meta_id.json
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Path(meta_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let (scope, channel_id) =
        catalog::parse_meta_id(strip_json_suffix(&meta_id)).ok_or_else(not_found)?;
    let streams = state
        .catalog
        .streams(scope, &channel_id)
        .await
        .ok_or_else(not_found)?;
    Ok(Json(StreamsResponse { streams }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_suffix_stripping() {
        assert_eq!(strip_json_suffix("sydney.json"), "sydney");
        assert_eq!(strip_json_suffix("sydney"), "sydney");
        assert_eq!(strip_json_suffix("autv:nz:tvnz-1.json"), "autv:nz:tvnz-1");
    }

    #[test]
    fn test_extra_segment_parsing() {
        assert_eq!(parse_extra("genre=EPL.json", "genre"), Some("EPL".to_string()));
        assert_eq!(
            parse_extra("genre=UK%20Sports.json", "genre"),
            Some("UK Sports".to_string())
        );
        assert_eq!(parse_extra("skip=100.json", "genre"), None);
        assert_eq!(parse_extra("noequals.json", "genre"), None);
    }
}
