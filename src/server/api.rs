//! Route handlers and response types.
//!
//! - GET /sets
//! - GET /sets/{set_id}/aliases
//! - GET /sets/{set_id}/features[?user_id=...]
//! - GET /health
//! - GET /metrics

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::FillState;
use crate::server::error::ApiError;
use crate::server::AppState;

// ─── Request/Response Types ────────────────────────────────────────────────

/// Directory listing: every set with its aliases.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureSetsResponse {
    #[serde(rename = "featureSets")]
    pub feature_sets: BTreeMap<String, FeatureSetResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureSetResponse {
    pub aliases: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AliasesResponse {
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeaturesQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub known_sets: usize,
    pub directory_state: FillState,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

pub(crate) async fn list_sets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FeatureSetsResponse>, ApiError> {
    let directory = state.cache.directory().await?;

    let feature_sets = directory
        .names()
        .map(|name| {
            let aliases = directory.aliases.aliases_for(name);
            (name.to_string(), FeatureSetResponse { aliases })
        })
        .collect();

    Ok(Json(FeatureSetsResponse { feature_sets }))
}

pub(crate) async fn set_aliases(
    State(state): State<Arc<AppState>>,
    Path(set_id): Path<String>,
) -> Result<Json<AliasesResponse>, ApiError> {
    let aliases = state.cache.aliases_for(&set_id).await?;
    Ok(Json(AliasesResponse { aliases }))
}

/// Cached feature list, or a straight upstream passthrough when `user_id` is given.
pub(crate) async fn set_features(
    State(state): State<Arc<AppState>>,
    Path(set_id): Path<String>,
    Query(query): Query<FeaturesQuery>,
) -> Result<Response, ApiError> {
    if let Some(user_id) = query.user_id.as_deref().filter(|id| !id.is_empty()) {
        return user_features(&state, &set_id, user_id).await;
    }

    match state.cache.features(&set_id).await? {
        Some(features) => Ok(Json(&*features).into_response()),
        None => Err(ApiError::not_found(format!("unknown feature set: {set_id}"))),
    }
}

async fn user_features(state: &AppState, set_id: &str, user_id: &str) -> Result<Response, ApiError> {
    debug!(set = set_id, user_id, "Proxying user features");
    let passthrough = state.upstream.user_features(set_id, user_id).await?;

    let status = StatusCode::from_u16(passthrough.status)
        .map_err(|_| ApiError::internal(format!("upstream returned invalid status {}", passthrough.status)))?;
    if !status.is_success() {
        warn!(set = set_id, status = status.as_u16(), "Upstream rejected user features request");
        return Ok(status.into_response());
    }

    Ok((
        status,
        [(header::CONTENT_TYPE, "application/json")],
        passthrough.body,
    )
        .into_response())
}

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        known_sets: state.cache.known_sets().await,
        directory_state: state.cache.directory_state(),
    })
}

pub(crate) async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let text = state
        .metrics
        .render()
        .map_err(|e| ApiError::internal(format!("failed to encode metrics: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    )
        .into_response())
}
