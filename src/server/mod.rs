//! HTTP server exposing the cached feature set directory.
//!
//! - [`api`]: Response types and route handlers
//! - [`error`]: `ApiError` and its JSON rendering

pub mod api;
pub mod error;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::metrics::CacheMetrics;
use crate::upstream::UpstreamClient;

pub use error::ApiError;

/// Application state shared across handlers.
pub struct AppState {
    pub cache: CacheStore,
    pub upstream: UpstreamClient,
    pub metrics: Arc<CacheMetrics>,
    pub start_time: Instant,
    pub request_timeout: Duration,
}

/// Build the axum router with all routes and the tracing/timeout layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = state.request_timeout;

    Router::new()
        .route("/sets", get(api::list_sets))
        .route("/sets/{set_id}/aliases", get(api::set_aliases))
        .route("/sets/{set_id}/features", get(api::set_features))
        .route("/health", get(api::health))
        .route("/metrics", get(api::metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}
