//! Shared test doubles: an in-memory populator and a stub upstream server.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use ff_cache::cache::CacheStore;
use ff_cache::config::CacheConfig;
use ff_cache::metrics::CacheMetrics;
use ff_cache::upstream::{FeatureList, PopulateError, Populator};

/// In-memory upstream with failure injection and call counters.
#[derive(Default)]
pub struct FakePopulator {
    sets: Mutex<Vec<String>>,
    features: Mutex<HashMap<String, FeatureList>>,
    aliases: Mutex<HashMap<String, Vec<String>>>,
    broken_alias_sets: Mutex<HashSet<String>>,
    fail_lists: AtomicUsize,
    fail_features: AtomicUsize,
    feature_delay: Mutex<Option<Duration>>,

    pub list_calls: AtomicUsize,
    pub alias_calls: AtomicUsize,
    feature_calls: Mutex<HashMap<String, usize>>,
}

impl FakePopulator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets `[alpha, beta]`; `alpha -> {1, [x, y]}`, `beta -> {3, [z]}`.
    pub fn scenario() -> Arc<Self> {
        let fake = Self::new();
        fake.add_set("alpha", 1, &["x", "y"]);
        fake.add_set("beta", 3, &["z"]);
        fake
    }

    pub fn add_set(&self, name: &str, version: i64, features: &[&str]) {
        let mut sets = self.sets.lock().unwrap();
        if !sets.iter().any(|s| s == name) {
            sets.push(name.to_string());
        }
        drop(sets);
        self.set_features_for(name, version, features);
    }

    pub fn set_features_for(&self, name: &str, version: i64, features: &[&str]) {
        let list = FeatureList::new(version, features.iter().map(|f| f.to_string()).collect());
        self.features.lock().unwrap().insert(name.to_string(), list);
    }

    pub fn set_aliases_for(&self, name: &str, aliases: &[&str]) {
        self.aliases.lock().unwrap().insert(
            name.to_string(),
            aliases.iter().map(|a| a.to_string()).collect(),
        );
    }

    pub fn break_aliases_for(&self, name: &str) {
        self.broken_alias_sets.lock().unwrap().insert(name.to_string());
    }

    pub fn heal_aliases_for(&self, name: &str) {
        self.broken_alias_sets.lock().unwrap().remove(name);
    }

    /// The next `n` directory listings fail.
    pub fn fail_next_lists(&self, n: usize) {
        self.fail_lists.store(n, Ordering::SeqCst);
    }

    /// The next `n` feature fetches fail, whichever set they are for.
    pub fn fail_next_features(&self, n: usize) {
        self.fail_features.store(n, Ordering::SeqCst);
    }

    pub fn delay_features(&self, delay: Duration) {
        *self.feature_delay.lock().unwrap() = Some(delay);
    }

    pub fn feature_calls(&self, set: &str) -> usize {
        self.feature_calls.lock().unwrap().get(set).copied().unwrap_or(0)
    }

    pub fn total_feature_calls(&self) -> usize {
        self.feature_calls.lock().unwrap().values().sum()
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn alias_fetches(&self) -> usize {
        self.alias_calls.load(Ordering::SeqCst)
    }
}

/// Consume one injected failure, if any are left.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn unavailable(path: &str) -> PopulateError {
    PopulateError::Status {
        url: format!("http://fake-upstream{path}"),
        status: 503,
    }
}

#[async_trait]
impl Populator for FakePopulator {
    async fn list_sets(&self) -> Result<Vec<String>, PopulateError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_lists) {
            return Err(unavailable("/sets"));
        }
        Ok(self.sets.lock().unwrap().clone())
    }

    async fn set_features(&self, set: &str) -> Result<FeatureList, PopulateError> {
        *self
            .feature_calls
            .lock()
            .unwrap()
            .entry(set.to_string())
            .or_default() += 1;

        let delay = *self.feature_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if take_failure(&self.fail_features) {
            return Err(unavailable(&format!("/set/{set}/features")));
        }
        self.features
            .lock()
            .unwrap()
            .get(set)
            .cloned()
            .ok_or_else(|| PopulateError::Status {
                url: format!("http://fake-upstream/set/{set}/features"),
                status: 404,
            })
    }

    async fn set_aliases(&self, set: &str) -> Result<Vec<String>, PopulateError> {
        self.alias_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_alias_sets.lock().unwrap().contains(set) {
            return Err(unavailable(&format!("/set/{set}/aliases")));
        }
        Ok(self
            .aliases
            .lock()
            .unwrap()
            .get(set)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn metrics() -> Arc<CacheMetrics> {
    Arc::new(CacheMetrics::new().unwrap())
}

pub fn store_with(fake: &Arc<FakePopulator>, config: CacheConfig) -> CacheStore {
    CacheStore::new(fake.clone(), config, metrics())
}

pub fn store(fake: &Arc<FakePopulator>) -> CacheStore {
    store_with(fake, CacheConfig::default())
}

// ─── Stub upstream HTTP server ─────────────────────────────────────────────

#[derive(Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

async fn stub_sets() -> Json<serde_json::Value> {
    Json(json!({ "featureSets": ["alpha", "beta"] }))
}

async fn stub_features(Path(set): Path<String>, Query(query): Query<UserQuery>) -> Response {
    match (set.as_str(), query.user_id.as_deref()) {
        (_, Some("blocked")) => StatusCode::FORBIDDEN.into_response(),
        ("alpha", Some(user)) => {
            Json(json!({ "version": 7, "features": [format!("{user}_feature")] })).into_response()
        }
        ("alpha", None) => Json(json!({ "version": 1, "features": ["x", "y"] })).into_response(),
        ("beta", None) => Json(json!({ "version": 3, "features": ["z"] })).into_response(),
        ("garbled", _) => "not json".into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stub_aliases(Path(set): Path<String>) -> Json<serde_json::Value> {
    let aliases: Vec<&str> = match set.as_str() {
        "alpha" => vec!["a1", "a2"],
        _ => vec![],
    };
    Json(json!({ "aliases": aliases }))
}

/// Serve a fake upstream directory on an ephemeral port. Returns its base URL.
pub async fn spawn_upstream() -> String {
    let router = Router::new()
        .route("/sets", get(stub_sets))
        .route("/set/{set}/features", get(stub_features))
        .route("/set/{set}/aliases", get(stub_aliases));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn dead_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
