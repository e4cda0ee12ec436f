//! HTTP client for the upstream directory service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use crate::config::UpstreamConfig;
use crate::metrics::CacheMetrics;
use crate::upstream::types::{AliasList, FeatureList, FeatureSetNames};
use crate::upstream::{PopulateError, Populator};

/// Raw upstream response relayed to a client without caching.
#[derive(Debug, Clone)]
pub struct Passthrough {
    pub status: u16,
    pub body: Bytes,
}

/// reqwest-backed upstream client. Cheap to clone.
#[derive(Clone)]
pub struct UpstreamClient {
    base: Url,
    http: reqwest::Client,
    metrics: Arc<CacheMetrics>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, metrics: Arc<CacheMetrics>) -> anyhow::Result<Self> {
        let base = Url::parse(config.base_url.trim())
            .map_err(|e| anyhow::anyhow!("invalid upstream.base_url {:?}: {e}", config.base_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("upstream.base_url {:?} cannot be a base URL", config.base_url);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base,
            http,
            metrics,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, PopulateError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PopulateError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        url: Url,
    ) -> Result<T, PopulateError> {
        let result = self.fetch_json(&url).await;
        if let Err(e) = &result {
            error!(resource, error = %e, "Upstream request failed");
        }
        self.metrics.record_upstream(resource, result.is_ok());
        result
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, PopulateError> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| PopulateError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PopulateError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| PopulateError::Transport {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| PopulateError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Fetch one user's view of a set straight from upstream, bypassing the cache.
    ///
    /// Non-success statuses are returned, not treated as errors, so callers can
    /// pass them through. Only transport failures are errors.
    #[instrument(skip(self))]
    pub async fn user_features(&self, set: &str, user_id: &str) -> Result<Passthrough, PopulateError> {
        let mut url = self.url(&["set", set, "features"])?;
        url.query_pairs_mut().append_pair("user_id", user_id);

        let transport = |source| PopulateError::Transport {
            url: url.to_string(),
            source,
        };

        debug!(%url, "GET passthrough");
        let result = async {
            let response = self.http.get(url.clone()).send().await.map_err(transport)?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(transport)?;
            Ok::<_, PopulateError>(Passthrough { status, body })
        }
        .await;

        self.metrics.record_upstream(
            "user_features",
            matches!(&result, Ok(p) if (200..300).contains(&p.status)),
        );
        result
    }
}

#[async_trait]
impl Populator for UpstreamClient {
    async fn list_sets(&self) -> Result<Vec<String>, PopulateError> {
        let url = self.url(&["sets"])?;
        let body: FeatureSetNames = self.get_json("sets", url).await?;
        Ok(body.feature_sets)
    }

    async fn set_features(&self, set: &str) -> Result<FeatureList, PopulateError> {
        let url = self.url(&["set", set, "features"])?;
        self.get_json("features", url).await
    }

    async fn set_aliases(&self, set: &str) -> Result<Vec<String>, PopulateError> {
        let url = self.url(&["set", set, "aliases"])?;
        let body: AliasList = self.get_json("aliases", url).await?;
        Ok(body.aliases)
    }
}
