//! Upstream feature flag directory service.
//!
//! - [`Populator`]: the three reads the cache engine fills itself from
//! - [`client`]: reqwest-backed implementation, plus the per-user passthrough
//! - [`types`]: JSON wire types

pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{Passthrough, UpstreamClient};
pub use types::FeatureList;

#[derive(Error, Debug)]
pub enum PopulateError {
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot build request URL from base {0}")]
    InvalidUrl(String),
}

/// Fetch-and-decode access to the upstream directory.
///
/// Implementations hold no cache and do not retry; both concerns belong to
/// the cache engine.
#[async_trait]
pub trait Populator: Send + Sync {
    /// Names of every known feature set.
    async fn list_sets(&self) -> Result<Vec<String>, PopulateError>;

    /// Versioned feature list of one set.
    async fn set_features(&self, set: &str) -> Result<FeatureList, PopulateError>;

    /// Alias tokens registered for one set.
    async fn set_aliases(&self, set: &str) -> Result<Vec<String>, PopulateError>;
}
