//! ff-cache: read-through cache for a feature flag directory service.
//!
//! Shields callers from the latency and availability of the upstream
//! directory by serving cached feature sets, refreshing them in the
//! background once they go stale:
//!   first access (blocking fill) → fresh → stale (served while refreshing)
//!
//! Exposes the cached directory over HTTP.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod server;
pub mod upstream;
