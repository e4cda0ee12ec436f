//! Prometheus counters for cache fills, lookups and upstream requests.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Cache metrics, registered in a registry owned by this struct.
pub struct CacheMetrics {
    registry: Registry,
    fills: IntCounterVec,
    lookups: IntCounterVec,
    upstream: IntCounterVec,
}

impl CacheMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let fills = IntCounterVec::new(
            Opts::new("ff_cache_fills_total", "Completed cache fills"),
            &["scope", "mode", "outcome"],
        )?;
        let lookups = IntCounterVec::new(
            Opts::new("ff_cache_lookups_total", "Feature lookups by cache outcome"),
            &["outcome"],
        )?;
        let upstream = IntCounterVec::new(
            Opts::new(
                "ff_cache_upstream_requests_total",
                "Requests issued to the upstream directory",
            ),
            &["resource", "outcome"],
        )?;

        registry.register(Box::new(fills.clone()))?;
        registry.register(Box::new(lookups.clone()))?;
        registry.register(Box::new(upstream.clone()))?;

        Ok(Self {
            registry,
            fills,
            lookups,
            upstream,
        })
    }

    /// Record a finished fill. `mode` is "sync" or "async".
    pub fn record_fill(&self, scope: &str, mode: &str, success: bool) {
        self.fills
            .with_label_values(&[scope, mode, outcome_label(success)])
            .inc();
    }

    /// Record how a lookup was served (e.g. "fresh", "stale", "not_found").
    pub fn record_lookup(&self, outcome: &str) {
        self.lookups.with_label_values(&[outcome]).inc();
    }

    pub fn record_upstream(&self, resource: &str, success: bool) {
        self.upstream
            .with_label_values(&[resource, outcome_label(success)])
            .inc();
    }

    pub fn fill_count(&self, scope: &str, mode: &str, success: bool) -> u64 {
        self.fills
            .with_label_values(&[scope, mode, outcome_label(success)])
            .get()
    }

    pub fn lookup_count(&self, outcome: &str) -> u64 {
        self.lookups.with_label_values(&[outcome]).get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn outcome_label(success: bool) -> &'static str {
    if success {
        "ok"
    } else {
        "error"
    }
}
