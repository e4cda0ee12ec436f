use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use ff_cache::cache::CacheStore;
use ff_cache::config::{Cli, Config};
use ff_cache::metrics::CacheMetrics;
use ff_cache::server::{build_router, AppState};
use ff_cache::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "ff_cache=debug,tower_http=debug"
    } else {
        "ff_cache=info,tower_http=info"
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("ff-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);
    config.validate()?;

    info!(
        upstream = %config.upstream.base_url,
        directory_ttl_secs = config.cache.directory_ttl_secs,
        alias_ttl_secs = config.cache.alias_ttl_secs,
        set_ttl_secs = config.cache.set_ttl_secs,
        "Configuration loaded"
    );

    let metrics = Arc::new(CacheMetrics::new()?);
    let upstream = UpstreamClient::new(&config.upstream, metrics.clone())?;
    let cache = CacheStore::new(
        Arc::new(upstream.clone()),
        config.cache.clone(),
        metrics.clone(),
    );

    // Build application state.
    let state = Arc::new(AppState {
        cache: cache.clone(),
        upstream,
        metrics,
        start_time: Instant::now(),
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
    });

    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let drained = cache.drain_background().await;
    info!(drained, "Background refreshes finished, exiting");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
