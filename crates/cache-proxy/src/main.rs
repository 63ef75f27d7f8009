//! Caching-proxy entry point.

use clap::Parser;
use hoard_alerts::{Alerter, LogSink};
use hoard_cache_proxy::{Cache, ProxyState, router, run_purger};
use hoard_config::CacheProxyConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoard-cache-proxy", about = "Colocated read-side cache for a hoard storage server", version)]
struct Args {
    /// Path to the TOML configuration profile.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn fail(context: &str, err: impl std::fmt::Debug) -> ! {
    error!(context, ?err, "startup failed");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let config: CacheProxyConfig = match hoard_config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail("loading configuration", e),
    };

    let cache = Arc::new(Cache::new(&config));
    if let Err(e) = cache.clear_pool().await {
        fail("clearing leftover cache files", e);
    }
    tokio::spawn(run_purger(cache.clone(), Duration::from_secs(config.storage.purge_interval)));

    let listen = SocketAddr::new(
        config.http.host.parse().unwrap_or_else(|e| fail("parsing the listen address", e)),
        config.http.port,
    );
    let alerts = Alerter::new(&config.alerts, Box::new(LogSink));
    let state = Arc::new(ProxyState { cache, alerts });

    info!(%listen, "caching proxy listening");
    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(e) => fail("binding the listen socket", e),
    };
    if let Err(e) = axum::serve(listener, router(state)).await {
        fail("serving", e);
    }
}
