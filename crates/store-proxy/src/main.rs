//! Storage-proxy entry point.

use clap::Parser;
use hoard_alerts::{Alerter, LogSink};
use hoard_config::StorageProxyConfig;
use hoard_store_proxy::{StoreProxy, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoard-store-proxy", about = "Colocated write-side buffer for a hoard storage server", version)]
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
    let config: StorageProxyConfig = match hoard_config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail("loading configuration", e),
    };

    let alerts = Alerter::new(&config.alerts, Box::new(LogSink));
    let proxy = Arc::new(StoreProxy::new(&config, alerts));
    if let Err(e) = proxy.recover().await {
        fail("recovering the spool", e);
    }
    proxy.spawn_workers();

    let listen = SocketAddr::new(
        config.http.host.parse().unwrap_or_else(|e| fail("parsing the listen address", e)),
        config.http.port,
    );
    info!(%listen, "storage proxy listening");
    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(e) => fail("binding the listen socket", e),
    };
    if let Err(e) = axum::serve(listener, router(proxy)).await {
        fail("serving", e);
    }
}
