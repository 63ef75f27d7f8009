//! Storage server entry point.

use clap::Parser;
use hoard_config::ServerConfig;
use hoard_records::{Database, RecordStore};
use hoard_server::alert::{Alerter, LogSink};
use hoard_server::{AppState, FamilyRouter, maint, router};
use hoard_storage::{BackendHandle, LocalBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoard-server", about = "The authoritative hoard storage server", version)]
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
    let config: ServerConfig = match hoard_config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail("loading configuration", e),
    };

    let database = match Database::connect(&config.database.path).await {
        Ok(database) => database,
        Err(e) => fail("connecting to the record store", e),
    };
    let records = RecordStore::from(&database);

    let generic: BackendHandle = match LocalBackend::new("generic", &config.storage.path) {
        Ok(backend) => Arc::new(backend),
        Err(e) => fail("building the generic storage backend", e),
    };
    let mut families = FamilyRouter::new(generic);
    for (family, root) in &config.storage.families {
        match LocalBackend::new(family.clone(), root) {
            Ok(backend) => families.register(family.clone(), Arc::new(backend)),
            Err(e) => fail("building a family storage backend", e),
        }
    }

    let alerts = Alerter::new(&config.alerts, Box::new(LogSink));
    let listen = SocketAddr::new(
        config.http.host.parse().unwrap_or_else(|e| fail("parsing the listen address", e)),
        config.http.port,
    );
    let state = Arc::new(AppState::new(config, records, families, alerts));

    maint::spawn_all(state.clone());

    info!(%listen, "storage server listening");
    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(e) => fail("binding the listen socket", e),
    };
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, app).await {
        fail("serving", e);
    }
}
