//! Background maintenance loops.
//!
//! Four long-running, cooperative tasks keep the store healthy: the two
//! policy loops (deletion, compression) and the two reconcilers that repair
//! record/blob divergence. All are gated by configurable execution windows
//! and never propagate errors; a record that cannot be processed is logged
//! and revisited on a later cycle.

pub mod compression;
pub mod deletion;
pub mod reconcile;
pub mod windows;

pub use self::windows::ExecutionWindows;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How often a gated loop rechecks whether its window has opened.
const WINDOW_RECHECK: Duration = Duration::from_secs(60);

/// Sleep until the execution window opens.
pub(crate) async fn gate_on_window(windows: &ExecutionWindows) {
    while !windows.contains_now() {
        debug!("not in execution window; sleeping");
        tokio::time::sleep(WINDOW_RECHECK).await;
    }
}

/// Spawn every configured maintenance loop against the shared state.
pub fn spawn_all(state: Arc<AppState>) {
    let maintainers = state.config.maintainers.clone();
    let deletion_windows = ExecutionWindows::parse(&maintainers.deletion.windows, "deletion policy");
    let compression_windows = ExecutionWindows::parse(&maintainers.compression.windows, "compression policy");
    let database_windows = ExecutionWindows::parse(&maintainers.database.windows, "database integrity");
    let filesystem_windows = ExecutionWindows::parse(&maintainers.filesystem.windows, "filesystem integrity");

    tokio::spawn(deletion::run(
        state.clone(),
        deletion_windows,
        Duration::from_secs(maintainers.deletion.sleep),
    ));
    tokio::spawn(compression::run(
        state.clone(),
        compression_windows,
        Duration::from_secs(maintainers.compression.sleep),
    ));
    tokio::spawn(reconcile::run_records(
        state.clone(),
        database_windows,
        Duration::from_secs(maintainers.database.sleep),
    ));
    tokio::spawn(reconcile::run_files(
        state,
        filesystem_windows,
        Duration::from_secs(maintainers.filesystem.sleep),
    ));
}
