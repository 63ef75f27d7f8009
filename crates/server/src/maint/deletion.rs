//! The deletion maintainer: removes entities whose deletion policy has come
//! due.

use super::{ExecutionWindows, gate_on_window};
use crate::state::AppState;
use hoard_records::{Record, SCAN_PAGE_SIZE, epoch};
use hoard_storage::{prune_eligible, resolve_path};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn run(state: Arc<AppState>, windows: ExecutionWindows, sleep: Duration) {
    loop {
        gate_on_window(&windows).await;
        sweep(&state).await;
        debug!("all records processed; sleeping");
        tokio::time::sleep(sleep).await;
    }
}

/// Drain every due record; returns how many were removed. Per-record
/// failures are logged and skipped, and the pass ends once a round makes no
/// progress.
pub async fn sweep(state: &AppState) -> usize {
    let mut removed = 0;
    loop {
        let now = epoch() as i64;
        let due = match state.records.due_for_deletion(now, SCAN_PAGE_SIZE).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "unable to query for deletion candidates");
                break;
            },
        };
        if due.is_empty() {
            break;
        }
        let mut progressed = false;
        for record in due {
            info!(uid = %record.uid, "discovered deletion candidate");
            if process(state, &record).await {
                progressed = true;
                removed += 1;
            }
        }
        if !progressed {
            break;
        }
    }
    removed
}

/// Unlink one record's blob (a missing blob is fine) and drop the record.
async fn process(state: &AppState, record: &Record) -> bool {
    let path = match resolve_path(record.physical.ctime, record.physical.min_res, &record.uid) {
        Ok(path) => path,
        Err(e) => {
            warn!(uid = %record.uid, error = %e, "unable to resolve blob path");
            return false;
        },
    };
    let backend = state.families.backend(record.physical.family.as_deref());
    let prune = prune_eligible(epoch(), record.physical.ctime, record.physical.min_res);
    match backend.unlink(&path, prune).await {
        Ok(()) => {},
        Err(e) if matches!(&*e, hoard_storage::error::ErrorKind::NotFound(_)) => {},
        Err(e) => {
            warn!(uid = %record.uid, error = %e, "unable to unlink blob");
            return false;
        },
    }
    match state.records.drop_record(&record.uid).await {
        Ok(_) => true,
        Err(e) => {
            warn!(uid = %record.uid, error = %e, "unable to drop record");
            false
        },
    }
}
