//! The compression maintainer: transcodes entities whose compression policy
//! has come due.

use super::{ExecutionWindows, gate_on_window};
use crate::state::AppState;
use hoard_compress::Compression;
use hoard_records::{Record, SCAN_PAGE_SIZE, epoch};
use hoard_storage::{BoxSyncRead, resolve_path};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub async fn run(state: Arc<AppState>, windows: ExecutionWindows, sleep: Duration) {
    loop {
        gate_on_window(&windows).await;
        sweep(&state).await;
        debug!("all records processed; sleeping");
        tokio::time::sleep(sleep).await;
    }
}

/// Drain every due record; returns how many were brought to their target
/// format. A record that fails anywhere backs out harmlessly and is retried
/// on a later cycle.
pub async fn sweep(state: &AppState) -> usize {
    let mut converted = 0;
    loop {
        let now = epoch() as i64;
        let due = match state.records.due_for_compression(now, SCAN_PAGE_SIZE).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "unable to query for compression candidates");
                break;
            },
        };
        if due.is_empty() {
            break;
        }
        let mut progressed = false;
        for record in due {
            info!(uid = %record.uid, "discovered compression candidate");
            if process(state, record).await {
                progressed = true;
                converted += 1;
            }
        }
        if !progressed {
            break;
        }
    }
    converted
}

async fn process(state: &AppState, mut record: Record) -> bool {
    let target = record.policy.compress.comp;
    if record.physical.format.comp == target {
        // Nothing to transcode; just retire the policy.
        debug!(uid = %record.uid, "entity already stored in its target format");
        record.policy.compress.clear();
        return match state.records.update(&record).await {
            Ok(_) => true,
            Err(e) => {
                warn!(uid = %record.uid, error = %e, "unable to retire satisfied compression policy; will retry");
                false
            },
        };
    }

    let path = match resolve_path(record.physical.ctime, record.physical.min_res, &record.uid) {
        Ok(path) => path,
        Err(e) => {
            warn!(uid = %record.uid, error = %e, "unable to resolve blob path");
            return false;
        },
    };
    let backend = state.families.backend(record.physical.family.as_deref());
    let reader = match backend.get(&path).await {
        Ok(reader) => reader,
        Err(e) => {
            warn!(uid = %record.uid, error = %e, "unable to open blob for transcoding");
            return false;
        },
    };

    let current = record.physical.format.comp;
    let spool = tokio::task::spawn_blocking(move || -> hoard_compress::Result<_> {
        let decoded: BoxSyncRead = match current {
            Some(format) => Box::new(format.decompress_spooled(reader)?),
            None => reader,
        };
        target.unwrap_or(Compression::None).compress_spooled(decoded)
    })
    .await;
    let spool = match spool {
        Ok(Ok(spool)) => spool,
        Ok(Err(e)) => {
            warn!(uid = %record.uid, error = %e, "transcoding failed; will retry");
            return false;
        },
        Err(e) => {
            warn!(uid = %record.uid, error = %e, "transcoding task failed; will retry");
            return false;
        },
    };

    // The path derives from ctime and uid only, so the new blob lands on
    // the old one; the staged write keeps a failure from tearing it.
    record.physical.format.comp = target;
    if let Err(e) = backend.put(&path, Box::new(spool), true).await {
        warn!(uid = %record.uid, error = %e, "unable to write transcoded blob; backing out with no consequences");
        return false;
    }
    if let Err(e) = backend.make_permanent(&path).await {
        warn!(uid = %record.uid, error = %e, "unable to commit transcoded blob; backing out");
        return false;
    }

    record.policy.compress.clear();
    if let Err(e) = state.records.update(&record).await {
        error!(
            uid = %record.uid,
            error = %e,
            "unable to update record; the entity will be replaced on a subsequent attempt",
        );
        return false;
    }

    // Legacy deployments encoded the format in the filename, leaving the
    // previous encoding at a different path than the one just written.
    if let Ok(old_path) = resolve_path(record.physical.ctime, record.physical.min_res, &record.uid) {
        if old_path != path {
            if let Err(e) = backend.unlink(&old_path, false).await {
                error!(
                    uid = %record.uid,
                    error = %e,
                    "unable to unlink superseded blob; space non-recoverable unless unlinked manually",
                );
            }
        }
    }
    true
}
