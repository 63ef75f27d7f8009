//! The reconcilers: repair divergence between records and blobs.
//!
//! The record-to-file direction drops records whose blob has gone missing; the
//! file-to-record direction unlinks blobs no record claims. The latter is the
//! dangerous one: against a wiped record store it would delete everything,
//! so it stays disabled unless an execution window is configured for it
//! explicitly.

use super::{ExecutionWindows, gate_on_window};
use crate::state::AppState;
use futures::TryStreamExt;
use hoard_records::SCAN_PAGE_SIZE;
use hoard_storage::resolve_path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn run_records(state: Arc<AppState>, windows: ExecutionWindows, sleep: Duration) {
    loop {
        gate_on_window(&windows).await;
        sweep_records(&state).await;
        debug!("all records processed; sleeping");
        tokio::time::sleep(sleep).await;
    }
}

/// Walk every record in ascending ctime order, one page at a time, dropping
/// any whose blob does not exist. Returns the number of records dropped.
pub async fn sweep_records(state: &AppState) -> usize {
    let mut dropped = 0;
    let mut ctime = -1.0;
    loop {
        let page = match state.records.page_after(ctime, SCAN_PAGE_SIZE).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "unable to page through records");
                break;
            },
        };
        if page.is_empty() {
            break;
        }
        for record in page {
            ctime = record.physical.ctime;
            let path = match resolve_path(record.physical.ctime, record.physical.min_res, &record.uid) {
                Ok(path) => path,
                Err(e) => {
                    warn!(uid = %record.uid, error = %e, "unable to resolve blob path");
                    continue;
                },
            };
            let backend = state.families.backend(record.physical.family.as_deref());
            match backend.file_exists(&path).await {
                Ok(true) => {},
                Ok(false) => {
                    warn!(uid = %record.uid, "record has no matching blob; dropping record");
                    match state.records.drop_record(&record.uid).await {
                        Ok(true) => dropped += 1,
                        Ok(false) => {},
                        Err(e) => warn!(uid = %record.uid, error = %e, "unable to drop record"),
                    }
                },
                Err(e) => warn!(uid = %record.uid, error = %e, "unable to test blob existence"),
            }
        }
    }
    dropped
}

pub async fn run_files(state: Arc<AppState>, windows: ExecutionWindows, sleep: Duration) {
    if windows.is_empty() {
        // Deliberately off: with no explicit window this loop never walks.
        info!("filesystem reconciler has no execution window configured; staying disabled");
        return;
    }
    loop {
        gate_on_window(&windows).await;
        sweep_files(&state).await;
        debug!("all files processed; sleeping");
        tokio::time::sleep(sleep).await;
    }
}

/// Walk every backend and unlink files whose uid (the filename up to the
/// first dot) has no record. Returns the number of files unlinked.
pub async fn sweep_files(state: &AppState) -> usize {
    let mut removed = 0;
    let mut families: Vec<Option<String>> = vec![None];
    families.extend(state.families.families().into_iter().map(Some));
    for family in families {
        info!(family = family.as_deref().unwrap_or("generic"), "reconciling family filesystem");
        let backend = state.families.backend(family.as_deref());
        let mut walker = backend.walk();
        loop {
            let page = match walker.try_next().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "unable to traverse filesystem");
                    break;
                },
            };
            for filename in &page.files {
                let uid = filename.split('.').next().unwrap_or(filename);
                match state.records.exists(uid).await {
                    Ok(true) => {},
                    Ok(false) => {
                        warn!(file = %filename, "discovered orphaned file; unlinking");
                        let path = page.dir.join(filename);
                        match backend.unlink(&path, false).await {
                            Ok(()) => removed += 1,
                            Err(e) => warn!(file = %filename, error = %e, "unable to unlink file"),
                        }
                    },
                    Err(e) => warn!(error = %e, "unable to query record store"),
                }
            }
        }
    }
    removed
}
