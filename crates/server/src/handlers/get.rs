//! The `get` and `describe` endpoints: retrieval.

use crate::auth::get_trust;
use crate::error::ApiError;
use crate::handlers::parse_body;
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use hoard_proto::{EntityRequest, HEADER_APPLIED_COMPRESSION, HEADER_SUPPORTED_COMPRESSION};
use hoard_records::{Record, epoch};
use hoard_storage::{BoxSyncRead, resolve_path};
use serde_json::Value;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Bridge a blocking blob reader into a response body, chunk by chunk.
fn stream_blob(mut reader: BoxSyncRead) -> Body {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(8);
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 32 * 1024];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        // Client went away; stop reading.
                        break;
                    }
                },
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                },
            }
        }
    });
    Body::from_stream(async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield chunk;
        }
    })
}

/// Load a record and check the read facet, sharing the 404/403 ladder
/// between `get` and `describe`.
async fn authorized_record(
    state: &AppState,
    request: &EntityRequest,
    host: &str,
) -> Result<Record, ApiError> {
    let record =
        state.records.get(&request.uid).await.map_err(|e| state.records_failure(e))?.ok_or(ApiError::NotFound)?;
    let trust = get_trust(Some(&record), request.keys.as_ref(), host, state.trusted());
    if !trust.read {
        return Err(ApiError::Forbidden);
    }
    Ok(record)
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: EntityRequest = parse_body(&body)?;
    info!(uid = %request.uid, "proceeding with retrieval request");
    authorized_record(&state, &request, &addr.ip().to_string()).await?;

    // Register the access atomically, then serve from the updated record.
    let record = state
        .records
        .touch(&request.uid, epoch() as i64)
        .await
        .map_err(|e| state.records_failure(e))?
        .ok_or(ApiError::NotFound)?;

    let path = resolve_path(record.physical.ctime, record.physical.min_res, &record.uid)
        .map_err(|e| state.internal("resolving blob path", &e))?;
    let backend = state.families.backend(record.physical.family.as_deref());
    let reader = match backend.get(&path).await {
        Ok(reader) => reader,
        Err(e) if matches!(&*e, hoard_storage::error::ErrorKind::NotFound(_)) => {
            // A reconciler will repair the divergence; the entity is gone
            // as far as this request is concerned.
            error!(uid = %record.uid, "record exists but its blob does not");
            return Err(ApiError::NotFound);
        },
        Err(e) => return Err(state.storage_failure(e)),
    };

    // Pass the stored encoding through when the client can decode it;
    // otherwise undo it here and say nothing.
    let supported = headers
        .get(HEADER_SUPPORTED_COMPRESSION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').map(str::trim).map(String::from).collect::<Vec<_>>())
        .unwrap_or_default();
    let mut applied = record.physical.format.comp;
    let reader: BoxSyncRead = match applied {
        Some(format) if !supported.iter().any(|name| name == format.wire_name()) => {
            applied = None;
            let spool = tokio::task::spawn_blocking(move || format.decompress_spooled(reader))
                .await
                .map_err(|e| state.internal("decompression task", &e))?
                .map_err(|e| state.internal("decompressing entity", &e))?;
            Box::new(spool)
        },
        _ => reader,
    };

    let mut response = Response::builder().status(StatusCode::OK).header(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.physical.format.mime)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(format) = applied {
        response = response.header(HEADER_APPLIED_COMPRESSION, format.wire_name());
    }
    response.body(stream_blob(reader)).map_err(|e| state.internal("building response", &e))
}

pub async fn describe(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: EntityRequest = parse_body(&body)?;
    info!(uid = %request.uid, "proceeding with description request");
    let record = authorized_record(&state, &request, &addr.ip().to_string()).await?;
    Ok(Json(record.describe()))
}
