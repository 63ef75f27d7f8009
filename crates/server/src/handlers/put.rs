//! The `put` endpoint: store one entity.

use crate::error::ApiError;
use crate::handlers::parse_body;
use crate::state::AppState;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::{Form, Json};
use hoard_compress::{Compression, SpoolBuffer};
use hoard_proto::{
    AccessKeys, HEADER_COMPRESS_ON_SERVER, HEADER_COMPRESS_ON_SERVER_TRUE, PART_CONTENT, PART_HEADER,
    PutHeader, PutResponse,
};
use hoard_records::ident::{new_key, new_uid};
use hoard_records::{CompressPolicy, Format, Physical, PolicySet, PolicyWindow, Record, Stats, epoch};
use hoard_storage::{BoxSyncRead, resolve_path};
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The reverse-proxy side channel: a form whose `content` field names a
/// spooled file on local disk instead of carrying the bytes.
#[derive(Deserialize)]
struct SpooledUpload {
    header: String,
    #[serde(default)]
    nginx: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

pub async fn put(State(state): State<Arc<AppState>>, request: Request) -> Result<Json<PutResponse>, ApiError> {
    let compress_on_server = request
        .headers()
        .get(HEADER_COMPRESS_ON_SERVER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == HEADER_COMPRESS_ON_SERVER_TRUE);
    let (header, src) = read_payload(&state, request).await?;
    let record = assemble(&state, header, epoch());
    info!(uid = %record.uid, "proceeding with storage request");

    let src = apply_compression(&state, record.physical.format.comp, compress_on_server, src).await?;
    state.records.insert(&record).await.map_err(|e| state.records_failure(e))?;

    // Staged write plus rename: an interrupted upload never leaves a
    // visible blob behind.
    let path = resolve_path(record.physical.ctime, record.physical.min_res, &record.uid)
        .map_err(|e| state.internal("resolving blob path", &e))?;
    let backend = state.families.backend(record.physical.family.as_deref());
    backend.put(&path, src, true).await.map_err(|e| state.storage_failure(e))?;
    backend.make_permanent(&path).await.map_err(|e| state.storage_failure(e))?;

    Ok(Json(PutResponse { uid: record.uid, keys: record.keys }))
}

/// Extract the header and a readable content source from either intake mode.
async fn read_payload(state: &AppState, request: Request) -> Result<(PutHeader, BoxSyncRead), ApiError> {
    let is_multipart = request
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    if is_multipart {
        return read_multipart(state, request).await;
    }
    read_spooled(state, request).await
}

async fn read_multipart(state: &AppState, request: Request) -> Result<(PutHeader, BoxSyncRead), ApiError> {
    let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| {
        warn!(error = %e, "upload body is not well-formed multipart");
        ApiError::BadRequest
    })?;
    let mut header: Option<PutHeader> = None;
    let mut content: Option<SpoolBuffer> = None;
    while let Some(mut field) = multipart.next_field().await.map_err(|_| ApiError::BadRequest)? {
        match field.name() {
            Some(PART_HEADER) => {
                let text = field.text().await.map_err(|_| ApiError::BadRequest)?;
                header = Some(parse_body(text.as_bytes())?);
            },
            Some(PART_CONTENT) => {
                let mut spool = SpoolBuffer::new();
                while let Some(chunk) = field.chunk().await.map_err(|_| ApiError::BadRequest)? {
                    spool.write_all(&chunk).map_err(|e| state.internal("spooling upload", &e))?;
                }
                spool.rewind().map_err(|e| state.internal("spooling upload", &e))?;
                content = Some(spool);
            },
            _ => {},
        }
    }
    match (header, content) {
        (Some(header), Some(content)) => Ok((header, Box::new(content))),
        _ => {
            warn!("multipart upload is missing its header or content part");
            Err(ApiError::BadRequest)
        },
    }
}

async fn read_spooled(state: &AppState, request: Request) -> Result<(PutHeader, BoxSyncRead), ApiError> {
    let Form(upload) = Form::<SpooledUpload>::from_request(request, &()).await.map_err(|e| {
        warn!(error = %e, "upload body is neither multipart nor a spooled-upload form");
        ApiError::BadRequest
    })?;
    let header = parse_body(upload.header.as_bytes())?;
    if upload.nginx.is_none() {
        // Only the reverse-proxy side channel posts forms.
        return Err(ApiError::BadRequest);
    }
    let Some(path) = upload.content.filter(|path| !path.is_empty()) else {
        warn!("no spooled file specified by the front-end proxy");
        return Err(ApiError::BadRequest);
    };
    let path = std::path::PathBuf::from(path);
    let open_path = path.clone();
    let file = tokio::task::spawn_blocking(move || std::fs::File::open(open_path))
        .await
        .map_err(|e| state.internal("opening spooled upload", &e))?
        .map_err(|e| state.internal("opening spooled upload", &e))?;
    // Reclaim the spool space; our handle keeps the bytes alive.
    if let Err(e) = tokio::fs::remove_file(&path).await {
        error!(
            path = %path.display(),
            error = %e,
            "unable to unlink spooled upload; the server and its front-end proxy should run as the same user",
        );
    }
    Ok((header, Box::new(file)))
}

/// Turn an accepted header into the authoritative record.
fn assemble(state: &AppState, header: PutHeader, now: f64) -> Record {
    let mut policy = PolicySet::default();
    if let Some(policy_in) = &header.policy {
        if let Some(delete) = &policy_in.delete {
            policy.delete = PolicyWindow::unpack(delete, now as i64);
        }
        if let Some(compress) = &policy_in.compress {
            match CompressPolicy::unpack(compress, now as i64, state.allowed_formats()) {
                Some(compress) => policy.compress = compress,
                None => warn!(format = ?compress.comp, "unsupported compression format specified; dropping policy"),
            }
        }
    }
    Record {
        uid: header.uid.unwrap_or_else(new_uid),
        keys: header.keys.unwrap_or_else(|| AccessKeys { read: Some(new_key()), write: Some(new_key()) }),
        physical: Physical {
            family: header.physical.family,
            ctime: now,
            atime: now as i64,
            min_res: state.config.storage.minute_resolution,
            format: Format { mime: header.physical.format.mime, comp: header.physical.format.comp },
        },
        policy,
        stats: Stats::default(),
        meta: header.meta.unwrap_or_default(),
    }
}

/// Run the body through the target codec when the client asked the server
/// to do the compression work.
async fn apply_compression(
    state: &AppState,
    comp: Option<Compression>,
    requested: bool,
    src: BoxSyncRead,
) -> Result<BoxSyncRead, ApiError> {
    let Some(format) = comp.filter(|_| requested) else {
        return Ok(src);
    };
    info!(%format, "compressing entity on the server");
    let spool = tokio::task::spawn_blocking(move || format.compress_spooled(src))
        .await
        .map_err(|e| state.internal("compression task", &e))?
        .map_err(|e| state.internal("compressing entity", &e))?;
    Ok(Box::new(spool))
}
