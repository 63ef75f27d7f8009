//! Client for the hoard storage-server protocol.
//!
//! All operations are atomic and instantaneous from the caller's point of
//! view, which makes this the right interface for time-dependent work and
//! the wrong one for callers that cannot handle failure; those should go
//! through the proxies instead.

pub mod error;

pub use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use hoard_compress::Compression;
use hoard_proto::{
    AccessKeys, EntityRequest, FamiliesResponse, HEADER_APPLIED_COMPRESSION, HEADER_COMPRESS_ON_SERVER,
    HEADER_COMPRESS_ON_SERVER_TRUE, HEADER_SUPPORTED_COMPRESSION, HEADER_SUPPORTED_COMPRESSION_DELIMITER,
    PART_CONTENT, PART_HEADER, PingResponse, PutHeader, PutResponse, QueryRequest, QueryResponse,
    SERVER_DESCRIBE, SERVER_GET, SERVER_LIST_FAMILIES, SERVER_PING, SERVER_PUT, SERVER_QUERY, SERVER_STATUS,
    SERVER_UNLINK, SERVER_UPDATE, StatusResponse, UpdateRequest,
};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

/// A blob as returned by `get`, before any local decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedContent {
    pub mime: String,
    /// The algorithm the body is still encoded with, if the server passed
    /// the stored encoding through.
    pub applied_compression: Option<Compression>,
    pub body: Vec<u8>,
}

/// Translate a response status into a protocol error.
fn classify(status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    exn::bail!(match status.as_u16() {
        403 => ErrorKind::NotAuthorised,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::InvalidRecord,
        412 => ErrorKind::InvalidHeaders,
        503 => ErrorKind::TemporaryFailure,
        other => ErrorKind::Http(other),
    })
}

/// Decide where compression of an upload happens.
///
/// With a target format and `compress_on_server` unset, the payload is
/// compressed locally; otherwise the bytes pass through untouched and the
/// returned flag says whether to ask the server to do the work.
fn negotiate_upload(comp: Option<Compression>, compress_on_server: bool, data: Vec<u8>) -> Result<(Vec<u8>, bool)> {
    match comp {
        Some(format) if !compress_on_server => {
            let compressed = format.compress(&data).or_raise(|| ErrorKind::Compression)?;
            Ok((compressed, false))
        },
        Some(_) => Ok((data, true)),
        None => Ok((data, false)),
    }
}

fn supported_formats() -> String {
    Compression::ALL
        .iter()
        .map(Compression::wire_name)
        .collect::<Vec<_>>()
        .join(HEADER_SUPPORTED_COMPRESSION_DELIMITER)
}

/// A client bound to one storage server.
#[derive(Debug, Clone)]
pub struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    /// Address the server at `host:port`. The host may be an IP or a name.
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            base: format!("http://{}:{}/", host.as_ref(), port),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<R> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport)?;
        classify(response.status())?;
        response.json().await.or_raise(|| ErrorKind::Decode)
    }

    /// Whether the server is online; transport failures surface as errors.
    pub async fn ping(&self, timeout: Duration) -> Result<PingResponse> {
        self.post_json(SERVER_PING, &Value::Null, timeout).await
    }

    /// Process and system load snapshot of the server.
    pub async fn status(&self, timeout: Duration) -> Result<StatusResponse> {
        self.post_json(SERVER_STATUS, &Value::Null, timeout).await
    }

    /// All families the server currently knows, sorted.
    pub async fn list_families(&self, timeout: Duration) -> Result<Vec<String>> {
        let response: FamiliesResponse = self.post_json(SERVER_LIST_FAMILIES, &Value::Null, timeout).await?;
        Ok(response.families)
    }

    /// Store an entity.
    ///
    /// With a compression target in the header, the payload is compressed
    /// locally unless `compress_on_server` pushes the work upstream.
    #[instrument(skip(self, header, data), fields(size = data.len()))]
    pub async fn put(
        &self,
        header: &PutHeader,
        data: Vec<u8>,
        compress_on_server: bool,
        timeout: Duration,
    ) -> Result<PutResponse> {
        let (body, server_side) = negotiate_upload(header.physical.format.comp, compress_on_server, data)?;
        let header_json = serde_json::to_string(header).or_raise(|| ErrorKind::Decode)?;
        let form = Form::new().text(PART_HEADER, header_json).part(
            PART_CONTENT,
            Part::bytes(body)
                .file_name("payload")
                .mime_str("application/octet-stream")
                .or_raise(|| ErrorKind::Transport)?,
        );
        let mut request = self.http.post(self.endpoint(SERVER_PUT)).multipart(form).timeout(timeout);
        if server_side {
            request = request.header(HEADER_COMPRESS_ON_SERVER, HEADER_COMPRESS_ON_SERVER_TRUE);
        }
        let response = request.send().await.or_raise(|| ErrorKind::Transport)?;
        classify(response.status())?;
        response.json().await.or_raise(|| ErrorKind::Decode)
    }

    /// Retrieve a blob exactly as stored, advertising every format this
    /// build can decode so the server passes the encoding through.
    #[instrument(skip(self, read_key))]
    pub async fn get_raw(&self, uid: &str, read_key: Option<&str>, timeout: Duration) -> Result<RetrievedContent> {
        let request = EntityRequest {
            uid: uid.to_string(),
            keys: Some(AccessKeys { read: read_key.map(String::from), write: None }),
        };
        let response = self
            .http
            .post(self.endpoint(SERVER_GET))
            .header(HEADER_SUPPORTED_COMPRESSION, supported_formats())
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport)?;
        classify(response.status())?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let applied_compression = response
            .headers()
            .get(HEADER_APPLIED_COMPRESSION)
            .and_then(|v| v.to_str().ok())
            .map(str::parse::<Compression>)
            .transpose()
            .or_raise(|| ErrorKind::Decode)?;
        let body = response.bytes().await.or_raise(|| ErrorKind::Transport)?.to_vec();
        Ok(RetrievedContent { mime, applied_compression, body })
    }

    /// Retrieve a blob's original bytes.
    ///
    /// With `decompress_on_server`, no formats are advertised and the server
    /// undoes the stored compression; otherwise the body travels as stored
    /// and is decoded here.
    #[instrument(skip(self, read_key))]
    pub async fn get(
        &self,
        uid: &str,
        read_key: Option<&str>,
        decompress_on_server: bool,
        timeout: Duration,
    ) -> Result<(String, Vec<u8>)> {
        if decompress_on_server {
            let request = EntityRequest {
                uid: uid.to_string(),
                keys: Some(AccessKeys { read: read_key.map(String::from), write: None }),
            };
            let response = self
                .http
                .post(self.endpoint(SERVER_GET))
                .json(&request)
                .timeout(timeout)
                .send()
                .await
                .or_raise(|| ErrorKind::Transport)?;
            classify(response.status())?;
            let mime = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = response.bytes().await.or_raise(|| ErrorKind::Transport)?.to_vec();
            return Ok((mime, body));
        }
        let retrieved = self.get_raw(uid, read_key, timeout).await?;
        let body = match retrieved.applied_compression {
            Some(format) => format.decompress(&retrieved.body).or_raise(|| ErrorKind::Compression)?,
            None => retrieved.body,
        };
        Ok((retrieved.mime, body))
    }

    /// Fetch a record's description (its record minus keys and internals).
    pub async fn describe(&self, uid: &str, read_key: Option<&str>, timeout: Duration) -> Result<Value> {
        let request = EntityRequest {
            uid: uid.to_string(),
            keys: Some(AccessKeys { read: read_key.map(String::from), write: None }),
        };
        self.post_json(SERVER_DESCRIBE, &request, timeout).await
    }

    /// Update policies and metadata of an existing record.
    pub async fn update(&self, request: &UpdateRequest, timeout: Duration) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint(SERVER_UPDATE))
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport)?;
        classify(response.status())
    }

    /// Unlink an entity and its record.
    pub async fn unlink(&self, uid: &str, write_key: Option<&str>, timeout: Duration) -> Result<()> {
        let request = EntityRequest {
            uid: uid.to_string(),
            keys: Some(AccessKeys { read: None, write: write_key.map(String::from) }),
        };
        let response = self
            .http
            .post(self.endpoint(SERVER_UNLINK))
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport)?;
        classify(response.status())
    }

    /// Run a query, returning matching records up to the server's cap.
    pub async fn query(&self, request: &QueryRequest, timeout: Duration) -> Result<Vec<Value>> {
        let response: QueryResponse = self.post_json(SERVER_QUERY, request, timeout).await?;
        Ok(response.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::FORBIDDEN, ErrorKind::NotAuthorised)]
    #[case(StatusCode::NOT_FOUND, ErrorKind::NotFound)]
    #[case(StatusCode::CONFLICT, ErrorKind::InvalidRecord)]
    #[case(StatusCode::PRECONDITION_FAILED, ErrorKind::InvalidHeaders)]
    #[case(StatusCode::SERVICE_UNAVAILABLE, ErrorKind::TemporaryFailure)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Http(500))]
    fn classify_maps_protocol_statuses(#[case] status: StatusCode, #[case] expected: ErrorKind) {
        let err = classify(status).unwrap_err();
        assert_eq!(*err, expected);
    }

    #[test]
    fn classify_accepts_success() {
        assert!(classify(StatusCode::OK).is_ok());
    }

    #[test]
    fn negotiate_upload_compresses_locally_by_default() {
        let data = vec![0u8; 4096];
        let (body, server_side) = negotiate_upload(Some(Compression::Gzip), false, data.clone()).unwrap();
        assert!(!server_side);
        assert!(body.len() < data.len());
        assert_eq!(Compression::Gzip.decompress(&body).unwrap(), data);
    }

    #[test]
    fn negotiate_upload_defers_to_server_when_asked() {
        let data = b"payload".to_vec();
        let (body, server_side) = negotiate_upload(Some(Compression::Bzip2), true, data.clone()).unwrap();
        assert!(server_side);
        assert_eq!(body, data);
    }

    #[test]
    fn negotiate_upload_without_target_is_a_no_op() {
        let data = b"payload".to_vec();
        let (body, server_side) = negotiate_upload(None, false, data.clone()).unwrap();
        assert!(!server_side);
        assert_eq!(body, data);
    }

    #[test]
    fn supported_formats_header_value() {
        assert_eq!(supported_formats(), "gzip;bz2;lzma");
    }
}
