//! Wire protocol shared by the storage server, both proxies and the client.
//!
//! Every request and response body (except blob payloads) is JSON. Uploads
//! are multipart/form-data with a `header` JSON part and a `content`
//! octet-stream part; a side-channel mode accepts the content as a spooled
//! file path when a front-end reverse proxy has already written the upload
//! to disk.

pub mod envelope;
pub mod error;
pub mod filter;

pub use crate::envelope::*;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::filter::{MetaFilter, parse_meta_filter};

/// Server endpoint paths.
pub const SERVER_PING: &str = "ping";
pub const SERVER_LIST_FAMILIES: &str = "list/families";
pub const SERVER_STATUS: &str = "status";
pub const SERVER_PUT: &str = "put";
pub const SERVER_GET: &str = "get";
pub const SERVER_DESCRIBE: &str = "describe";
pub const SERVER_UNLINK: &str = "unlink";
pub const SERVER_UPDATE: &str = "update";
pub const SERVER_QUERY: &str = "query";

/// Request header: ask the server to apply the target compression itself.
pub const HEADER_COMPRESS_ON_SERVER: &str = "X-Hoard-Compress-On-Server";
pub const HEADER_COMPRESS_ON_SERVER_TRUE: &str = "yes";
/// Request header: algorithms the client can decode locally.
pub const HEADER_SUPPORTED_COMPRESSION: &str = "X-Hoard-Supported-Compression";
pub const HEADER_SUPPORTED_COMPRESSION_DELIMITER: &str = ";";
/// Response header: the algorithm still applied to the returned body.
pub const HEADER_APPLIED_COMPRESSION: &str = "X-Hoard-Applied-Compression";

/// Multipart part carrying the JSON request header.
pub const PART_HEADER: &str = "header";
/// Multipart part carrying the entity bytes.
pub const PART_CONTENT: &str = "content";
/// Form field marking the reverse-proxy side channel: `content` is then a
/// local filesystem path to the spooled upload, which the server unlinks
/// after opening.
pub const FIELD_NGINX: &str = "nginx";

/// Metadata key a client sets to request a cache lifetime from the caching
/// proxy, in seconds.
pub const META_CACHE_TTL: &str = "_cache:ttl";
