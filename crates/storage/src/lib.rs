//! Blob storage for hoard.
//!
//! Entities are content bytes stored at a path derived purely from their
//! record (creation time, bucket resolution, uid), behind the
//! [`StorageBackend`] contract. Writes go through a staged `.tmp` sibling
//! and become visible only on an atomic rename, so an interrupted upload
//! never produces a readable blob.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::{BoxSyncRead, LocalBackend, MemoryBackend, StorageBackend, WalkPage};
pub use crate::error::Error;
pub use crate::path::{STAGING_SUFFIX, prune_eligible, resolve_path, staged_path, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
