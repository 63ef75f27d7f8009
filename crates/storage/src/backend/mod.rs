//! Storage backend trait and implementations.
//!
//! One flat contract covers every filesystem type: content bytes go in and
//! out as streams, writes can be staged and later committed atomically, and
//! unlinking can prune emptied bucket directories upward.

mod local;
mod memory;

pub use self::local::LocalBackend;
pub use self::memory::MemoryBackend;
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Boxed synchronous reader, suitable for handing into `spawn_blocking`
/// alongside the codec pipeline.
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// One directory's worth of a filesystem walk: the directory path relative
/// to the backend root, and the plain filenames found directly inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkPage {
    pub dir: PathBuf,
    pub files: Vec<String>,
}

type WalkStream<'a> = Pin<Box<dyn Stream<Item = Result<WalkPage>> + Send + 'a>>;

/// Unified interface for blob storage backends.
///
/// All paths are relative to the backend root and are validated against
/// traversal by implementations. Content moves as boxed synchronous readers
/// so that codec work and disk copies can share one `spawn_blocking` region.
///
/// # Staged writes
/// `put` with `staged = true` writes the bytes under a hidden `.tmp` sibling
/// of `path`; nothing is visible at `path` until [`make_permanent`]
/// (an atomic rename) commits it. Interrupted uploads therefore never leave
/// a readable blob behind, only a staging file that recovery sweeps away.
///
/// [`make_permanent`]: StorageBackend::make_permanent
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Open a blob for streaming reads.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if absent.
    async fn get(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Stream bytes to `path`, creating parent directories as needed.
    ///
    /// With `staged = true` the write lands at the staging sibling and does
    /// not make the file visible at `path`. Returns the number of bytes
    /// written. A failed write removes its partial output.
    async fn put(&self, path: &Path, src: BoxSyncRead, staged: bool) -> Result<u64>;

    /// Atomically rename a staged write onto `path`.
    async fn make_permanent(&self, path: &Path) -> Result<()>;

    /// Remove the blob at `path`.
    ///
    /// With `prune`, walk parent directories upward and remove each that is
    /// empty, stopping at the first non-empty ancestor or the backend root,
    /// never above. Callers must only request pruning for buckets old enough
    /// that concurrent writers cannot race into them
    /// (see [`prune_eligible`](crate::prune_eligible)).
    async fn unlink(&self, path: &Path, prune: bool) -> Result<()>;

    /// Check whether a blob exists at `path`.
    async fn file_exists(&self, path: &Path) -> Result<bool>;

    /// Lazily enumerate every file under the backend root, one directory at
    /// a time.
    fn walk(&self) -> WalkStream<'_>;
}
