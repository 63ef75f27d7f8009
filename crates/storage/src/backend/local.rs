//! Local filesystem storage backend.
//!
//! Blobs are stored under a configured root directory and accessed with
//! `tokio::fs` for metadata operations; bulk byte copies run on the blocking
//! pool so they can share a thread with the codec pipeline.

use async_stream::try_stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{BoxSyncRead, WalkPage, WalkStream};
use crate::error::{ErrorKind, Result};
use crate::path::{staged_path, validate as validate_path};
use crate::StorageBackend;

/// Work with 32 KiB chunks.
const CHUNK_SIZE: usize = 32 * 1024;

/// Local filesystem storage backend.
///
/// All paths are relative to the configured root directory.
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem backend rooted at an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the root is not
    /// absolute.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root.to_path_buf()));
        }
        Ok(Self { name: name.into(), root: root.to_path_buf() })
    }

    /// Validate a relative storage path and join it with the root.
    fn absolute(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path)?))
    }
}

/// Remove emptied ancestors of `rel`, bottom-up, stopping at the first
/// non-empty directory or the backend root. Shared by any directory-shaped
/// backend; a lost race against a concurrent writer simply stops the walk.
async fn prune_upward(root: &Path, rel: &Path) -> Result<()> {
    let mut current = rel.parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            break;
        }
        let abs = root.join(dir);
        match tokio::fs::remove_dir(&abs).await {
            Ok(()) => debug!(dir = %dir.display(), "removed empty bucket directory"),
            Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => break,
            // Another pruner got there first; keep climbing.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(exn::Exn::from(ErrorKind::from_io(&abs, e))),
        }
        current = dir.parent();
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, path: &Path) -> Result<BoxSyncRead> {
        let abs = self.absolute(path)?;
        let err_path = abs.clone();
        let file = tokio::task::spawn_blocking(move || std::fs::File::open(abs))
            .await
            .or_raise(|| ErrorKind::Io(std::io::Error::other("blocking task failed")))?
            .map_err(|e| exn::Exn::from(ErrorKind::from_io(&err_path, e)))?;
        Ok(Box::new(file))
    }

    async fn put(&self, path: &Path, mut src: BoxSyncRead, staged: bool) -> Result<u64> {
        let rel = validate_path(path)?;
        let target = if staged { staged_path(&rel) } else { rel };
        let abs = self.root.join(&target);
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| exn::Exn::from(ErrorKind::from_io(parent, e)))?;
        }
        let err_path = abs.clone();
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
            let mut file = match std::fs::File::create(&abs) {
                Ok(file) => file,
                Err(e) => return Err(e),
            };
            let mut buf = [0u8; CHUNK_SIZE];
            let mut total = 0u64;
            loop {
                let n = match src.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        drop(file);
                        let _ = std::fs::remove_file(&abs);
                        return Err(e);
                    },
                };
                if let Err(e) = std::io::Write::write_all(&mut file, &buf[..n]) {
                    drop(file);
                    let _ = std::fs::remove_file(&abs);
                    return Err(e);
                }
                total += n as u64;
            }
            Ok(total)
        })
        .await
        .or_raise(|| ErrorKind::Io(std::io::Error::other("blocking task failed")))?
        .map_err(|e| exn::Exn::from(ErrorKind::from_io(&err_path, e)))?;
        Ok(written)
    }

    async fn make_permanent(&self, path: &Path) -> Result<()> {
        let rel = validate_path(path)?;
        let staged = self.root.join(staged_path(&rel));
        let target = self.root.join(&rel);
        tokio::fs::rename(&staged, &target)
            .await
            .map_err(|e| exn::Exn::from(ErrorKind::from_io(&staged, e)))
    }

    async fn unlink(&self, path: &Path, prune: bool) -> Result<()> {
        let rel = validate_path(path)?;
        let abs = self.root.join(&rel);
        tokio::fs::remove_file(&abs)
            .await
            .map_err(|e| exn::Exn::from(ErrorKind::from_io(&abs, e)))?;
        if prune {
            prune_upward(&self.root, &rel).await?;
        }
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> Result<bool> {
        let abs = self.absolute(path)?;
        tokio::fs::try_exists(&abs)
            .await
            .map_err(|e| exn::Exn::from(ErrorKind::from_io(&abs, e)))
    }

    fn walk(&self) -> WalkStream<'_> {
        Box::pin(try_stream! {
            let mut stack = vec![PathBuf::new()];
            while let Some(rel) = stack.pop() {
                let abs = self.root.join(&rel);
                let mut entries = tokio::fs::read_dir(&abs)
                    .await
                    .map_err(|e| exn::Exn::from(ErrorKind::from_io(&abs, e)))?;
                let mut files = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| exn::Exn::from(ErrorKind::from_io(&abs, e)))?
                {
                    let kind = entry
                        .file_type()
                        .await
                        .map_err(|e| exn::Exn::from(ErrorKind::from_io(&entry.path(), e)))?;
                    match entry.file_name().into_string() {
                        Ok(name) if kind.is_dir() => stack.push(rel.join(name)),
                        Ok(name) => files.push(name),
                        Err(name) => warn!(?name, "skipping non-UTF8 filesystem entry"),
                    }
                }
                yield WalkPage { dir: rel, files };
            }
        })
    }
}
