//! In-memory storage backend for testing.

use async_stream::try_stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{BoxSyncRead, WalkPage, WalkStream};
use crate::error::{ErrorKind, Result};
use crate::path::{staged_path, validate as validate_path};
use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Blobs live in a `BTreeMap` behind an [`RwLock`], so all trait methods can
/// operate on `&self` without external synchronisation. Staged writes are
/// held under their staging key until committed, exactly like the local
/// backend's `.tmp` discipline.
pub struct MemoryBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), storage: RwLock::new(BTreeMap::new()) }
    }

    /// Create a backend pre-populated with files.
    ///
    /// Panics on invalid paths; broken test setup should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MemoryBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, data.into());
        }
        Self { name: "memory".to_string(), storage: RwLock::new(map) }
    }

    /// Snapshot of every stored path, staged entries included.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.storage.read().await.keys().cloned().collect()
    }

    /// Direct read of a blob's bytes, bypassing the reader plumbing.
    pub async fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.storage.read().await.get(path).cloned()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, path: &Path) -> Result<BoxSyncRead> {
        let path = validate_path(path)?;
        let data = self
            .storage
            .read()
            .await
            .get(&path)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn put(&self, path: &Path, mut src: BoxSyncRead, staged: bool) -> Result<u64> {
        let path = validate_path(path)?;
        let target = if staged { staged_path(&path) } else { path };
        let data = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let mut out = Vec::new();
            src.read_to_end(&mut out)?;
            Ok(out)
        })
        .await
        .map_err(|_| exn::Exn::from(ErrorKind::Io(std::io::Error::other("blocking task failed"))))?
        .map_err(|e| exn::Exn::from(ErrorKind::Io(e)))?;
        let len = data.len() as u64;
        self.storage.write().await.insert(target, data);
        Ok(len)
    }

    async fn make_permanent(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let staged = staged_path(&path);
        let mut guard = self.storage.write().await;
        let data = guard.remove(&staged).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(staged)))?;
        guard.insert(path, data);
        Ok(())
    }

    async fn unlink(&self, path: &Path, _prune: bool) -> Result<()> {
        // Directories are implicit here, so pruning has nothing to do.
        let path = validate_path(path)?;
        self.storage
            .write()
            .await
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn file_exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    fn walk(&self) -> WalkStream<'_> {
        Box::pin(try_stream! {
            // Group a snapshot by parent directory so each page mirrors what
            // a directory-shaped backend would yield.
            let snapshot: Vec<PathBuf> = self.storage.read().await.keys().cloned().collect();
            let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
            for path in &snapshot {
                dirs.insert(path.parent().map(Path::to_path_buf).unwrap_or_default());
            }
            for dir in dirs {
                let files = snapshot
                    .iter()
                    .filter(|p| p.parent().map(Path::to_path_buf).unwrap_or_default() == dir)
                    .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
                    .collect();
                yield WalkPage { dir, files };
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn reader(bytes: &[u8]) -> BoxSyncRead {
        Box::new(Cursor::new(bytes.to_vec()))
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let backend = MemoryBackend::default();
        backend.put(Path::new("a/b/u"), reader(b"hello"), false).await.unwrap();
        let mut src = backend.get(Path::new("a/b/u")).await.unwrap();
        let mut out = Vec::new();
        src.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_staged_lifecycle() {
        let backend = MemoryBackend::default();
        backend.put(Path::new("a/u"), reader(b"x"), true).await.unwrap();
        assert!(!backend.file_exists(Path::new("a/u")).await.unwrap());
        backend.make_permanent(Path::new("a/u")).await.unwrap();
        assert!(backend.file_exists(Path::new("a/u")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlink_not_found() {
        let backend = MemoryBackend::default();
        let err = backend.unlink(Path::new("nope"), false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_walk_groups_by_directory() {
        let backend = MemoryBackend::with_files([
            ("2012/03/04/05/05/u1", Vec::from(*b"1")),
            ("2012/03/04/05/05/u2", Vec::from(*b"2")),
            ("2013/01/01/00/00/u3", Vec::from(*b"3")),
        ]);
        let pages: Vec<WalkPage> = backend.walk().try_collect().await.unwrap();
        assert_eq!(pages.len(), 2);
        let bucket = pages.iter().find(|p| p.dir == Path::new("2012/03/04/05/05")).unwrap();
        assert_eq!(bucket.files.len(), 2);
    }
}
