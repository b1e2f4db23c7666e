//! WAL segment files.
//!
//! A WAL segment is an append-only file identified by a monotonic sequence
//! number. This module provides the write side used during bootstrap:
//! [`WalSegmentFile`] is a one-shot writer with sync-on-close semantics,
//! and [`reset_tablet_wal_dir`] prepares a tablet's WAL directory before
//! the first segment is written.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use quarry_core::Result;

use crate::layout::{sync_dir, FsLayout};
use crate::sink::Appendable;

/// Delete a tablet's WAL directory recursively if it exists, recreate it,
/// and fsync the parent directory. Guarantees no stray segments from a
/// prior failed bootstrap remain.
pub async fn reset_tablet_wal_dir(layout: &FsLayout, tablet_id: &str) -> Result<PathBuf> {
    let dir = layout.tablet_wal_dir(tablet_id);
    if fs::metadata(&dir).await.is_ok() {
        debug!(tablet_id, dir = ?dir, "Removing existing WAL directory");
        fs::remove_dir_all(&dir).await?;
    }
    fs::create_dir_all(&dir).await?;
    if let Some(parent) = dir.parent() {
        sync_dir(parent).await?;
    }
    Ok(dir)
}

/// One-shot writer for a single WAL segment file.
///
/// The segment is not durable until [`WalSegmentFile::close`] returns; a
/// writer dropped without closing leaves a partial file behind for the next
/// [`reset_tablet_wal_dir`] to clean up.
pub struct WalSegmentFile {
    path: PathBuf,
    file: File,
}

impl WalSegmentFile {
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        Ok(())
    }

    /// Flush and fsync the file. The segment is durable once this returns.
    pub async fn close(mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl Appendable for WalSegmentFile {
    async fn append(&mut self, data: &[u8]) -> Result<()> {
        WalSegmentFile::append(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_wal_segment_write_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wal-000000001");

        let mut segment = WalSegmentFile::create(&path).await.unwrap();
        segment.append(b"hello ").await.unwrap();
        segment.append(b"world").await.unwrap();
        segment.close().await.unwrap();

        let contents = fs::read(&path).await.unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn test_reset_removes_stray_segments() {
        let temp_dir = TempDir::new().unwrap();
        let layout = FsLayout::new(temp_dir.path(), "uuid-1");

        // Simulate leftovers from a previous failed bootstrap.
        let dir = layout.tablet_wal_dir("t1");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join("wal-000000099"), b"stale").await.unwrap();

        let dir = reset_tablet_wal_dir(&layout, "t1").await.unwrap();

        let mut entries = fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_creates_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let layout = FsLayout::new(temp_dir.path(), "uuid-1");

        let dir = reset_tablet_wal_dir(&layout, "t1").await.unwrap();
        assert!(fs::metadata(&dir).await.unwrap().is_dir());
    }
}
