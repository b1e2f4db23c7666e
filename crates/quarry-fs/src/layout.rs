//! Filesystem path layout.
//!
//! All on-disk locations are derived from a single root directory:
//!
//! ```text
//! <root>/
//!   wals/<tablet_id>/wal-000000001     WAL segments, one file per seqno
//!   blocks/<block_id>.blk              committed data blocks
//!   tablet-meta/<tablet_id>            superblock record
//!   consensus-meta/<tablet_id>         consensus metadata record
//! ```
//!
//! Paths are pure functions of the inputs so that a restarted process finds
//! the same files without any registry lookup.

use std::path::{Path, PathBuf};

use quarry_core::Result;

/// Deterministic path layout rooted at a data directory, plus the permanent
/// uuid of the local node.
#[derive(Debug, Clone)]
pub struct FsLayout {
    root: PathBuf,
    uuid: String,
}

impl FsLayout {
    pub fn new(root: impl Into<PathBuf>, uuid: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            uuid: uuid.into(),
        }
    }

    /// Permanent uuid of the local node.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the WAL segments of one tablet.
    pub fn tablet_wal_dir(&self, tablet_id: &str) -> PathBuf {
        self.root.join("wals").join(tablet_id)
    }

    /// Path of one WAL segment file. Sequence numbers are zero-padded so
    /// lexicographic directory order matches numeric order.
    pub fn wal_segment_path(&self, tablet_id: &str, seqno: u64) -> PathBuf {
        self.tablet_wal_dir(tablet_id).join(format!("wal-{seqno:09}"))
    }

    /// Directory managed by the block manager.
    pub fn block_dir(&self) -> PathBuf {
        self.root.join("blocks")
    }

    pub fn tablet_metadata_dir(&self) -> PathBuf {
        self.root.join("tablet-meta")
    }

    pub fn tablet_metadata_path(&self, tablet_id: &str) -> PathBuf {
        self.tablet_metadata_dir().join(tablet_id)
    }

    pub fn consensus_metadata_dir(&self) -> PathBuf {
        self.root.join("consensus-meta")
    }

    pub fn consensus_metadata_path(&self, tablet_id: &str) -> PathBuf {
        self.consensus_metadata_dir().join(tablet_id)
    }
}

/// fsync a directory so that entry creations, deletions, and renames inside
/// it survive a crash.
pub async fn sync_dir(path: &Path) -> Result<()> {
    let dir = tokio::fs::File::open(path).await?;
    dir.sync_all().await?;
    Ok(())
}
