//! File-based block manager.
//!
//! Data blocks are immutable once committed. The manager assigns each new
//! block a local identifier, writes it under a temp name, and commits it
//! with fsync + rename + directory fsync so a committed block is always
//! either fully present or absent after a crash. Uncommitted blocks are
//! discarded when their writer is dropped.
//!
//! Identifiers are allocated from a counter seeded by scanning the block
//! directory at open, so a restarted process never reuses an id that
//! already names a committed block.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use quarry_core::{Error, Result};
use quarry_proto::bootstrap as pb;

use crate::layout::sync_dir;
use crate::sink::Appendable;

/// Locally-meaningful opaque identifier for a materialized block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

impl BlockId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    /// Wire-form projection for storage in superblocks.
    pub fn to_pb(&self) -> pb::BlockId {
        pb::BlockId { id: self.0 }
    }

    pub fn from_pb(pb: &pb::BlockId) -> Self {
        Self(pb.id)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates and commits data blocks under a single directory.
pub struct BlockManager {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl BlockManager {
    /// Open (or create) the block directory and seed the id counter past
    /// every committed block found in it.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let mut next_id = 1u64;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".blk") {
                if let Ok(id) = stem.parse::<u64>() {
                    next_id = next_id.max(id + 1);
                }
            }
        }

        debug!(dir = ?dir, next_id, "Block manager opened");
        Ok(Self {
            dir,
            next_id: AtomicU64::new(next_id),
        })
    }

    /// Create a new block with a freshly-assigned id. The block is not
    /// visible to readers until its writer is closed.
    pub async fn create_block(&self) -> Result<WritableBlock> {
        let id = BlockId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let final_path = self.block_path(id);
        let tmp_path = self.dir.join(format!("{id}.blk.tmp"));
        let file = File::create(&tmp_path).await?;
        Ok(WritableBlock {
            id,
            dir: self.dir.clone(),
            tmp_path,
            final_path,
            file: Some(file),
        })
    }

    pub fn block_path(&self, id: BlockId) -> PathBuf {
        self.dir.join(format!("{id}.blk"))
    }

    /// Read a committed block's full contents.
    pub async fn read_block(&self, id: BlockId) -> Result<Vec<u8>> {
        match fs::read(self.block_path(id)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Block {id} not found")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all committed blocks, in no particular order.
    pub async fn committed_block_ids(&self) -> Result<Vec<BlockId>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".blk") {
                if let Ok(id) = stem.parse::<u64>() {
                    ids.push(BlockId(id));
                }
            }
        }
        Ok(ids)
    }
}

/// One-shot writer for a new block.
///
/// The block id is assigned at creation but only names a readable block
/// after [`WritableBlock::close`] commits it. Dropping the writer without
/// closing removes the temp file.
pub struct WritableBlock {
    id: BlockId,
    dir: PathBuf,
    tmp_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
}

impl WritableBlock {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub async fn append(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::IllegalState(format!("Block {} already closed", self.id)))?;
        file.write_all(data).await?;
        Ok(())
    }

    /// Commit the block: fsync contents, rename into place, fsync the
    /// block directory. The id names a durable block once this returns.
    pub async fn close(mut self) -> Result<BlockId> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::IllegalState(format!("Block {} already closed", self.id)))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&self.tmp_path, &self.final_path).await?;
        sync_dir(&self.dir).await?;
        Ok(self.id)
    }
}

impl Drop for WritableBlock {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            // Abandoned before commit; discard the partial write.
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

#[async_trait]
impl Appendable for WritableBlock {
    async fn append(&mut self, data: &[u8]) -> Result<()> {
        WritableBlock::append(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_close_read() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BlockManager::open(temp_dir.path()).await.unwrap();

        let mut block = manager.create_block().await.unwrap();
        block.append(b"column data").await.unwrap();
        let id = block.close().await.unwrap();

        assert_eq!(manager.read_block(id).await.unwrap(), b"column data");
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BlockManager::open(temp_dir.path()).await.unwrap();

        let a = manager.create_block().await.unwrap();
        let b = manager.create_block().await.unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_abandoned_block_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BlockManager::open(temp_dir.path()).await.unwrap();

        let id = {
            let mut block = manager.create_block().await.unwrap();
            block.append(b"partial").await.unwrap();
            block.id()
            // dropped without close()
        };

        assert!(matches!(
            manager.read_block(id).await,
            Err(Error::NotFound(_))
        ));
        assert!(manager.committed_block_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_does_not_reuse_ids() {
        let temp_dir = TempDir::new().unwrap();

        let first_id = {
            let manager = BlockManager::open(temp_dir.path()).await.unwrap();
            let mut block = manager.create_block().await.unwrap();
            block.append(b"x").await.unwrap();
            block.close().await.unwrap()
        };

        let manager = BlockManager::open(temp_dir.path()).await.unwrap();
        let block = manager.create_block().await.unwrap();
        assert!(block.id() > first_id);
    }

    #[tokio::test]
    async fn test_block_id_wire_round_trip() {
        let id = BlockId::new(42);
        assert_eq!(BlockId::from_pb(&id.to_pb()), id);
    }
}
