//! Tablet superblock persistence.
//!
//! The superblock is modeled as an owned value: mutations build a new
//! superblock elsewhere and hand it to [`TabletMetadata::replace_superblock`],
//! which persists it atomically and only then adopts it in memory. The old
//! record stays intact on disk until the rename, which is what makes the
//! bootstrap commit point safe.

use std::path::{Path, PathBuf};

use prost::Message;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::info;

use quarry_core::{Error, Result};
use quarry_fs::{sync_dir, FsLayout};
use quarry_proto::bootstrap as pb;

/// A tablet's persistent metadata record.
pub struct TabletMetadata {
    tablet_id: String,
    path: PathBuf,
    superblock: pb::TabletSuperblock,
}

impl TabletMetadata {
    /// Persist a brand-new metadata record for the tablet named by
    /// `superblock.tablet_id`.
    pub async fn create_new(layout: &FsLayout, superblock: pb::TabletSuperblock) -> Result<Self> {
        fs::create_dir_all(layout.tablet_metadata_dir()).await?;
        let tablet_id = superblock.tablet_id.clone();
        let path = layout.tablet_metadata_path(&tablet_id);
        flush_superblock(&path, &superblock).await?;
        Ok(Self {
            tablet_id,
            path,
            superblock,
        })
    }

    pub async fn load(layout: &FsLayout, tablet_id: &str) -> Result<Self> {
        let path = layout.tablet_metadata_path(tablet_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Tablet metadata for {tablet_id} not found"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let superblock = pb::TabletSuperblock::decode(&data[..]).map_err(|e| {
            Error::Corruption(format!("Failed to decode superblock for tablet {tablet_id}: {e}"))
        })?;
        Ok(Self {
            tablet_id: tablet_id.to_string(),
            path,
            superblock,
        })
    }

    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    pub fn superblock(&self) -> &pb::TabletSuperblock {
        &self.superblock
    }

    pub fn remote_bootstrap_state(&self) -> pb::RemoteBootstrapState {
        self.superblock.remote_bootstrap_state()
    }

    /// Atomically replace the persisted superblock. The in-memory record is
    /// updated only after the new one is durable; on any failure the prior
    /// superblock remains live.
    pub async fn replace_superblock(&mut self, superblock: pb::TabletSuperblock) -> Result<()> {
        flush_superblock(&self.path, &superblock).await?;
        info!(tablet_id = %self.tablet_id, "Superblock replaced");
        self.superblock = superblock;
        Ok(())
    }
}

async fn flush_superblock(path: &Path, superblock: &pb::TabletSuperblock) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).await?;
    file.write_all(&superblock.encode_to_vec()).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    if let Some(parent) = path.parent() {
        sync_dir(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn superblock(tablet_id: &str, state: pb::RemoteBootstrapState) -> pb::TabletSuperblock {
        pb::TabletSuperblock {
            tablet_id: tablet_id.to_string(),
            remote_bootstrap_state: state as i32,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let layout = FsLayout::new(temp_dir.path(), "uuid-1");

        let sb = superblock("t1", pb::RemoteBootstrapState::RemoteBootstrapCopying);
        TabletMetadata::create_new(&layout, sb).await.unwrap();

        let meta = TabletMetadata::load(&layout, "t1").await.unwrap();
        assert_eq!(meta.tablet_id(), "t1");
        assert_eq!(
            meta.remote_bootstrap_state(),
            pb::RemoteBootstrapState::RemoteBootstrapCopying
        );
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let layout = FsLayout::new(temp_dir.path(), "uuid-1");

        let result = TabletMetadata::load(&layout, "nope").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_replace_superblock_persists() {
        let temp_dir = TempDir::new().unwrap();
        let layout = FsLayout::new(temp_dir.path(), "uuid-1");

        let sb = superblock("t1", pb::RemoteBootstrapState::RemoteBootstrapCopying);
        let mut meta = TabletMetadata::create_new(&layout, sb).await.unwrap();

        let mut new_sb = superblock("t1", pb::RemoteBootstrapState::RemoteBootstrapDone);
        new_sb.rowsets.push(pb::RowSetData {
            rowset_id: 7,
            ..Default::default()
        });
        meta.replace_superblock(new_sb).await.unwrap();

        let reloaded = TabletMetadata::load(&layout, "t1").await.unwrap();
        assert_eq!(
            reloaded.remote_bootstrap_state(),
            pb::RemoteBootstrapState::RemoteBootstrapDone
        );
        assert_eq!(reloaded.superblock().rowsets.len(), 1);
        assert_eq!(reloaded.superblock().rowsets[0].rowset_id, 7);
    }
}
