//! Consensus metadata persistence.
//!
//! Each replica records the committed Raft configuration and current term
//! it participates under. During bootstrap this record is written before
//! the superblock swap, so the tablet's consensus state is already in
//! place the moment the copied data becomes live.

use std::path::{Path, PathBuf};

use prost::Message;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use quarry_core::{Error, Result};
use quarry_fs::{sync_dir, FsLayout};
use quarry_proto::bootstrap as pb;

/// A replica's durable consensus metadata record.
pub struct ConsensusMetadata {
    tablet_id: String,
    peer_uuid: String,
    committed_config: pb::RaftConfig,
    current_term: i64,
    path: PathBuf,
}

impl ConsensusMetadata {
    /// Persist a new consensus metadata record, overwriting any prior
    /// record for the tablet.
    pub async fn create(
        layout: &FsLayout,
        tablet_id: &str,
        peer_uuid: &str,
        committed_config: pb::RaftConfig,
        current_term: i64,
    ) -> Result<Self> {
        fs::create_dir_all(layout.consensus_metadata_dir()).await?;
        let path = layout.consensus_metadata_path(tablet_id);

        let record = pb::ConsensusMetadataRecord {
            tablet_id: tablet_id.to_string(),
            peer_uuid: peer_uuid.to_string(),
            committed_config: Some(committed_config.clone()),
            current_term,
        };
        flush_record(&path, &record).await?;

        Ok(Self {
            tablet_id: tablet_id.to_string(),
            peer_uuid: peer_uuid.to_string(),
            committed_config,
            current_term,
            path,
        })
    }

    pub async fn load(layout: &FsLayout, tablet_id: &str) -> Result<Self> {
        let path = layout.consensus_metadata_path(tablet_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Consensus metadata for {tablet_id} not found"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let record = pb::ConsensusMetadataRecord::decode(&data[..]).map_err(|e| {
            Error::Corruption(format!(
                "Failed to decode consensus metadata for tablet {tablet_id}: {e}"
            ))
        })?;
        Ok(Self {
            tablet_id: record.tablet_id,
            peer_uuid: record.peer_uuid,
            committed_config: record.committed_config.unwrap_or_default(),
            current_term: record.current_term,
            path,
        })
    }

    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    pub fn peer_uuid(&self) -> &str {
        &self.peer_uuid
    }

    pub fn committed_config(&self) -> &pb::RaftConfig {
        &self.committed_config
    }

    pub fn current_term(&self) -> i64 {
        self.current_term
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn flush_record(path: &Path, record: &pb::ConsensusMetadataRecord) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).await?;
    file.write_all(&record.encode_to_vec()).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    if let Some(parent) = path.parent() {
        sync_dir(parent).await?;
    }
    Ok(())
}
