//! Remote tablet bootstrap client.
//!
//! Copies a tablet's complete on-disk state from the current leader
//! replica to this node, then atomically swaps the local superblock to
//! make the copy live.
//!
//! ```text
//! ┌───────────────┐  BeginRemoteBootstrapSession  ┌───────────────┐
//! │   Follower    │ ────────────────────────────> │    Leader     │
//! │  (this node)  │     FetchData (chunked)       │  (bootstrap   │
//! │               │ <──────────────────────────── │   service)    │
//! └──────┬────────┘  EndRemoteBootstrapSession    └───────────────┘
//!        │
//!        ├─→ WAL segments  → <root>/wals/<tablet>/
//!        ├─→ data blocks   → block manager (fresh local ids)
//!        ├─→ consensus metadata
//!        └─→ superblock swap (commit point)
//! ```
//!
//! ## Phases
//!
//! A bootstrap is one strictly ordered pass: begin session → download WAL
//! segments → download and rewrite blocks → write consensus metadata →
//! replace superblock → end session. The superblock swap is the commit
//! point; any failure before it leaves the prior tablet metadata
//! untouched. Failures after it (ending the session) are surfaced but do
//! not invalidate the local tablet, since the remote releases its anchors
//! on its own idle timer.
//!
//! ## Identifier rewriting
//!
//! Remote block ids are meaningless here. Every block reference in the
//! superblock copy is rewritten with the locally-allocated id as its block
//! downloads, and the remote's orphaned-block list is cleared.
//!
//! Downloads are serial for now; parallel fetch is a possible future
//! extension.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::lookup_host;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use quarry_core::{Error, Result};
use quarry_fs::{
    reset_tablet_wal_dir, Appendable, BlockId, BlockManager, FsLayout, WalSegmentFile,
};
use quarry_proto::bootstrap as pb;
use quarry_proto::bootstrap::remote_bootstrap_service_client::RemoteBootstrapServiceClient;
use quarry_tablet::{ConsensusMetadata, TabletMetadata};

use crate::config::RemoteBootstrapConfig;
use crate::fetch::verify_chunk;
use crate::listener::StatusListener;
use crate::remote_error::unwind_remote_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    NoSession,
    SessionStarted,
    SessionEnded,
}

/// Client side of the remote bootstrap protocol.
///
/// One client performs one bootstrap; it is not reusable. Fetches may only
/// be issued between a successful begin and the session end, and the phase
/// preconditions are asserted at entry to each step since a violation is a
/// bug in the calling service, not a runtime condition.
pub struct RemoteBootstrapClient {
    layout: Arc<FsLayout>,
    block_manager: Arc<BlockManager>,
    config: RemoteBootstrapConfig,

    phase: SessionPhase,
    status_listener: Option<Arc<dyn StatusListener>>,

    tablet_id: String,
    session_id: String,
    session_idle_timeout: Duration,
    proxy: Option<RemoteBootstrapServiceClient<Channel>>,
    remote_superblock: Option<pb::TabletSuperblock>,
    wal_seqnos: Vec<u64>,
    committed_cstate: Option<pb::ConsensusState>,
    new_superblock: Option<pb::TabletSuperblock>,
}

impl RemoteBootstrapClient {
    pub fn new(
        layout: Arc<FsLayout>,
        block_manager: Arc<BlockManager>,
        config: RemoteBootstrapConfig,
    ) -> Self {
        Self {
            layout,
            block_manager,
            config,
            phase: SessionPhase::NoSession,
            status_listener: None,
            tablet_id: String::new(),
            session_id: String::new(),
            session_idle_timeout: Duration::ZERO,
            proxy: None,
            remote_superblock: None,
            wal_seqnos: Vec::new(),
            committed_cstate: None,
            new_superblock: None,
        }
    }

    /// Run a full bootstrap of the tablet described by `meta` from the
    /// leader named in `cstate`.
    ///
    /// # Panics
    ///
    /// Panics if the tablet is not in the `REMOTE_BOOTSTRAP_COPYING`
    /// state. The caller establishes that state before invoking us;
    /// anything else is a programming error in the surrounding service.
    pub async fn run(
        &mut self,
        meta: &mut TabletMetadata,
        cstate: &pb::ConsensusState,
        status_listener: Option<Arc<dyn StatusListener>>,
    ) -> Result<()> {
        assert_eq!(
            meta.remote_bootstrap_state(),
            pb::RemoteBootstrapState::RemoteBootstrapCopying,
            "tablet {} handed to the bootstrap client outside the copying state",
            meta.tablet_id()
        );
        let tablet_id = meta.tablet_id().to_string();

        self.begin_session(&tablet_id, cstate, status_listener)
            .await?;
        self.download_wals().await?;
        self.download_blocks().await?;
        self.write_consensus_metadata().await?;

        info!(tablet_id = %self.tablet_id, "Remote bootstrap complete, replacing superblock");
        self.update_status("Replacing tablet superblock");
        let new_superblock = self
            .new_superblock
            .take()
            .ok_or_else(|| Error::IllegalState("No superblock downloaded".to_string()))?;
        meta.replace_superblock(new_superblock).await?;

        // Ending the session releases the anchors held on the remote. A
        // failure here is surfaced but the local tablet is already live;
        // the remote's anchors lapse on its idle timer.
        if let Err(e) = self.end_session().await {
            warn!(tablet_id = %self.tablet_id, error = %e, "Failed to end remote bootstrap session");
            return Err(e);
        }

        Ok(())
    }

    /// Open a bootstrap session against the leader in `cstate`.
    async fn begin_session(
        &mut self,
        tablet_id: &str,
        cstate: &pb::ConsensusState,
        status_listener: Option<Arc<dyn StatusListener>>,
    ) -> Result<()> {
        assert_eq!(
            self.phase,
            SessionPhase::NoSession,
            "begin_session called with a session already open"
        );

        self.tablet_id = tablet_id.to_string();
        self.status_listener = status_listener;

        self.update_status("Initializing remote bootstrap");

        let leader = extract_leader(cstate)
            .map_err(|e| e.prepend("Cannot find leader tablet in config to remotely bootstrap from"))?;
        let addr = leader.last_known_addr.as_ref().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Unknown address for config leader {}",
                leader.permanent_uuid
            ))
        })?;
        let socket_addr = resolve_host_port(&addr.host, addr.port).await?;

        info!(
            tablet_id,
            leader_uuid = %leader.permanent_uuid,
            leader_addr = %socket_addr,
            "Beginning remote bootstrap session"
        );
        self.update_status(&format!(
            "Beginning remote bootstrap session with leader {}:{}",
            addr.host, addr.port
        ));

        let endpoint = Endpoint::from_shared(format!("http://{socket_addr}"))
            .map_err(|e| {
                Error::InvalidArgument(format!("Invalid leader endpoint {socket_addr}: {e}"))
            })?
            .connect_timeout(self.config.begin_session_timeout());
        let channel = endpoint.connect().await.map_err(|e| {
            Error::Network(format!("Failed to connect to leader at {socket_addr}: {e}"))
                .prepend("Unable to begin remote bootstrap session")
        })?;
        let mut proxy = RemoteBootstrapServiceClient::new(channel);

        let req = pb::BeginRemoteBootstrapSessionRequest {
            requestor_uuid: self.layout.uuid().to_string(),
            tablet_id: tablet_id.to_string(),
        };
        let resp = rpc(
            self.config.begin_session_timeout(),
            "BeginRemoteBootstrapSession",
            proxy.begin_remote_bootstrap_session(req),
        )
        .await
        .map_err(|e| e.prepend("Unable to begin remote bootstrap session"))?;

        let superblock = resp.superblock.ok_or_else(|| {
            Error::InvalidArgument("Begin session response is missing a superblock".to_string())
        })?;
        if superblock.remote_bootstrap_state() != pb::RemoteBootstrapState::RemoteBootstrapDone {
            // The leader has not finished its own copy and is an invalid
            // source for ours.
            let err = Error::IllegalState(format!(
                "Leader {} of tablet {tablet_id} is currently remotely bootstrapping itself",
                leader.permanent_uuid
            ));
            warn!(error = %err, "Refusing to bootstrap from a mid-copy leader");
            return Err(err);
        }

        self.session_id = resp.session_id;
        self.session_idle_timeout = Duration::from_millis(resp.session_idle_timeout_millis);
        self.remote_superblock = Some(superblock);
        self.wal_seqnos = resp.wal_segment_seqnos;
        self.committed_cstate = resp.initial_committed_cstate;
        self.proxy = Some(proxy);
        self.phase = SessionPhase::SessionStarted;

        Ok(())
    }

    /// Close the session, releasing the remote's anchors on the files we
    /// copied. Issued after the superblock swap on the success path only;
    /// failure paths leave release to the remote's idle timer.
    async fn end_session(&mut self) -> Result<()> {
        assert_eq!(
            self.phase,
            SessionPhase::SessionStarted,
            "end_session called without an open session"
        );

        self.update_status("Ending remote bootstrap session");

        let req = pb::EndRemoteBootstrapSessionRequest {
            session_id: self.session_id.clone(),
            is_success: true,
        };
        let proxy = self.proxy.as_mut().ok_or_else(|| {
            Error::IllegalState("Session started but no proxy present".to_string())
        })?;
        rpc(
            self.config.begin_session_timeout(),
            "EndRemoteBootstrapSession",
            proxy.end_remote_bootstrap_session(req),
        )
        .await
        .map_err(|e| e.prepend("Failure ending remote bootstrap session"))?;

        self.phase = SessionPhase::SessionEnded;
        self.update_status("Remote bootstrap complete");

        Ok(())
    }

    /// Download every WAL segment advertised by the session into a freshly
    /// reset WAL directory.
    async fn download_wals(&mut self) -> Result<()> {
        assert_eq!(
            self.phase,
            SessionPhase::SessionStarted,
            "download_wals called without an open session"
        );

        // Delete and recreate the WAL dir to ensure stray segments from
        // previous bootstraps and runs are not kept.
        reset_tablet_wal_dir(&self.layout, &self.tablet_id).await?;

        let seqnos = self.wal_seqnos.clone();
        let num_segments = seqnos.len();
        info!(tablet_id = %self.tablet_id, num_segments, "Starting download of WAL segments");
        for (i, seqno) in seqnos.into_iter().enumerate() {
            self.update_status(&format!(
                "Downloading WAL segment with seq. number {seqno} ({}/{num_segments})",
                i + 1
            ));
            self.download_wal(seqno).await?;
        }

        Ok(())
    }

    async fn download_wal(&mut self, seqno: u64) -> Result<()> {
        debug!(tablet_id = %self.tablet_id, seqno, "Downloading WAL segment");
        let data_id = pb::DataId {
            id_type: pb::data_id::IdType::LogSegment as i32,
            wal_segment_seqno: seqno,
            block_id: None,
        };

        let path = self.layout.wal_segment_path(&self.tablet_id, seqno);
        let mut segment = WalSegmentFile::create(&path)
            .await
            .map_err(|e| e.prepend("Unable to open file for writing"))?;
        self.download_file(data_id, &mut segment)
            .await
            .map_err(|e| {
                e.prepend(format!(
                    "Unable to download WAL segment with seq. number {seqno}"
                ))
            })?;
        segment.close().await?;

        Ok(())
    }

    /// Download every block referenced by the remote superblock, rewriting
    /// each reference with the freshly-assigned local id, and publish the
    /// result as the new superblock.
    async fn download_blocks(&mut self) -> Result<()> {
        assert_eq!(
            self.phase,
            SessionPhase::SessionStarted,
            "download_blocks called without an open session"
        );

        let remote_superblock = self
            .remote_superblock
            .clone()
            .ok_or_else(|| Error::IllegalState("No remote superblock received".to_string()))?;

        // Count up the total before rewriting so progress reads k/N.
        let num_blocks: usize = remote_superblock.rowsets.iter().map(count_rowset_blocks).sum();
        info!(tablet_id = %self.tablet_id, num_blocks, "Starting download of data blocks");

        let mut new_superblock = remote_superblock;
        let mut block_count = 0usize;
        for rowset in &mut new_superblock.rowsets {
            for column in &mut rowset.columns {
                self.download_and_rewrite_block(&mut column.block, &mut block_count, num_blocks)
                    .await?;
            }
            for redo in &mut rowset.redo_deltas {
                self.download_and_rewrite_block(&mut redo.block, &mut block_count, num_blocks)
                    .await?;
            }
            for undo in &mut rowset.undo_deltas {
                self.download_and_rewrite_block(&mut undo.block, &mut block_count, num_blocks)
                    .await?;
            }
            if rowset.bloom_block.is_some() {
                self.download_and_rewrite_block(
                    &mut rowset.bloom_block,
                    &mut block_count,
                    num_blocks,
                )
                .await?;
            }
            if rowset.adhoc_index_block.is_some() {
                self.download_and_rewrite_block(
                    &mut rowset.adhoc_index_block,
                    &mut block_count,
                    num_blocks,
                )
                .await?;
            }
        }

        // The orphaned block ids at the remote have no meaning to us.
        new_superblock.orphaned_blocks.clear();

        self.new_superblock = Some(new_superblock);
        Ok(())
    }

    async fn download_and_rewrite_block(
        &mut self,
        block_ref: &mut Option<pb::BlockId>,
        block_count: &mut usize,
        num_blocks: usize,
    ) -> Result<()> {
        let remote_id = match block_ref {
            Some(id) => BlockId::from_pb(id),
            None => {
                return Err(Error::InvalidArgument(
                    "Block reference is missing an id".to_string(),
                ))
            }
        };

        *block_count += 1;
        self.update_status(&format!(
            "Downloading block {remote_id} ({block_count}/{num_blocks})"
        ));

        let new_id = self
            .download_block(remote_id)
            .await
            .map_err(|e| e.prepend(format!("Unable to download block with id {remote_id}")))?;

        *block_ref = Some(new_id.to_pb());
        Ok(())
    }

    async fn download_block(&mut self, remote_id: BlockId) -> Result<BlockId> {
        debug!(tablet_id = %self.tablet_id, %remote_id, "Downloading block");

        let mut block = self
            .block_manager
            .create_block()
            .await
            .map_err(|e| e.prepend("Unable to create new block"))?;

        let data_id = pb::DataId {
            id_type: pb::data_id::IdType::Block as i32,
            wal_segment_seqno: 0,
            block_id: Some(remote_id.to_pb()),
        };
        self.download_file(data_id, &mut block).await?;

        block.close().await
    }

    /// Fetch one data item chunk by chunk, streaming the bytes into
    /// `sink`. Each request carries the session idle timeout as its
    /// deadline; every accepted chunk is offset- and CRC-verified first.
    async fn download_file<A: Appendable>(&mut self, data_id: pb::DataId, sink: &mut A) -> Result<()> {
        let max_length = self.config.max_chunk_length();
        let idle_timeout = self.session_idle_timeout;
        let session_id = self.session_id.clone();
        let proxy = self.proxy.as_mut().ok_or_else(|| {
            Error::IllegalState("Fetch issued without an open session".to_string())
        })?;

        let mut offset = 0u64;
        loop {
            let req = pb::FetchDataRequest {
                session_id: session_id.clone(),
                data_id: Some(data_id.clone()),
                offset,
                max_length,
            };
            let resp = rpc(idle_timeout, "FetchData", proxy.fetch_data(req))
                .await
                .map_err(|e| e.prepend("Unable to fetch data from remote"))?;
            let chunk = resp.chunk.ok_or_else(|| {
                Error::InvalidArgument("Fetch response is missing a data chunk".to_string())
            })?;

            verify_chunk(offset, &chunk).map_err(|e| {
                e.prepend(format!(
                    "Error validating data item {}",
                    describe_data_id(&data_id)
                ))
            })?;

            sink.append(&chunk.data).await?;

            offset += chunk.data.len() as u64;
            if offset == chunk.total_data_length {
                break;
            }
        }

        Ok(())
    }

    /// Persist the consensus metadata received at session begin. Runs
    /// before the superblock swap so the tablet's consensus state is in
    /// place when it becomes live.
    async fn write_consensus_metadata(&mut self) -> Result<()> {
        assert_eq!(
            self.phase,
            SessionPhase::SessionStarted,
            "write_consensus_metadata called without an open session"
        );

        let cstate = self
            .committed_cstate
            .as_ref()
            .ok_or_else(|| Error::IllegalState("No committed consensus state received".to_string()))?;
        let committed_config = cstate.config.clone().unwrap_or_default();
        ConsensusMetadata::create(
            &self.layout,
            &self.tablet_id,
            self.layout.uuid(),
            committed_config,
            cstate.current_term,
        )
        .await?;

        Ok(())
    }

    fn update_status(&self, message: &str) {
        if let Some(listener) = &self.status_listener {
            listener.status_message(&format!("RemoteBootstrap: {message}"));
        }
    }
}

/// Await a unary RPC under `deadline`, translating failures into local
/// errors (with remote error unwinding).
async fn rpc<T, F>(deadline: Duration, what: &str, call: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
{
    match tokio::time::timeout(deadline, call).await {
        Err(_) => Err(Error::TimedOut(format!(
            "{what} RPC timed out after {}ms",
            deadline.as_millis()
        ))),
        Ok(Err(status)) => Err(unwind_remote_error(status)),
        Ok(Ok(resp)) => Ok(resp.into_inner()),
    }
}

/// Pick the peer named by the snapshot's leader uuid.
fn extract_leader(cstate: &pb::ConsensusState) -> Result<pb::RaftPeer> {
    if cstate.leader_uuid.is_empty() {
        return Err(Error::NotFound("No leader found in config".to_string()));
    }
    cstate
        .config
        .as_ref()
        .and_then(|config| {
            config
                .peers
                .iter()
                .find(|peer| peer.permanent_uuid == cstate.leader_uuid)
        })
        .cloned()
        .ok_or_else(|| Error::NotFound("No leader found in config".to_string()))
}

async fn resolve_host_port(host: &str, port: u32) -> Result<std::net::SocketAddr> {
    let port = u16::try_from(port)
        .map_err(|_| Error::InvalidArgument(format!("Invalid port {port} for leader address")))?;
    let mut addrs = lookup_host((host, port)).await.map_err(|e| {
        Error::Network(format!("Failed to resolve leader address {host}:{port}: {e}"))
    })?;
    addrs.next().ok_or_else(|| {
        Error::Network(format!(
            "Leader address {host}:{port} resolved to no usable endpoints"
        ))
    })
}

fn count_rowset_blocks(rowset: &pb::RowSetData) -> usize {
    rowset.columns.len()
        + rowset.redo_deltas.len()
        + rowset.undo_deltas.len()
        + usize::from(rowset.bloom_block.is_some())
        + usize::from(rowset.adhoc_index_block.is_some())
}

fn describe_data_id(data_id: &pb::DataId) -> String {
    match data_id.id_type() {
        pb::data_id::IdType::LogSegment => {
            format!("WAL segment {}", data_id.wal_segment_seqno)
        }
        pb::data_id::IdType::Block => match &data_id.block_id {
            Some(id) => format!("block {}", id.id),
            None => "block <missing id>".to_string(),
        },
        pb::data_id::IdType::Unknown => "<unknown item>".to_string(),
    }
}
