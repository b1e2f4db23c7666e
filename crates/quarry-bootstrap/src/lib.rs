//! Quarry Remote Tablet Bootstrap
//!
//! When a new replica joins a tablet's Raft configuration (or a failed one
//! is re-created), it has no local data. This crate implements the client
//! side of remote bootstrap: copying the tablet's complete on-disk state
//! (WAL segments, columnar data blocks, delta blocks, bloom and index
//! blocks) and consensus metadata from the current leader, then atomically
//! swapping the local superblock to make the copy live.
//!
//! ## Guarantees
//!
//! - The local filesystem ends up in either the prior state or a complete
//!   new state; the superblock swap is the single commit point.
//! - Every byte is CRC32C-verified chunk by chunk as it arrives.
//! - Remote block identifiers are rewritten with locally-allocated ones
//!   during transfer.
//! - The remote's anchors on the copied files are released by ending the
//!   session after a successful swap; on failure they lapse with the
//!   remote's idle timer.
//!
//! ## Entry point
//!
//! ```ignore
//! use quarry_bootstrap::{RemoteBootstrapClient, RemoteBootstrapConfig};
//!
//! let mut client = RemoteBootstrapClient::new(layout, block_manager, RemoteBootstrapConfig::default());
//! client.run(&mut meta, &cstate, Some(listener)).await?;
//! ```

pub mod client;
pub mod config;
mod fetch;
pub mod listener;
mod remote_error;

pub use client::RemoteBootstrapClient;
pub use config::{RemoteBootstrapConfig, RPC_HEADER_MARGIN};
pub use listener::{LoggingStatusListener, StatusListener};
