//! Quarry Local Filesystem Layer
//!
//! This crate owns everything the storage engine puts on local disk and the
//! discipline for making it durable:
//!
//! 1. **Path layout**: deterministic locations for WAL segments, data
//!    blocks, and metadata records, derived from the filesystem root and
//!    tablet identifiers ([`FsLayout`]).
//! 2. **WAL segment files**: append-only files with sync-on-close
//!    ([`WalSegmentFile`]).
//! 3. **Block manager**: allocation and durable commit of data blocks with
//!    locally-assigned identifiers ([`BlockManager`]).
//! 4. **Sink abstraction**: the [`Appendable`] trait that lets callers
//!    stream bytes into either a WAL file or a block without caring which
//!    ([`sink`]).
//!
//! ## Durability rules
//!
//! A WAL segment is durable once `close()` returns: the file contents are
//! fsynced before the handle is released. A block is durable once
//! `close()` returns: contents fsynced, temp file renamed into place, and
//! the containing directory fsynced so the rename survives a crash.
//! Artifacts that are dropped before `close()` are discarded.

pub mod block_manager;
pub mod layout;
pub mod sink;
pub mod wal;

pub use block_manager::{BlockId, BlockManager, WritableBlock};
pub use layout::{sync_dir, FsLayout};
pub use sink::Appendable;
pub use wal::{reset_tablet_wal_dir, WalSegmentFile};
