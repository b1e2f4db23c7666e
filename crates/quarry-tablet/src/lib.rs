//! Quarry Tablet Metadata Layer
//!
//! Persistence for the two metadata records every tablet replica carries:
//!
//! - the **superblock** ([`metadata::TabletMetadata`]): the root record
//!   describing the tablet's on-disk layout, replaced atomically when a
//!   bootstrap commits;
//! - the **consensus metadata** ([`consensus::ConsensusMetadata`]): the
//!   committed Raft configuration and term for the replica.
//!
//! Both records are prost-encoded proto messages written with the
//! write-temp / fsync / rename / fsync-directory sequence, so a reader
//! after a crash sees either the old record or the new one, never a
//! partial write.

pub mod consensus;
pub mod metadata;

pub use consensus::ConsensusMetadata;
pub use metadata::TabletMetadata;
