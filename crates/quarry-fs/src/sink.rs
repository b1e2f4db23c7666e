//! Byte sink abstraction.
//!
//! The bootstrap fetcher streams a remote data item into whatever local
//! artifact is being materialized: a WAL segment file or a data block. Both
//! expose the same narrow capability, appending bytes in order.

use async_trait::async_trait;

use quarry_core::Result;

/// Anything that accepts bytes in order and persists them on close.
#[async_trait]
pub trait Appendable: Send {
    async fn append(&mut self, data: &[u8]) -> Result<()>;
}
