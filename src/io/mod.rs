//! Random-access archive sources.
//!
//! The archive index only ever needs positional reads, so every source
//! (local file, HTTP server, in-memory buffer) is reduced to [`ReadAt`].

mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// Returns the number of bytes read, which is only smaller than
    /// `buf.len()` when the source ends first.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`, failing if the source ends first.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(offset, buf).await?;
        if n < buf.len() {
            bail!(
                "Unexpected end of archive: wanted {} bytes at offset {}, got {}",
                buf.len(),
                offset,
                n
            );
        }
        Ok(())
    }
}
