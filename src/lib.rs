//! # zipfs
//!
//! Mount a ZIP archive as a read-only filesystem.
//!
//! The archive's central directory is read once at mount time; member
//! content is decompressed on demand, one independent stream per open
//! file. Archives can be local files or remote HTTP resources read with
//! Range requests, so browsing a large remote archive only transfers the
//! central directory and the members actually read.
//!
//! ## Layers
//!
//! - [`io`]: random-access sources ([`ReadAt`])
//! - [`zip`]: central directory parsing and entry decode streams
//! - [`fs`]: directory-tree semantics over the flat entry list
//! - `fuse`: the `fuser` transport (feature `fuse`, on by default)
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipfs::{ArchiveFs, LocalFileReader, ZipArchive};
//!
//! # fn main() -> anyhow::Result<()> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let reader = Arc::new(LocalFileReader::new("archive.zip".as_ref())?);
//! let archive = runtime.block_on(ZipArchive::open(reader))?;
//!
//! // Node operations block on archive reads, so they run outside the runtime.
//! let fs = ArchiveFs::new(archive);
//! for child in fs.read_dir(&fs.root())? {
//!     println!("{}{}", child.name, if child.node.is_directory() { "/" } else { "" });
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod error;
pub mod fs;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{FsError, FsResult};
pub use fs::{ArchiveFs, ArchiveIndex, Node, StreamHandle};
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use zip::{ZipArchive, ZipFileEntry};
