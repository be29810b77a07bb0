//! Directory-tree view over a flat archive entry list.
//!
//! Entries name full slash-separated paths; a trailing `/` marks an
//! explicit directory. Nothing here synthesizes directories that the
//! archive does not record, so a file nested under a path without its
//! own directory entry is not reachable by hierarchical lookup.

mod handle;
mod listing;
mod node;
mod resolve;

pub use handle::{Sequential, StreamHandle};
pub use listing::{ListedChild, list_children};
pub use node::{ArchiveFs, Attributes, Child, EntryRef, FileKind, Node, ROOT_ID};
pub use resolve::{PathIndex, Resolved};

use std::io::{self, Read};

use crate::zip::ZipFileEntry;

/// Path separator used in archive entry names.
pub const SEPARATOR: char = '/';

/// Read-only entry source behind an [`ArchiveFs`].
///
/// The entry list must not change for the lifetime of the value.
pub trait ArchiveIndex {
    fn entries(&self) -> &[ZipFileEntry];

    /// Open an independent, forward-only stream over the decompressed
    /// content of `entry`.
    fn open_entry(&self, entry: &ZipFileEntry) -> io::Result<Box<dyn Read + Send>>;
}
