use std::time::SystemTime;

use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::zip::ZipFileEntry;

use super::handle::{Sequential, StreamHandle};
use super::listing::list_children;
use super::resolve::{PathIndex, Resolved};
use super::{ArchiveIndex, SEPARATOR};

/// Node id of the root directory (the FUSE root inode).
pub const ROOT_ID: u64 = 1;
/// Entry `i` of the archive has node id `i + FIRST_ENTRY_ID`.
const FIRST_ENTRY_ID: u64 = 2;

/// Archive entry together with its position in the entry list.
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'a> {
    pub index: usize,
    pub entry: &'a ZipFileEntry,
}

/// A filesystem node: a view bound to at most one archive entry.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// Synthetic top-level directory with no backing entry.
    Root,
    /// Explicit directory entry (name ends with the separator).
    Directory(EntryRef<'a>),
    File(EntryRef<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub kind: FileKind,
    pub perm: u16,
    pub size: u64,
    /// `None` for the root, which has no archive timestamp.
    pub modified: Option<SystemTime>,
}

impl<'a> Node<'a> {
    fn bind(index: usize, entry: &'a ZipFileEntry) -> Self {
        let entry_ref = EntryRef { index, entry };
        if entry.is_directory {
            Node::Directory(entry_ref)
        } else {
            Node::File(entry_ref)
        }
    }

    /// Stable identity, derived from the entry's position in the archive.
    pub fn id(&self) -> u64 {
        match self {
            Node::Root => ROOT_ID,
            Node::Directory(e) | Node::File(e) => e.index as u64 + FIRST_ENTRY_ID,
        }
    }

    pub fn entry(&self) -> Option<&'a ZipFileEntry> {
        match self {
            Node::Root => None,
            Node::Directory(e) | Node::File(e) => Some(e.entry),
        }
    }

    pub fn is_directory(&self) -> bool {
        !matches!(self, Node::File(_))
    }

    /// Prefix its children's entry names start with; `None` for files.
    pub fn prefix(&self) -> Option<&'a str> {
        match self {
            Node::Root => Some(""),
            Node::Directory(e) => Some(&e.entry.file_name),
            Node::File(_) => None,
        }
    }

    pub fn attributes(&self) -> Attributes {
        match self {
            Node::Root => Attributes {
                kind: FileKind::Directory,
                perm: 0o755,
                size: 0,
                modified: None,
            },
            Node::Directory(e) => Attributes {
                kind: FileKind::Directory,
                perm: e.entry.permissions(),
                size: 0,
                modified: Some(e.entry.modified_time()),
            },
            Node::File(e) => Attributes {
                kind: if e.entry.is_symlink() {
                    FileKind::Symlink
                } else {
                    FileKind::RegularFile
                },
                perm: e.entry.permissions(),
                size: e.entry.uncompressed_size,
                modified: Some(e.entry.modified_time()),
            },
        }
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, Copy)]
pub struct Child<'a> {
    pub name: &'a str,
    pub node: Node<'a>,
}

/// Read-only filesystem over an archive index.
///
/// Owns the archive for the lifetime of the mount; every [`Node`]
/// borrows from it.
pub struct ArchiveFs<A: ArchiveIndex> {
    archive: A,
    paths: PathIndex,
}

impl<A: ArchiveIndex> ArchiveFs<A> {
    pub fn new(archive: A) -> Self {
        let paths = PathIndex::new(archive.entries());
        Self { archive, paths }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn root(&self) -> Node<'_> {
        Node::Root
    }

    /// Node for an id previously handed out by [`Node::id`].
    pub fn node(&self, id: u64) -> Option<Node<'_>> {
        if id == ROOT_ID {
            return Some(Node::Root);
        }
        let index = usize::try_from(id.checked_sub(FIRST_ENTRY_ID)?).ok()?;
        let entry = self.archive.entries().get(index)?;
        Some(Node::bind(index, entry))
    }

    /// Directory containing `node`: the entry for its parent path if the
    /// archive records one, otherwise the root.
    pub fn parent(&self, node: &Node<'_>) -> Node<'_> {
        let Some(entry) = node.entry() else {
            return Node::Root;
        };
        let name = entry.file_name.strip_suffix(SEPARATOR).unwrap_or(&entry.file_name);
        name.rfind(SEPARATOR)
            .and_then(|pos| self.paths.get(&name[..=pos]))
            .and_then(|index| self.node(index as u64 + FIRST_ENTRY_ID))
            .unwrap_or(Node::Root)
    }

    pub fn lookup(&self, dir: &Node<'_>, name: &str) -> FsResult<Node<'_>> {
        let prefix = dir.prefix().ok_or(FsError::NotDirectory)?;
        let entries = self.archive.entries();
        let entry_ref = |index: usize| EntryRef {
            index,
            entry: &entries[index],
        };
        let node = match self.paths.resolve(prefix, name) {
            Resolved::File(index) => Node::File(entry_ref(index)),
            Resolved::Directory(index) => Node::Directory(entry_ref(index)),
            Resolved::NotFound => return Err(FsError::NotFound),
        };
        trace!(prefix, name, id = node.id(), "resolved");
        Ok(node)
    }

    /// Immediate children of `dir` in archive order.
    pub fn read_dir(&self, dir: &Node<'_>) -> FsResult<Vec<Child<'_>>> {
        let entries = self.archive.entries();
        // Children borrow from the entry list, not from `dir`.
        let prefix: &str = match dir {
            Node::Root => "",
            Node::Directory(e) => &entries[e.index].file_name,
            Node::File(_) => return Err(FsError::NotDirectory),
        };
        Ok(list_children(entries, prefix)
            .map(|child| Child {
                name: child.name,
                node: Node::bind(child.index, &entries[child.index]),
            })
            .collect())
    }

    /// Open a new decode stream for a file node.
    pub fn open(&self, node: &Node<'_>) -> FsResult<(StreamHandle, Sequential)> {
        let Node::File(file) = node else {
            return Err(FsError::IsDirectory);
        };
        let stream = self.archive.open_entry(file.entry)?;
        Ok((StreamHandle::new(&file.entry.file_name, stream), Sequential))
    }
}
