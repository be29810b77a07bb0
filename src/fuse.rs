//! FUSE transport: maps kernel requests onto an [`ArchiveFs`].

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, Request, Session,
};
use libc::{EBADF, EIO, EISDIR, ENOENT, ENOTDIR, EROFS, c_int};
use tracing::{debug, error, info, trace, warn};

use crate::error::{FsError, FsResult};
use crate::fs::{ArchiveFs, ArchiveIndex, FileKind, Node, Sequential, StreamHandle};

// Entries never change while mounted.
const TTL: Duration = Duration::from_secs(60);
const BLOCK_SIZE: u32 = 512;

// fuse_open_out.open_flags bits; fuser only exports NONSEEKABLE behind
// its abi-7-10 feature.
const FOPEN_DIRECT_IO: u32 = 1 << 0;
const FOPEN_NONSEEKABLE: u32 = 1 << 2;

/// Open flags for a sequential stream: no seeking, and no page cache so
/// the kernel forwards reads in the order the reader issues them.
fn open_flags(_: Sequential) -> u32 {
    FOPEN_NONSEEKABLE | FOPEN_DIRECT_IO
}

fn errno(err: &FsError) -> c_int {
    match err {
        FsError::NotFound => ENOENT,
        FsError::NotDirectory => ENOTDIR,
        FsError::IsDirectory => EISDIR,
        FsError::Io(_) => EIO,
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
        FileKind::Symlink => FileType::Symlink,
    }
}

fn file_attr(node: &Node<'_>, uid: u32, gid: u32) -> FileAttr {
    let attr = node.attributes();
    // One archive timestamp serves as mtime, ctime and crtime.
    let time = attr.modified.unwrap_or(UNIX_EPOCH);
    FileAttr {
        ino: node.id(),
        size: attr.size,
        blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
        atime: time,
        mtime: time,
        ctime: time,
        crtime: time,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: if attr.kind == FileKind::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Read until `buf` is full or the stream ends.
///
/// An error after some bytes were read returns those bytes; the stream
/// has already consumed them. A persistent error surfaces on the next read.
fn fill(handle: &mut StreamHandle, buf: &mut [u8]) -> FsResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match handle.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if filled > 0 => {
                debug!(name = handle.name(), filled, error = %e, "short read before error");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// [`fuser::Filesystem`] over an archive.
///
/// Open files live in a handle table keyed by the `fh` returned from
/// `open`; each open gets its own stream.
pub struct ZipFs<A: ArchiveIndex> {
    fs: ArchiveFs<A>,
    handles: HashMap<u64, StreamHandle>,
    next_fh: u64,
    uid: u32,
    gid: u32,
}

impl<A: ArchiveIndex> ZipFs<A> {
    pub fn new(fs: ArchiveFs<A>) -> Self {
        Self {
            fs,
            handles: HashMap::new(),
            next_fh: 1,
            uid: 0,
            gid: 0,
        }
    }

    /// Number of files currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

impl<A: ArchiveIndex> Filesystem for ZipFs<A> {
    fn init(&mut self, req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        self.uid = req.uid();
        self.gid = req.gid();
        info!(
            entries = self.fs.archive().entries().len(),
            uid = self.uid,
            gid = self.gid,
            "filesystem mounted"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let open = self.open_handles();
        for (_, handle) in self.handles.drain() {
            handle.release();
        }
        info!(open, "filesystem unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(dir) = self.fs.node(parent) else {
            reply.error(ENOENT);
            return;
        };
        // Archive names are UTF-8 (lossily decoded), so nothing else can match.
        let Some(name) = name.to_str() else {
            trace!(parent, "lookup: name is not UTF-8");
            reply.error(ENOENT);
            return;
        };

        match self.fs.lookup(&dir, name) {
            Ok(node) => {
                trace!(parent, name, ino = node.id(), "lookup");
                reply.entry(&TTL, &file_attr(&node, self.uid, self.gid), 0);
            }
            Err(e) => {
                trace!(parent, name, error = %e, "lookup failed");
                reply.error(errno(&e));
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(ino, "getattr");
        match self.fs.node(ino) {
            Some(node) => reply.attr(&TTL, &file_attr(&node, self.uid, self.gid)),
            None => {
                warn!(ino, "getattr: unknown inode");
                reply.error(ENOENT);
            }
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(ino, flags, "open");
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(EROFS);
            return;
        }
        let Some(node) = self.fs.node(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.open(&node) {
            Ok((handle, access)) => {
                let fh = self.next_fh;
                self.next_fh += 1;
                debug!(ino, fh, name = handle.name(), "opened");
                self.handles.insert(fh, handle);
                reply.opened(fh, open_flags(access));
            }
            Err(e) => {
                error!(ino, error = %e, "open failed");
                reply.error(errno(&e));
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(ino, fh, offset, size, "read");
        let Some(handle) = self.handles.get_mut(&fh) else {
            warn!(ino, fh, "read: unknown handle");
            reply.error(EBADF);
            return;
        };

        let mut buf = vec![0u8; size as usize];
        match fill(handle, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => {
                error!(ino, fh, name = handle.name(), error = %e, "read failed");
                reply.error(errno(&e));
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.handles.remove(&fh) {
            Some(handle) => {
                debug!(ino, fh, name = handle.name(), "released");
                handle.release();
                reply.ok();
            }
            None => {
                warn!(ino, fh, "release: unknown handle");
                reply.error(EBADF);
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(dir) = self.fs.node(ino) else {
            reply.error(ENOENT);
            return;
        };
        let children = match self.fs.read_dir(&dir) {
            Ok(children) => children,
            Err(e) => {
                reply.error(errno(&e));
                return;
            }
        };
        debug!(ino, offset, entries = children.len(), "readdir");

        let parent = self.fs.parent(&dir);
        let rows = [
            (dir.id(), FileType::Directory, "."),
            (parent.id(), FileType::Directory, ".."),
        ]
        .into_iter()
        .chain(
            children
                .iter()
                .map(|c| (c.node.id(), file_type(c.node.attributes().kind), c.name)),
        );

        for (i, (ino, kind, name)) in rows.enumerate().skip(offset.max(0) as usize) {
            if reply.add(ino, i as i64 + 1, kind, name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mount `fs` read-only at `mountpoint`.
///
/// The returned session serves requests once [`Session::run`] is called
/// and unmounts when it is dropped.
pub fn mount<A: ArchiveIndex>(
    fs: ZipFs<A>,
    mountpoint: &Path,
    fsname: &str,
) -> io::Result<Session<ZipFs<A>>> {
    let options = [
        MountOption::RO,
        MountOption::FSName(fsname.to_string()),
        MountOption::Subtype("zipfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    Session::new(fs, mountpoint, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testing::FakeArchive;
    use std::io::{Cursor, Read};

    fn sample() -> ArchiveFs<FakeArchive> {
        ArchiveFs::new(FakeArchive::new(&[
            ("a.txt", b"hello"),
            ("dir/", b""),
            ("dir/b.txt", b"bye"),
        ]))
    }

    #[test]
    fn errors_map_to_errno() {
        assert_eq!(errno(&FsError::NotFound), ENOENT);
        assert_eq!(errno(&FsError::NotDirectory), ENOTDIR);
        assert_eq!(errno(&FsError::IsDirectory), EISDIR);
        assert_eq!(errno(&FsError::Io(io::Error::other("boom"))), EIO);
    }

    #[test]
    fn sequential_streams_are_opened_nonseekable() {
        assert_eq!(open_flags(Sequential) & FOPEN_NONSEEKABLE, FOPEN_NONSEEKABLE);
    }

    #[test]
    fn attributes_carry_identity_size_and_owner() {
        let fs = sample();
        let file = fs.lookup(&fs.root(), "a.txt").unwrap();

        let attr = file_attr(&file, 1000, 100);
        assert_eq!(attr.ino, file.id());
        assert_eq!(attr.size, 5);
        assert_eq!(attr.blocks, 1);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.nlink, 1);
        assert_eq!((attr.uid, attr.gid), (1000, 100));
        assert_eq!(attr.mtime, attr.ctime);

        let root = file_attr(&fs.root(), 0, 0);
        assert_eq!(root.ino, fuser::FUSE_ROOT_ID);
        assert_eq!(root.kind, FileType::Directory);
        assert_eq!(root.perm, 0o755);
        assert_eq!(root.mtime, UNIX_EPOCH);
    }

    #[test]
    fn fill_keeps_reading_through_short_reads() {
        struct OneByte(Cursor<Vec<u8>>);
        impl Read for OneByte {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let len = buf.len().min(1);
                self.0.read(&mut buf[..len])
            }
        }

        let mut handle =
            StreamHandle::new("t", Box::new(OneByte(Cursor::new(b"abcdef".to_vec()))));
        let mut buf = [0u8; 4];
        assert_eq!(fill(&mut handle, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(fill(&mut handle, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(fill(&mut handle, &mut buf).unwrap(), 0);
    }

    #[test]
    fn fill_returns_bytes_read_before_an_error() {
        struct Flaky(Vec<io::Result<&'static [u8]>>);
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                let chunk = self.0.remove(0)?;
                buf[..chunk.len()].copy_from_slice(chunk);
                Ok(chunk.len())
            }
        }

        let mut handle = StreamHandle::new(
            "t",
            Box::new(Flaky(vec![
                Ok(b"abc"),
                Err(io::Error::other("transient")),
                Ok(b"def"),
            ])),
        );
        let mut buf = [0u8; 8];
        assert_eq!(fill(&mut handle, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert!(matches!(fill(&mut handle, &mut buf), Err(FsError::Io(_))));
        assert_eq!(fill(&mut handle, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"def");
    }

    #[test]
    fn new_filesystem_has_no_open_handles() {
        let zipfs = ZipFs::new(sample());
        assert_eq!(zipfs.open_handles(), 0);
    }
}
