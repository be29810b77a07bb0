//! Test support: writes small ZIP archives in memory and mounts them.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use tokio::runtime::Runtime;

use zipfs::{ArchiveFs, MemoryReader, StreamHandle, ZipArchive};

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

// 2024-02-29 13:45:30
pub const DOS_DATE: u16 = ((2024 - 1980) << 9) | (2 << 5) | 29;
pub const DOS_TIME: u16 = (13 << 11) | (45 << 5) | 15;
pub const DOS_UNIX_SECS: u64 = 1_709_214_330;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflate,
}

pub struct Member {
    pub name: String,
    pub content: Vec<u8>,
    pub method: Method,
    pub mode: u32,
    pub unix_mtime: Option<i32>,
    pub crc: Option<u32>,
    /// Compressed size recorded in a ZIP64 extra field instead of the
    /// central directory header.
    pub zip64_compressed_size: Option<u64>,
}

impl Member {
    pub fn new(name: &str, content: &[u8], method: Method) -> Self {
        let mode = if name.ends_with('/') {
            S_IFDIR | 0o755
        } else {
            S_IFREG | 0o644
        };
        Self {
            name: name.to_string(),
            content: content.to_vec(),
            method,
            mode,
            unix_mtime: None,
            crc: None,
            zip64_compressed_size: None,
        }
    }
}

#[derive(Default)]
pub struct ZipBuilder {
    data: Vec<u8>,
    central: Vec<u8>,
    count: u16,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(self, name: &str) -> Self {
        self.member(Member::new(name, b"", Method::Stored))
    }

    pub fn file(self, name: &str, content: &[u8]) -> Self {
        self.member(Member::new(name, content, Method::Deflate))
    }

    pub fn stored(self, name: &str, content: &[u8]) -> Self {
        self.member(Member::new(name, content, Method::Stored))
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn member(mut self, member: Member) -> Self {
        let crc = member.crc.unwrap_or_else(|| crc32fast::hash(&member.content));
        let (method, payload) = match member.method {
            Method::Stored => (0u16, member.content.clone()),
            Method::Deflate => {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                enc.write_all(&member.content).unwrap();
                (8u16, enc.finish().unwrap())
            }
        };

        let mut extra = Vec::new();
        if let Some(size) = member.zip64_compressed_size {
            extra.write_u16::<LittleEndian>(0x0001).unwrap();
            extra.write_u16::<LittleEndian>(8).unwrap();
            extra.write_u64::<LittleEndian>(size).unwrap();
        }
        if let Some(mtime) = member.unix_mtime {
            extra.write_u16::<LittleEndian>(0x5455).unwrap();
            extra.write_u16::<LittleEndian>(5).unwrap();
            extra.write_u8(0x01).unwrap();
            extra.write_i32::<LittleEndian>(mtime).unwrap();
        }

        let lfh_offset = self.data.len() as u32;
        let name = member.name.as_bytes();

        let d = &mut self.data;
        d.extend_from_slice(b"PK\x03\x04");
        d.write_u16::<LittleEndian>(20).unwrap();
        d.write_u16::<LittleEndian>(0).unwrap();
        d.write_u16::<LittleEndian>(method).unwrap();
        d.write_u16::<LittleEndian>(DOS_TIME).unwrap();
        d.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        d.write_u32::<LittleEndian>(crc).unwrap();
        d.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        d.write_u32::<LittleEndian>(member.content.len() as u32).unwrap();
        d.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        d.write_u16::<LittleEndian>(0).unwrap();
        d.extend_from_slice(name);
        d.extend_from_slice(&payload);

        let c = &mut self.central;
        c.extend_from_slice(b"PK\x01\x02");
        c.write_u16::<LittleEndian>(3 << 8 | 20).unwrap();
        c.write_u16::<LittleEndian>(20).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(method).unwrap();
        c.write_u16::<LittleEndian>(DOS_TIME).unwrap();
        c.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        c.write_u32::<LittleEndian>(crc).unwrap();
        let cd_compressed = match member.zip64_compressed_size {
            Some(_) => 0xFFFF_FFFF,
            None => payload.len() as u32,
        };
        c.write_u32::<LittleEndian>(cd_compressed).unwrap();
        c.write_u32::<LittleEndian>(member.content.len() as u32).unwrap();
        c.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        c.write_u16::<LittleEndian>(extra.len() as u16).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u32::<LittleEndian>(member.mode << 16).unwrap();
        c.write_u32::<LittleEndian>(lfh_offset).unwrap();
        c.extend_from_slice(name);
        c.extend_from_slice(&extra);

        self.count += 1;
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.data;
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);

        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u32::<LittleEndian>(self.central.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(self.comment.len() as u16).unwrap();
        out.extend_from_slice(&self.comment);
        out
    }
}

/// A filesystem over in-memory archive bytes, with the runtime its
/// entry streams run on.
pub struct Mounted {
    pub fs: ArchiveFs<ZipArchive<MemoryReader>>,
    // Dropped after `fs`.
    _runtime: Runtime,
}

pub fn open_archive(bytes: Vec<u8>) -> anyhow::Result<(Runtime, ZipArchive<MemoryReader>)> {
    let runtime = Runtime::new()?;
    let archive = runtime.block_on(ZipArchive::open(Arc::new(MemoryReader::new(bytes))))?;
    Ok((runtime, archive))
}

pub fn mount(bytes: Vec<u8>) -> Mounted {
    let (runtime, archive) = open_archive(bytes).unwrap();
    Mounted {
        fs: ArchiveFs::new(archive),
        _runtime: runtime,
    }
}

/// Read a handle to the end using `chunk`-sized requests.
pub fn read_to_end(handle: &mut StreamHandle, chunk: usize) -> zipfs::FsResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = handle.read(&mut buf)?;
        if n == 0 {
            return Ok(out);
        }
        assert!(n <= chunk);
        out.extend_from_slice(&buf[..n]);
    }
}

/// Deterministic, mildly compressible bytes.
pub fn sample_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if i % 3 == 0 { b'a' + (state % 26) as u8 } else { b' ' }
        })
        .collect()
}
