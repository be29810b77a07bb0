//! Blocking, forward-only decode streams over archive members.

use std::io::{self, BufReader, Read};
use std::sync::Arc;

use flate2::bufread::DeflateDecoder;
use tokio::runtime::Handle;

use crate::io::ReadAt;

use super::structures::{CompressionMethod, ZipFileEntry};

/// Buffer size between the archive source and the decompressor.
///
/// Every refill is one `read_at`, i.e. one Range request for HTTP sources.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Sequential [`Read`] over a byte range of an async [`ReadAt`] source.
struct RangeReader<R: ReadAt> {
    reader: Arc<R>,
    runtime: Handle,
    offset: u64,
    remaining: u64,
}

impl<R: ReadAt> Read for RangeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self
            .runtime
            .block_on(self.reader.read_at(self.offset, &mut buf[..len]))
            .map_err(io::Error::other)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside entry data",
            ));
        }
        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

enum Decoder<R: ReadAt> {
    Stored(BufReader<RangeReader<R>>),
    Deflate(DeflateDecoder<BufReader<RangeReader<R>>>),
}

impl<R: ReadAt> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Stored(r) => r.read(buf),
            Decoder::Deflate(r) => r.read(buf),
        }
    }
}

/// Decompressed content of one entry.
///
/// Stops at the recorded uncompressed size and checks the CRC-32 once
/// the end is reached. Not seekable.
pub struct EntryStream<R: ReadAt> {
    decoder: Decoder<R>,
    hasher: crc32fast::Hasher,
    expected_crc: u32,
    expected_size: u64,
    produced: u64,
    verified: bool,
    name: String,
}

impl<R: ReadAt> EntryStream<R> {
    pub(crate) fn new(
        reader: Arc<R>,
        runtime: Handle,
        entry: &ZipFileEntry,
        data_offset: u64,
    ) -> io::Result<Self> {
        let raw = BufReader::with_capacity(
            READ_BUFFER_SIZE,
            RangeReader {
                reader,
                runtime,
                offset: data_offset,
                remaining: entry.compressed_size,
            },
        );
        let decoder = match entry.compression_method {
            CompressionMethod::Stored => Decoder::Stored(raw),
            CompressionMethod::Deflate => Decoder::Deflate(DeflateDecoder::new(raw)),
            CompressionMethod::Unknown(method) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!(
                        "{}: unsupported compression method {}",
                        entry.file_name, method
                    ),
                ));
            }
        };

        Ok(Self {
            decoder,
            hasher: crc32fast::Hasher::new(),
            expected_crc: entry.crc32,
            expected_size: entry.uncompressed_size,
            produced: 0,
            verified: false,
            name: entry.file_name.clone(),
        })
    }

    fn corrupt(&self, what: String) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", self.name, what))
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.verified {
            return Ok(());
        }
        if self.produced != self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{}: stream ended after {} of {} bytes",
                    self.name, self.produced, self.expected_size
                ),
            ));
        }
        let crc = self.hasher.clone().finalize();
        if crc != self.expected_crc {
            return Err(self.corrupt(format!(
                "CRC-32 mismatch (expected {:08x}, got {:08x})",
                self.expected_crc, crc
            )));
        }
        self.verified = true;
        Ok(())
    }
}

impl<R: ReadAt> Read for EntryStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.produced == self.expected_size {
            self.finish()?;
            return Ok(0);
        }

        let left = self.expected_size - self.produced;
        let want = buf.len().min(left.min(usize::MAX as u64) as usize);
        let n = self.decoder.read(&mut buf[..want])?;
        if n == 0 {
            self.finish()?;
            return Ok(0);
        }

        self.hasher.update(&buf[..n]);
        self.produced += n as u64;
        if self.produced == self.expected_size {
            self.finish()?;
        }
        Ok(n)
    }
}
