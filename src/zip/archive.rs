use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::fs::ArchiveIndex;
use crate::io::ReadAt;

use super::parser::ZipParser;
use super::stream::EntryStream;
use super::structures::{CompressionMethod, ZipFileEntry};

/// An opened ZIP archive: the parsed central directory plus the source
/// it was read from.
///
/// The entry list is read once and never changes afterwards. Entry
/// streams are blocking readers; they drive the source's async reads on
/// the runtime that opened the archive, so they must be used from
/// threads outside that runtime's async context (the FUSE session
/// thread, `spawn_blocking`, or plain threads).
pub struct ZipArchive<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<ZipFileEntry>,
    runtime: Handle,
}

impl<R: ReadAt + 'static> ZipArchive<R> {
    /// Read the central directory of `reader`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(reader: Arc<R>) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let entries = parser
            .list_files()
            .await
            .context("Failed to read the central directory")?;

        info!(
            entries = entries.len(),
            size = parser.reader().size(),
            "archive opened"
        );

        Ok(Self {
            parser,
            entries,
            runtime: Handle::current(),
        })
    }

    /// All entries in central directory order.
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    /// Open a fresh decode stream for `entry`.
    ///
    /// Each call reads the entry's local header and returns an
    /// independent cursor starting at the first byte of content.
    pub fn open_entry_stream(&self, entry: &ZipFileEntry) -> Result<EntryStream<R>> {
        if entry.is_encrypted() {
            bail!("{}: encrypted entries are not supported", entry.file_name);
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            bail!(
                "{}: unsupported compression method {}",
                entry.file_name,
                method
            );
        }

        let data_offset = self
            .runtime
            .block_on(self.parser.get_data_offset(entry))?;
        debug!(name = %entry.file_name, data_offset, "entry stream opened");

        Ok(EntryStream::new(
            self.parser.reader().clone(),
            self.runtime.clone(),
            entry,
            data_offset,
        )?)
    }
}

impl<R: ReadAt + 'static> ArchiveIndex for ZipArchive<R> {
    fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    fn open_entry(&self, entry: &ZipFileEntry) -> io::Result<Box<dyn Read + Send>> {
        match self.open_entry_stream(entry) {
            Ok(stream) => Ok(Box::new(stream)),
            Err(e) => Err(io::Error::other(format!("{e:#}"))),
        }
    }
}
