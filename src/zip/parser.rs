//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. When an entry is opened, read its Local File Header to find the data
//!
//! Only the tail of the archive is touched at mount time, which keeps
//! mounting a remote archive down to a couple of Range requests.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// Generic over the reader type so the same code serves local files,
/// HTTP sources and in-memory archives. Normally driven through
/// [`ZipArchive`](super::ZipArchive).
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Tries the comment-less layout first, then searches backwards for
    /// the signature. Returns the record and its offset in the file.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            bail!("Not a valid ZIP file: {} bytes is too short", self.size);
        }

        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;

        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // There is an archive comment: the EOCD sits at most 64 KiB earlier.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // Reject signature bytes that happen to appear inside the comment.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record, which the regular
    /// EOCD points to through the locator stored right before it.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            bail!("Invalid ZIP64 format");
        };
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries in central directory order.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.checked_add(cd_size).is_none_or(|end| end > self.size) {
            bail!(
                "Central Directory out of bounds: offset {} size {} in a {} byte archive",
                cd_offset,
                cd_size,
                self.size
            );
        }
        // Each header takes at least CDFH_MIN_SIZE bytes.
        if total_entries > cd_size / CDFH_MIN_SIZE as u64 {
            bail!(
                "Central Directory claims {} entries in {} bytes",
                total_entries,
                cd_size
            );
        }

        // One read for the whole directory keeps remote mounts to a single Range request.
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..total_entries {
            entries.push(Self::parse_cdfh(&mut cursor)?);
        }

        Ok(entries)
    }

    /// Parse one Central Directory File Header at the cursor position.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();

        let is_directory = file_name.ends_with('/');

        let mut extra = vec![0u8; extra_field_length as usize];
        cursor.read_exact(&mut extra)?;
        let mut modified = None;

        let mut fields = Cursor::new(extra.as_slice());
        while fields.position() + 4 <= extra.len() as u64 {
            let header_id = fields.read_u16::<LittleEndian>()?;
            let field_size = fields.read_u16::<LittleEndian>()? as u64;
            let field_end = (fields.position() + field_size).min(extra.len() as u64);

            match header_id {
                EXTRA_ZIP64 => {
                    // Only the header fields saturated to 0xFFFFFFFF are present, in this order.
                    if uncompressed_size == 0xFFFFFFFF && fields.position() + 8 <= field_end {
                        uncompressed_size = fields.read_u64::<LittleEndian>()?;
                    }
                    if compressed_size == 0xFFFFFFFF && fields.position() + 8 <= field_end {
                        compressed_size = fields.read_u64::<LittleEndian>()?;
                    }
                    if lfh_offset == 0xFFFFFFFF && fields.position() + 8 <= field_end {
                        lfh_offset = fields.read_u64::<LittleEndian>()?;
                    }
                }
                EXTRA_EXTENDED_TIMESTAMP if field_size >= 5 => {
                    let info = fields.read_u8()?;
                    if info & 0x01 != 0 {
                        let mtime = fields.read_i32::<LittleEndian>()?;
                        if mtime >= 0 {
                            modified = Some(UNIX_EPOCH + Duration::from_secs(mtime as u64));
                        }
                    }
                }
                _ => {}
            }

            fields.set_position(field_end);
        }

        cursor.set_position(cursor.position() + file_comment_length as u64);

        Ok(ZipFileEntry {
            file_name,
            version_made_by,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            external_attrs,
            modified,
            is_directory,
        })
    }

    /// Get the offset of an entry's data.
    ///
    /// The Local File Header's name and extra field may differ in length
    /// from the Central Directory copy, so the header has to be read.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.lfh_offset, &mut lfh_buf)
            .await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let data_offset = entry
            .lfh_offset
            .checked_add(LFH_SIZE as u64 + file_name_length + extra_field_length);
        let data_end = data_offset.and_then(|o| o.checked_add(entry.compressed_size));

        match (data_offset, data_end) {
            (Some(data_offset), Some(data_end)) if data_end <= self.size => Ok(data_offset),
            _ => bail!("Data for {} runs past the end of the archive", entry.file_name),
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
