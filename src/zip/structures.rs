use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Extra field carrying 64-bit sizes and offsets
pub const EXTRA_ZIP64: u16 = 0x0001;
/// Extra field carrying UNIX timestamps ("UT")
pub const EXTRA_EXTENDED_TIMESTAMP: u16 = 0x5455;

/// General purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

// Host system, upper byte of "version made by"
const HOST_MSDOS: u8 = 0;
const HOST_UNIX: u8 = 3;
const HOST_NTFS: u8 = 11;
const HOST_VFAT: u8 = 14;
const HOST_OSX: u8 = 19;

const MSDOS_READONLY: u32 = 0x01;
const MSDOS_DIR: u32 = 0x10;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub version_made_by: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub external_attrs: u32,
    /// UNIX modification time from the extended timestamp extra field
    pub modified: Option<SystemTime>,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Modification time of the entry.
    ///
    /// Prefers the extended timestamp; the DOS date/time fields carry no
    /// zone and are read as UTC.
    pub fn modified_time(&self) -> SystemTime {
        if let Some(modified) = self.modified {
            return modified;
        }
        let (year, month, day) = self.mod_date();
        let (hour, minute, second) = self.mod_time();
        let days = days_from_civil(year as i64, month.max(1) as i64, day.max(1) as i64);
        let secs = days * 86_400 + hour as i64 * 3600 + minute as i64 * 60 + second as i64;
        // DOS dates start in 1980, so this is never before the epoch.
        UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
    }

    /// POSIX `st_mode` (type and permission bits) recorded for the entry.
    pub fn mode(&self) -> u32 {
        let mut mode = match (self.version_made_by >> 8) as u8 {
            HOST_UNIX | HOST_OSX => self.external_attrs >> 16,
            HOST_MSDOS | HOST_NTFS | HOST_VFAT => {
                let mut mode = if self.external_attrs & MSDOS_DIR != 0 {
                    S_IFDIR | 0o777
                } else {
                    S_IFREG | 0o666
                };
                if self.external_attrs & MSDOS_READONLY != 0 {
                    mode &= !0o222;
                }
                mode
            }
            _ => 0,
        };

        if mode & 0o7777 == 0 {
            mode |= if self.is_directory { 0o755 } else { 0o644 };
        }
        if self.is_directory {
            mode = (mode & !S_IFMT) | S_IFDIR;
        } else if mode & S_IFMT == 0 || mode & S_IFMT == S_IFDIR {
            mode = (mode & !S_IFMT) | S_IFREG;
        }
        mode
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u16 {
        (self.mode() & 0o7777) as u16
    }

    pub fn is_symlink(&self) -> bool {
        !self.is_directory && self.mode() & S_IFMT == S_IFLNK
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, version_made_by: u16, external_attrs: u32) -> ZipFileEntry {
        ZipFileEntry {
            file_name: name.to_string(),
            version_made_by,
            flags: 0,
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: 0,
            last_mod_date: 0,
            external_attrs,
            modified: None,
            is_directory: name.ends_with('/'),
        }
    }

    #[test]
    fn unix_host_mode_comes_from_external_attrs() {
        let e = entry("bin/run.sh", 3 << 8 | 20, (S_IFREG | 0o755) << 16);
        assert_eq!(e.mode(), S_IFREG | 0o755);
        assert_eq!(e.permissions(), 0o755);

        let link = entry("latest", 3 << 8 | 20, (S_IFLNK | 0o777) << 16);
        assert!(link.is_symlink());
    }

    #[test]
    fn msdos_host_maps_readonly_and_directory_bits() {
        let ro = entry("README", 20, MSDOS_READONLY);
        assert_eq!(ro.mode(), S_IFREG | 0o444);

        let dir = entry("docs/", 20, MSDOS_DIR);
        assert_eq!(dir.mode(), S_IFDIR | 0o777);
    }

    #[test]
    fn unknown_host_gets_default_permissions() {
        assert_eq!(entry("a.txt", 10 << 8, 0).mode(), S_IFREG | 0o644);
        assert_eq!(entry("d/", 10 << 8, 0).mode(), S_IFDIR | 0o755);
    }

    #[test]
    fn trailing_slash_always_means_directory() {
        let e = entry("d/", 3 << 8, (S_IFREG | 0o700) << 16);
        assert_eq!(e.mode(), S_IFDIR | 0o700);
    }

    #[test]
    fn dos_timestamp_converts_as_utc() {
        let mut e = entry("a.txt", 0, 0);
        // 2024-02-29 13:45:30
        e.last_mod_date = ((2024 - 1980) << 9) | (2 << 5) | 29;
        e.last_mod_time = (13 << 11) | (45 << 5) | (30 / 2);
        let secs = e
            .modified_time()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(secs, 1_709_214_330);
    }

    #[test]
    fn extended_timestamp_wins_over_dos_fields() {
        let mut e = entry("a.txt", 0, 0);
        e.modified = Some(UNIX_EPOCH + Duration::from_secs(42));
        assert_eq!(e.modified_time(), UNIX_EPOCH + Duration::from_secs(42));
    }
}
