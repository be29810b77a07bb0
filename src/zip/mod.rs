//! ZIP archive parsing and entry decoding.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`archive`]: The opened archive: entry list plus per-entry stream opening
//! - [`stream`]: Blocking decode streams handed out to the filesystem layer
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory. Entry data is only touched when an entry is opened.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE compression methods
//! - UNIX and MS-DOS permission attributes, extended timestamps
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod archive;
mod parser;
mod stream;
mod structures;

pub use archive::ZipArchive;
pub use parser::ZipParser;
pub use stream::EntryStream;
pub use structures::*;
