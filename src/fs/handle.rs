use std::fmt;
use std::io::{self, Read};

use crate::error::FsResult;

/// Returned by [`ArchiveFs::open`](super::ArchiveFs::open) to state that the
/// opened stream only supports forward sequential reads.
///
/// Transports must read from where the previous read ended; the handle
/// does not check offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequential;

/// Open read cursor over one entry's decompressed content.
///
/// Owned by a single open file session. Releasing consumes the handle,
/// so no read can follow it.
pub struct StreamHandle {
    stream: Box<dyn Read + Send>,
    name: String,
}

impl StreamHandle {
    pub(crate) fn new(name: &str, stream: Box<dyn Read + Send>) -> Self {
        Self {
            stream,
            name: name.to_string(),
        }
    }

    /// Entry name the stream was opened for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// A short count does not mean the stream is exhausted; only `Ok(0)`
    /// for a non-empty `buf` does.
    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Close the underlying decode stream.
    pub fn release(self) {
        drop(self.stream);
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
