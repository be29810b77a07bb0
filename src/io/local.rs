use super::ReadAt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Local file reader with random access support
pub struct LocalFileReader {
    file: std::fs::File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open {}", path.display()))?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        // pread does not move a shared cursor, so concurrent entry streams
        // can use the same descriptor.
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn reads_at_offsets_and_stops_at_eof() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let reader = LocalFileReader::new(tmp.path()).unwrap();
        assert_eq!(reader.size(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(block_on(reader.read_at(3, &mut buf)).unwrap(), 4);
        assert_eq!(&buf, b"3456");

        let mut buf = [0u8; 8];
        assert_eq!(block_on(reader.read_at(6, &mut buf)).unwrap(), 4);
        assert_eq!(&buf[..4], b"6789");
        assert!(block_on(reader.read_exact_at(6, &mut buf)).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFileReader::new(&dir.path().join("nope.zip"))
            .err()
            .expect("opening a missing file must fail");
        assert!(err.to_string().contains("nope.zip"));
    }
}
