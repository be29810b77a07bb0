use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zipfs")]
#[command(version)]
#[command(about = "Mount a ZIP archive as a read-only filesystem", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipfs photos.zip /mnt/photos                      browse photos.zip under /mnt/photos\n  \
  zipfs https://example.com/archive.zip /mnt/remote mount a remote ZIP via Range requests\n\n\
Unmount with `fusermount -u MOUNTPOINT` or Ctrl-C. Set RUST_LOG=debug for request logs.")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Directory to mount the archive on
    #[arg(value_name = "MOUNTPOINT")]
    pub mountpoint: PathBuf,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }
}
