//! Command-line entry point: `zipfs ARCHIVE MOUNTPOINT`.
//!
//! Opens the archive, mounts it and serves requests until the
//! filesystem is unmounted or the process is interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zipfs::fuse::{self, ZipFs};
use zipfs::{ArchiveFs, Cli, HttpRangeReader, LocalFileReader, ReadAt, ZipArchive};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.is_http_url() {
        let reader = Arc::new(HttpRangeReader::new(cli.archive.clone()).await?);
        serve(reader.clone(), &cli).await?;
        info!(bytes = reader.transferred_bytes(), "total bytes transferred");
    } else {
        let reader = Arc::new(LocalFileReader::new(Path::new(&cli.archive))?);
        serve(reader, &cli).await?;
    }

    Ok(())
}

/// Mount the archive behind `reader` and serve it until unmounted.
///
/// The FUSE session runs on a blocking thread; archive reads it makes
/// are driven on this runtime.
async fn serve<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let archive = ZipArchive::open(reader)
        .await
        .with_context(|| format!("Cannot open archive {}", cli.archive))?;

    let fs = ZipFs::new(ArchiveFs::new(archive));
    let mut session = fuse::mount(fs, &cli.mountpoint, &cli.archive)
        .with_context(|| format!("Cannot mount on {}", cli.mountpoint.display()))?;
    info!(archive = %cli.archive, mountpoint = %cli.mountpoint.display(), "serving");

    let mut unmounter = session.unmount_callable();
    let mut serving = tokio::task::spawn_blocking(move || session.run());

    tokio::select! {
        result = &mut serving => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, unmounting");
            unmounter.unmount().context("Unmount failed")?;
            serving.await??;
        }
    }

    Ok(())
}
