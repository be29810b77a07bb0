use std::io;

use thiserror::Error;

/// Failure of a filesystem request.
///
/// Every variant is scoped to the request that produced it; none of
/// them invalidates the mount.
#[derive(Debug, Error)]
pub enum FsError {
    /// The looked-up name has neither a file nor a directory entry.
    #[error("no such entry")]
    NotFound,
    #[error("not a directory")]
    NotDirectory,
    #[error("is a directory")]
    IsDirectory,
    /// Reading or decoding the archive failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FsResult<T> = Result<T, FsError>;
