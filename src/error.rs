//! Crate-wide error type.
//!
//! Every surface-level operation returns [`Result`].  Filesystem-shaped
//! failures (`NotFound`, `AlreadyExists`, ...) are distinct variants so the
//! FUSE/CLI adapters can map them to errno-style codes without string
//! matching.  Backing-file failures arrive as [`FsError::Io`]; structural
//! violations found while decoding on-disk state arrive as
//! [`FsError::Corrupt`] and are never silently repaired.

use std::io;
use thiserror::Error;

use crate::transformer::CipherError;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Entry not found")]
    NotFound,
    #[error("Entry already exists")]
    AlreadyExists,
    #[error("Illegal filename: {0}")]
    IllegalFilename(String),
    #[error("Folder is not empty")]
    FolderNotEmpty,
    #[error("File is not open for reading")]
    NotReadable,
    #[error("File is not open for writing")]
    NotWritable,
    #[error("No free blocks left in the image")]
    ImageFull,
    #[error("Seek position is out of range")]
    SeekOutOfRange,
    /// Structural invariant violated while decoding the image — a block or
    /// next-index out of range, an over-long filename, an inconsistent entry
    /// count, or a failed password check (indistinguishable from tampering).
    #[error("Corrupt container: {0}")]
    Corrupt(String),
    #[error("Unsupported configuration: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        FsError::Corrupt(msg.into())
    }
}

/// Mapping used by [`crate::vault::FileStream`]'s `std::io` trait impls.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        let kind = match &e {
            FsError::NotFound       => io::ErrorKind::NotFound,
            FsError::AlreadyExists  => io::ErrorKind::AlreadyExists,
            FsError::NotReadable
            | FsError::NotWritable  => io::ErrorKind::PermissionDenied,
            FsError::SeekOutOfRange => io::ErrorKind::InvalidInput,
            FsError::Corrupt(_)     => io::ErrorKind::InvalidData,
            FsError::Io(inner)      => inner.kind(),
            _                       => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}
