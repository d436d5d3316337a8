//! Inspect error types.

use pgmeta_format::FormatError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading metadata files.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("can't open \"{}\": {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't read \"{}\": {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't read \"{}\": read {read} of {expected} bytes", .path.display())]
    ShortRead {
        path: PathBuf,
        read: usize,
        expected: usize,
    },

    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

impl InspectError {
    /// Returns the path of the file involved, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            InspectError::Open { path, .. }
            | InspectError::Read { path, .. }
            | InspectError::ShortRead { path, .. } => Some(path),
            InspectError::Format(_) => None,
        }
    }
}
