//! Format error types.

use thiserror::Error;

/// Errors raised while interpreting on-disk layouts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("buffer too short: {actual} bytes (need {expected})")]
    ShortBuffer { expected: usize, actual: usize },

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("unsupported server version: {0}")]
    UnsupportedServerVersion(u32),

    #[error("invalid server version: {0:?}")]
    InvalidServerVersion(String),

    #[error("invalid log position: {0:?}")]
    InvalidLsn(String),
}

/// Errors raised while decoding a WAL segment file name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("segment file name must be 24 hex digits, got {len} characters")]
    WrongLength { len: usize },

    #[error("invalid hex digit {found:?} at position {position}")]
    InvalidHexDigit { position: usize, found: char },
}
