//! Validated WAL segment and block sizes.
//!
//! Segment size is a divisor in the segment name arithmetic; both sizes are
//! range-checked on construction.

use crate::error::FormatError;
use crate::{DEFAULT_SEGMENT_SIZE, DEFAULT_XLOG_BLCKSZ};
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_SEGMENT_SIZE: u32 = 1024 * 1024;
const MAX_SEGMENT_SIZE: u32 = 1024 * 1024 * 1024;
const MIN_BLOCK_SIZE: u32 = 1024;
const MAX_BLOCK_SIZE: u32 = 64 * 1024;

/// WAL segment size in bytes (`XLogSegSize`, `wal_segment_size`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SegmentSize(u32);

impl SegmentSize {
    /// Creates a segment size: a power of two between 1 MiB and 1 GiB.
    pub fn new(bytes: u32) -> Result<Self, FormatError> {
        if !bytes.is_power_of_two() || !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&bytes) {
            return Err(FormatError::InvalidLayout(format!(
                "WAL segment size must be a power of two between 1 MiB and 1 GiB, got {}",
                bytes
            )));
        }
        Ok(Self(bytes))
    }

    /// Creates a segment size from a megabyte count.
    pub fn from_mb(mb: u32) -> Result<Self, FormatError> {
        let bytes = mb.checked_mul(1024 * 1024).ok_or_else(|| {
            FormatError::InvalidLayout(format!("WAL segment size of {} MiB overflows", mb))
        })?;
        Self::new(bytes)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

impl Default for SegmentSize {
    fn default() -> Self {
        Self(DEFAULT_SEGMENT_SIZE)
    }
}

impl TryFrom<u32> for SegmentSize {
    type Error = FormatError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SegmentSize> for u32 {
    fn from(size: SegmentSize) -> u32 {
        size.0
    }
}

impl fmt::Display for SegmentSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % (1024 * 1024) == 0 {
            write!(f, "{}MB", self.0 / (1024 * 1024))
        } else {
            write!(f, "{} bytes", self.0)
        }
    }
}

/// WAL block size in bytes (`XLOG_BLCKSZ`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BlockSize(u32);

impl BlockSize {
    /// Creates a block size: a power of two between 1 KiB and 64 KiB.
    pub fn new(bytes: u32) -> Result<Self, FormatError> {
        if !bytes.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&bytes) {
            return Err(FormatError::InvalidLayout(format!(
                "WAL block size must be a power of two between 1 KiB and 64 KiB, got {}",
                bytes
            )));
        }
        Ok(Self(bytes))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self(DEFAULT_XLOG_BLCKSZ)
    }
}

impl TryFrom<u32> for BlockSize {
    type Error = FormatError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BlockSize> for u32 {
    fn from(size: BlockSize) -> u32 {
        size.0
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
