//! # pgmeta-format
//!
//! On-disk layouts that pgmeta checks before files go into a backup.
//!
//! This crate provides:
//! - The fixed-size `pg_control` image with CRC-32C and version tag accessors
//! - A discriminated view over WAL page headers (short vs. long header)
//! - Per-server-version validation policy for the first page of a WAL segment
//! - WAL segment file name encoding, plus legacy decoding
//!
//! Nothing here touches the filesystem; see `pgmeta-inspect` for the readers.

pub mod control;
pub mod error;
pub mod filename;
pub mod lsn;
pub mod page;
pub mod sizes;
pub mod version;

pub use control::{ControlFileCheck, ControlFileImage, ControlFileLayout};
pub use error::{FilenameError, FormatError};
pub use filename::{
    format_legacy_segment_filename, format_segment_filename, is_segment_filename,
    parse_legacy_filename, LegacySegmentName,
};
pub use lsn::{LegacyRecPtr, Lsn};
pub use page::{PageLayout, SegmentDefect, ShortPageHeader, WalPageHeader, WalPolicy};
pub use sizes::{BlockSize, SegmentSize};
pub use version::ServerVersion;

/// Size of the `global/pg_control` file image.
pub const PG_CONTROL_SIZE: usize = 8192;

/// Default WAL block size (`XLOG_BLCKSZ`).
pub const DEFAULT_XLOG_BLCKSZ: u32 = 8192;

/// Default WAL segment size (16 MiB).
pub const DEFAULT_SEGMENT_SIZE: u32 = 16 * 1024 * 1024;

/// Timeline identifier.
pub type TimeLineId = u32;
