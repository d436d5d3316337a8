//! # pgmeta-inspect
//!
//! File-backed checks built on `pgmeta-format`.
//!
//! This crate provides:
//! - A `pg_control` reader that warns on checksum or version trouble but
//!   still hands the image back
//! - A WAL segment validator that answers with a plain verdict
//! - A scan over a WAL directory
//! - YAML + environment configuration

pub mod config;
pub mod control;
pub mod error;
pub mod scan;
pub mod segment;

pub use config::{Config, ConfigError};
pub use control::{control_file_path, read_control_file, ControlFileReader};
pub use error::InspectError;
pub use scan::{scan_segments, SegmentStatus};
pub use segment::{is_complete_wal_segment, WalSegmentValidator};
