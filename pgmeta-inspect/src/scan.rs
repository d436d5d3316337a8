//! WAL directory scan.

use crate::error::InspectError;
use crate::segment::WalSegmentValidator;
use pgmeta_format::{is_segment_filename, SegmentDefect};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Verdict for one file in a WAL directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentStatus {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// First defect found, or `None` for a complete segment.
    pub defect: Option<SegmentDefect>,
}

impl SegmentStatus {
    pub fn is_complete(&self) -> bool {
        self.defect.is_none()
    }
}

/// Checks every segment-named file in `dir`, sorted by name.
///
/// Names that are not 24 hex digits (history files, `.partial`, `.backup`,
/// `archive_status`) are skipped. Sizes come from the metadata of the file
/// itself, following symlinks.
pub fn scan_segments(
    dir: impl AsRef<Path>,
    validator: &WalSegmentValidator,
) -> Result<Vec<SegmentStatus>, InspectError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| InspectError::Open {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut statuses = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| InspectError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = match entry.file_name().into_string() {
            Ok(name) if is_segment_filename(&name) => name,
            _ => continue,
        };

        let path = entry.path();
        // Follows symlinks.
        let (size, defect) = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {
                let size = meta.len();
                (size, validator.check(&path, size).err())
            }
            Ok(_) => (
                0,
                Some(SegmentDefect::Unreadable {
                    reason: "not a regular file".to_string(),
                }),
            ),
            Err(e) => (
                0,
                Some(SegmentDefect::Unreadable {
                    reason: e.to_string(),
                }),
            ),
        };

        statuses.push(SegmentStatus {
            name,
            path,
            size,
            defect,
        });
    }

    statuses.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!("scanned {} segment files in {}", statuses.len(), dir.display());
    Ok(statuses)
}
