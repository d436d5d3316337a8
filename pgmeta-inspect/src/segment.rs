//! WAL segment validation.
//!
//! The validator is a strict filter. It reports through its verdict only;
//! the defect behind a rejection is available from [`WalSegmentValidator::check`]
//! and is traced at debug level, never raised.

use pgmeta_format::{
    BlockSize, FormatError, SegmentDefect, SegmentSize, ServerVersion, WalPageHeader, WalPolicy,
};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Returns whether `path` is a complete WAL segment for `server_version`,
/// assuming the default segment and block sizes.
///
/// `reported_file_size` must be the file's real on-disk size.
pub fn is_complete_wal_segment(
    path: impl AsRef<Path>,
    reported_file_size: u64,
    server_version: u32,
) -> bool {
    let validator = match WalSegmentValidator::for_server(
        ServerVersion::new(server_version),
        SegmentSize::default(),
        BlockSize::default(),
    ) {
        Ok(validator) => validator,
        Err(e) => {
            tracing::debug!("cannot validate WAL segments: {}", e);
            return false;
        }
    };
    validator.is_complete(path, reported_file_size)
}

/// Checks candidate WAL segment files against one [`WalPolicy`].
#[derive(Debug, Clone)]
pub struct WalSegmentValidator {
    policy: WalPolicy,
}

impl WalSegmentValidator {
    pub fn new(policy: WalPolicy) -> Self {
        Self { policy }
    }

    pub fn for_server(
        server_version: ServerVersion,
        segment_size: SegmentSize,
        block_size: BlockSize,
    ) -> Result<Self, FormatError> {
        Ok(Self::new(WalPolicy::for_server(
            server_version,
            segment_size,
            block_size,
        )?))
    }

    pub fn policy(&self) -> &WalPolicy {
        &self.policy
    }

    /// Returns whether `path` is a complete, well-formed WAL segment.
    pub fn is_complete(&self, path: impl AsRef<Path>, reported_file_size: u64) -> bool {
        let path = path.as_ref();
        match self.check(path, reported_file_size) {
            Ok(_) => true,
            Err(defect) => {
                tracing::debug!("{} is not a complete WAL segment: {}", path.display(), defect);
                false
            }
        }
    }

    /// Validates `path`, returning its first page header or the first defect.
    ///
    /// The header checks run before the size check, so a file that is both
    /// malformed and the wrong size reports the header problem.
    pub fn check(
        &self,
        path: impl AsRef<Path>,
        reported_file_size: u64,
    ) -> Result<WalPageHeader, SegmentDefect> {
        let page = read_first_page(path.as_ref(), self.policy.block_size.as_usize())
            .map_err(|e| SegmentDefect::Unreadable {
                reason: e.to_string(),
            })?;
        let header = self.policy.check_first_page(&page)?;
        self.policy.check_file_size(reported_file_size)?;
        Ok(header)
    }

    /// Like [`WalSegmentValidator::check`], taking the size from the file's
    /// metadata.
    pub fn check_on_disk(&self, path: impl AsRef<Path>) -> Result<WalPageHeader, SegmentDefect> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)
            .map_err(|e| SegmentDefect::Unreadable {
                reason: e.to_string(),
            })?
            .len();
        self.check(path, size)
    }
}

/// Reads up to `block_size` bytes from the start of `path`.
fn read_first_page(path: &Path, block_size: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut page = Vec::with_capacity(block_size);
    file.take(block_size as u64).read_to_end(&mut page)?;
    Ok(page)
}
