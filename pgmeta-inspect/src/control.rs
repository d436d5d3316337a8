//! `pg_control` reader.
//!
//! Reading is best-effort. A file that cannot be opened or is short yields
//! no image; checksum and version problems are logged and the image is
//! returned anyway, since a partially trusted image is still worth
//! inspecting.

use crate::error::InspectError;
use pgmeta_format::{ControlFileImage, ControlFileLayout, PG_CONTROL_SIZE};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Returns `<data_dir>/global/pg_control`.
pub fn control_file_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join("global").join("pg_control")
}

/// Reads the control file with the default layout, logging any problems.
pub fn read_control_file(data_dir: impl AsRef<Path>) -> Option<ControlFileImage> {
    ControlFileReader::default().read(data_dir)
}

/// Reads `pg_control` images for one expected layout.
#[derive(Debug, Clone, Default)]
pub struct ControlFileReader {
    layout: ControlFileLayout,
}

impl ControlFileReader {
    pub fn new(layout: ControlFileLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ControlFileLayout {
        &self.layout
    }

    /// Reads the control file under `data_dir`.
    ///
    /// Open and short-read failures are logged as warnings and yield
    /// `None`. CRC and version mismatches are logged as warnings; the image
    /// is still returned unmodified.
    pub fn read(&self, data_dir: impl AsRef<Path>) -> Option<ControlFileImage> {
        let image = match self.try_read(data_dir) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("{}", e);
                return None;
            }
        };

        let check = image.check();
        if !check.crc_ok() {
            tracing::warn!(
                stored_crc = format_args!("{:#010x}", check.stored_crc),
                computed_crc = format_args!("{:#010x}", check.computed_crc),
                "calculated CRC checksum does not match value stored in file; \
                 either the file is corrupt, or it has a different layout than this \
                 program is expecting; the results below are untrustworthy"
            );
        }
        if !check.version_ok() {
            tracing::warn!(
                version = check.version,
                expected_version = check.expected_version,
                "possible byte ordering mismatch; the byte ordering used to store the \
                 pg_control file might not match the one used by this program, in which \
                 case the results below would be incorrect and the installation would be \
                 incompatible with this data directory"
            );
        }

        Some(image)
    }

    /// Reads the control file under `data_dir` without logging.
    pub fn try_read(&self, data_dir: impl AsRef<Path>) -> Result<ControlFileImage, InspectError> {
        let path = control_file_path(data_dir);
        let bytes = read_exactly(&path, PG_CONTROL_SIZE)?;
        Ok(ControlFileImage::from_bytes(bytes, self.layout)?)
    }
}

/// Reads `len` bytes from the start of `path`. The file is closed before
/// returning on every path.
fn read_exactly(path: &Path, len: usize) -> Result<Vec<u8>, InspectError> {
    let file = File::open(path).map_err(|source| InspectError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut bytes = Vec::with_capacity(len);
    file.take(len as u64)
        .read_to_end(&mut bytes)
        .map_err(|source| InspectError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if bytes.len() != len {
        return Err(InspectError::ShortRead {
            path: path.to_path_buf(),
            read: bytes.len(),
            expected: len,
        });
    }
    Ok(bytes)
}
