//! The `pg_control` image.
//!
//! The file is `PG_CONTROL_SIZE` bytes. Only two fields are interpreted:
//!
//! ```text
//! +-------------------+--------------------+-- ... --+---------+-- ... --+
//! | system_identifier | pg_control_version |  other  |  crc    | padding |
//! | 8 bytes           | 4 bytes            |         | 4 bytes |         |
//! +-------------------+--------------------+-- ... --+---------+-- ... --+
//!                                                    ^ crc_offset
//! ```
//!
//! The CRC-32C covers every byte before `crc_offset`. Where the CRC sits
//! depends on the server's `ControlFileData` layout, which is what
//! [`ControlFileLayout`] describes.

use crate::error::FormatError;
use crate::PG_CONTROL_SIZE;
use serde::{Deserialize, Serialize};

/// Offset of `pg_control_version`.
pub const CONTROL_VERSION_OFFSET: usize = 8;

/// `PG_CONTROL_VERSION` of 13 through 16.
pub const DEFAULT_CONTROL_VERSION: u32 = 1300;

/// `offsetof(ControlFileData, crc)` for `PG_CONTROL_VERSION` 1300.
pub const DEFAULT_CRC_OFFSET: usize = 288;

/// Computes the CRC-32C stored in a control file image.
///
/// Panics if `image` is shorter than `crc_offset`.
pub fn compute_control_crc(image: &[u8], crc_offset: usize) -> u32 {
    crc32c::crc32c(&image[..crc_offset])
}

/// The `ControlFileData` layout this tool expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFileLayout {
    expected_version: u32,
    crc_offset: usize,
}

impl ControlFileLayout {
    pub fn new(expected_version: u32, crc_offset: usize) -> Result<Self, FormatError> {
        let min = CONTROL_VERSION_OFFSET + 4;
        if crc_offset < min || crc_offset + 4 > PG_CONTROL_SIZE {
            return Err(FormatError::InvalidLayout(format!(
                "control file CRC offset {} must be between {} and {}",
                crc_offset,
                min,
                PG_CONTROL_SIZE - 4
            )));
        }
        Ok(Self {
            expected_version,
            crc_offset,
        })
    }

    pub fn expected_version(&self) -> u32 {
        self.expected_version
    }

    pub fn crc_offset(&self) -> usize {
        self.crc_offset
    }
}

impl Default for ControlFileLayout {
    fn default() -> Self {
        Self {
            expected_version: DEFAULT_CONTROL_VERSION,
            crc_offset: DEFAULT_CRC_OFFSET,
        }
    }
}

/// Outcome of the integrity checks on a control file image.
///
/// Both checks are advisory: an image that fails either is still usable for
/// best-effort inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFileCheck {
    pub version: u32,
    pub expected_version: u32,
    pub stored_crc: u32,
    pub computed_crc: u32,
}

impl ControlFileCheck {
    pub fn crc_ok(&self) -> bool {
        self.stored_crc == self.computed_crc
    }

    pub fn version_ok(&self) -> bool {
        self.version == self.expected_version
    }

    pub fn is_clean(&self) -> bool {
        self.crc_ok() && self.version_ok()
    }
}

/// A `pg_control` image, exactly as read from disk.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlFileImage {
    bytes: Box<[u8]>,
    layout: ControlFileLayout,
}

impl ControlFileImage {
    /// Wraps a full control file image.
    pub fn from_bytes(bytes: Vec<u8>, layout: ControlFileLayout) -> Result<Self, FormatError> {
        if bytes.len() != PG_CONTROL_SIZE {
            return Err(FormatError::ShortBuffer {
                expected: PG_CONTROL_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
            layout,
        })
    }

    pub fn layout(&self) -> &ControlFileLayout {
        &self.layout
    }

    pub fn system_identifier(&self) -> u64 {
        u64::from_ne_bytes(self.word::<8>(0))
    }

    pub fn pg_control_version(&self) -> u32 {
        u32::from_ne_bytes(self.word::<4>(CONTROL_VERSION_OFFSET))
    }

    pub fn stored_crc(&self) -> u32 {
        u32::from_ne_bytes(self.word::<4>(self.layout.crc_offset))
    }

    pub fn computed_crc(&self) -> u32 {
        compute_control_crc(&self.bytes, self.layout.crc_offset)
    }

    pub fn crc_matches(&self) -> bool {
        self.stored_crc() == self.computed_crc()
    }

    pub fn version_matches(&self) -> bool {
        self.pg_control_version() == self.layout.expected_version
    }

    pub fn check(&self) -> ControlFileCheck {
        ControlFileCheck {
            version: self.pg_control_version(),
            expected_version: self.layout.expected_version,
            stored_crc: self.stored_crc(),
            computed_crc: self.computed_crc(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Box<[u8]> {
        self.bytes
    }

    fn word<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut word = [0u8; N];
        word.copy_from_slice(&self.bytes[at..at + N]);
        word
    }
}

impl AsRef<[u8]> for ControlFileImage {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for ControlFileImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlFileImage")
            .field("system_identifier", &self.system_identifier())
            .field("pg_control_version", &self.pg_control_version())
            .field("stored_crc", &format_args!("{:#010x}", self.stored_crc()))
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_image(version: u32, layout: ControlFileLayout) -> Vec<u8> {
        let mut bytes = vec![0u8; PG_CONTROL_SIZE];
        bytes[0..8].copy_from_slice(&7_000_000_000_000_000_001u64.to_ne_bytes());
        bytes[8..12].copy_from_slice(&version.to_ne_bytes());
        for (i, b) in bytes[12..layout.crc_offset()].iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let crc = compute_control_crc(&bytes, layout.crc_offset());
        let at = layout.crc_offset();
        bytes[at..at + 4].copy_from_slice(&crc.to_ne_bytes());
        bytes
    }

    #[test]
    fn test_clean_image() {
        let layout = ControlFileLayout::default();
        let image = ControlFileImage::from_bytes(sealed_image(1300, layout), layout).unwrap();

        assert_eq!(image.system_identifier(), 7_000_000_000_000_000_001);
        assert_eq!(image.pg_control_version(), 1300);
        assert!(image.crc_matches());
        assert!(image.version_matches());
        assert!(image.check().is_clean());
    }

    #[test]
    fn test_crc_mismatch_is_reported() {
        let layout = ControlFileLayout::default();
        let mut bytes = sealed_image(1300, layout);
        bytes[100] ^= 0xFF;
        let image = ControlFileImage::from_bytes(bytes.clone(), layout).unwrap();

        let check = image.check();
        assert!(!check.crc_ok());
        assert!(check.version_ok());
        assert_eq!(image.as_bytes(), &bytes[..]);
    }

    #[test]
    fn test_bytes_after_crc_not_covered() {
        let layout = ControlFileLayout::default();
        let mut bytes = sealed_image(1300, layout);
        bytes[PG_CONTROL_SIZE - 1] = 0xAA;
        let image = ControlFileImage::from_bytes(bytes, layout).unwrap();
        assert!(image.crc_matches());
    }

    #[test]
    fn test_version_mismatch_is_reported() {
        let layout = ControlFileLayout::default();
        let bytes = sealed_image(942, layout);
        let image = ControlFileImage::from_bytes(bytes.clone(), layout).unwrap();

        let check = image.check();
        assert!(check.crc_ok());
        assert!(!check.version_ok());
        assert_eq!(check.version, 942);
        assert_eq!(&*image.into_bytes(), &bytes[..]);
    }

    #[test]
    fn test_custom_layout() {
        let layout = ControlFileLayout::new(942, 232).unwrap();
        let image = ControlFileImage::from_bytes(sealed_image(942, layout), layout).unwrap();
        assert!(image.check().is_clean());

        // Same bytes read with the default layout look corrupt.
        let other =
            ControlFileImage::from_bytes(image.as_bytes().to_vec(), ControlFileLayout::default())
                .unwrap();
        assert!(!other.crc_matches());
        assert!(!other.version_matches());
    }

    #[test]
    fn test_layout_bounds() {
        assert!(ControlFileLayout::new(1300, 12).is_ok());
        assert!(ControlFileLayout::new(1300, 8188).is_ok());
        assert!(ControlFileLayout::new(1300, 8).is_err());
        assert!(ControlFileLayout::new(1300, 8189).is_err());
    }

    #[test]
    fn test_wrong_size_rejected() {
        let layout = ControlFileLayout::default();
        let result = ControlFileImage::from_bytes(vec![0u8; 100], layout);
        assert_eq!(
            result.unwrap_err(),
            FormatError::ShortBuffer {
                expected: PG_CONTROL_SIZE,
                actual: 100
            }
        );
    }
}
