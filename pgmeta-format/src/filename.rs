//! WAL segment file names.
//!
//! A segment name is three 8-digit uppercase hex groups with no separators:
//!
//! ```text
//! TTTTTTTT XXXXXXXX YYYYYYYY
//! timeline log id   segment within the log id
//! ```
//!
//! The low group is the low 32 bits of the position divided by the segment
//! size. The high word is not divided, which is the historical naming
//! convention the files on disk follow.

use crate::error::FilenameError;
use crate::lsn::{LegacyRecPtr, Lsn};
use crate::sizes::SegmentSize;
use crate::TimeLineId;
use serde::{Deserialize, Serialize};

/// Length of a segment file name.
pub const SEGMENT_NAME_LEN: usize = 24;

/// Formats the segment file name holding `position` on `timeline`.
pub fn format_segment_filename(
    timeline: TimeLineId,
    position: u64,
    segment_size: SegmentSize,
) -> String {
    format_legacy_segment_filename(timeline, Lsn(position).into(), segment_size)
}

/// Formats the segment file name for a two-word legacy position.
pub fn format_legacy_segment_filename(
    timeline: TimeLineId,
    ptr: LegacyRecPtr,
    segment_size: SegmentSize,
) -> String {
    format!(
        "{:08X}{:08X}{:08X}",
        timeline,
        ptr.xlogid,
        ptr.xrecoff / segment_size.get()
    )
}

/// Returns whether `name` has the shape of a segment file name.
pub fn is_segment_filename(name: &str) -> bool {
    name.len() == SEGMENT_NAME_LEN && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A segment file name decoded into the pre-9.3 two-word representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegacySegmentName {
    pub timeline: TimeLineId,
    pub xlogid: u32,
    /// Start offset of the segment within its log id.
    pub xrecoff: u32,
}

impl LegacySegmentName {
    pub fn rec_ptr(&self) -> LegacyRecPtr {
        LegacyRecPtr::new(self.xlogid, self.xrecoff)
    }

    pub fn lsn(&self) -> Lsn {
        self.rec_ptr().into()
    }
}

/// Decodes a segment file name into a timeline and a legacy position.
///
/// The low group is multiplied back by the segment size with 32-bit
/// wrapping arithmetic, as the two-word representation does. The result is
/// the segment's start offset, so a name produced from a position that is
/// not segment-aligned decodes to the aligned position below it.
pub fn parse_legacy_filename(
    name: &str,
    segment_size: SegmentSize,
) -> Result<LegacySegmentName, FilenameError> {
    let len = name.chars().count();
    if len != SEGMENT_NAME_LEN {
        return Err(FilenameError::WrongLength { len });
    }

    let mut words = [0u32; 3];
    for (position, found) in name.chars().enumerate() {
        let digit = found
            .to_digit(16)
            .ok_or(FilenameError::InvalidHexDigit { position, found })?;
        let word = &mut words[position / 8];
        *word = (*word << 4) | digit;
    }

    let [timeline, xlogid, segment] = words;
    Ok(LegacySegmentName {
        timeline,
        xlogid,
        xrecoff: segment.wrapping_mul(segment_size.get()),
    })
}
