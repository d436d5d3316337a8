//! WAL page headers.
//!
//! Every WAL page starts with a short header. The first page of a segment
//! carries a long header, which appends the system identifier and the
//! segment and block sizes the segment was written with.
//!
//! Short header, 9.3 and later (24 bytes after alignment):
//!
//! ```text
//! +--------+--------+--------+-------------+---------+---------+
//! | magic  | info   | tli    | pageaddr    | rem_len | padding |
//! | 2 bytes| 2 bytes| 4 bytes| 8 bytes     | 4 bytes | 4 bytes |
//! +--------+--------+--------+-------------+---------+---------+
//! ```
//!
//! Before 9.3 the page address is an `(xlogid, xrecoff)` word pair and
//! there is no `rem_len`, which makes the short header 16 bytes. In both
//! layouts the long header continues with:
//!
//! ```text
//! +----------+----------+-------------+
//! | sysid    | seg_size | xlog_blcksz |
//! | 8 bytes  | 4 bytes  | 4 bytes     |
//! +----------+----------+-------------+
//! ```
//!
//! Fields are in the writing server's native byte order and are decoded in
//! host order.

use crate::error::FormatError;
use crate::sizes::{BlockSize, SegmentSize};
use crate::version::ServerVersion;
use bytes::Buf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The first record on the page continues from the previous page.
pub const XLP_FIRST_IS_CONTRECORD: u16 = 0x0001;
/// The page carries a long header.
pub const XLP_LONG_HEADER: u16 = 0x0002;
/// Backup blocks on this page are optional.
pub const XLP_BKP_REMOVABLE: u16 = 0x0004;
/// The continuation record at the start of the page was overwritten (15+).
pub const XLP_FIRST_IS_OVERWRITE_CONTRECORD: u16 = 0x0008;

/// Size of the fields a long header adds to the short header.
const LONG_HEADER_EXTRA: usize = 8 + 4 + 4;

/// Physical layout of the short page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLayout {
    /// Two-word page address, no `rem_len` (before 9.3).
    TwoWordAddress,
    /// 64-bit page address followed by `rem_len` (9.3 and later).
    SingleWordAddress,
}

impl PageLayout {
    pub fn for_version(version: ServerVersion) -> Self {
        if version.uses_single_word_lsn() {
            PageLayout::SingleWordAddress
        } else {
            PageLayout::TwoWordAddress
        }
    }

    /// `SizeOfXLogShortPHD`.
    pub fn short_header_size(self) -> usize {
        match self {
            PageLayout::TwoWordAddress => 16,
            PageLayout::SingleWordAddress => 24,
        }
    }

    /// `SizeOfXLogLongPHD`.
    pub fn long_header_size(self) -> usize {
        self.short_header_size() + LONG_HEADER_EXTRA
    }
}

/// The fields every WAL page header starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortPageHeader {
    pub magic: u16,
    pub info: u16,
    pub tli: u32,
    /// Page address as a 64-bit position; the legacy word pair is combined.
    pub pageaddr: u64,
    /// Bytes of a continuation record on this page; absent before 9.3.
    pub rem_len: Option<u32>,
}

impl ShortPageHeader {
    pub fn is_long(&self) -> bool {
        self.info & XLP_LONG_HEADER != 0
    }
}

/// A parsed WAL page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalPageHeader {
    Short(ShortPageHeader),
    Long {
        std: ShortPageHeader,
        sysid: u64,
        seg_size: u32,
        xlog_blcksz: u32,
    },
}

impl WalPageHeader {
    /// Parses the header at the start of `page`.
    ///
    /// The common prefix is read first; the long-header fields are only
    /// read when `XLP_LONG_HEADER` is set in `info`.
    pub fn parse(page: &[u8], layout: PageLayout) -> Result<Self, FormatError> {
        let short_size = layout.short_header_size();
        if page.len() < short_size {
            return Err(FormatError::ShortBuffer {
                expected: short_size,
                actual: page.len(),
            });
        }

        let mut buf = page;
        let magic = buf.get_u16_ne();
        let info = buf.get_u16_ne();
        let tli = buf.get_u32_ne();
        let (pageaddr, rem_len) = match layout {
            PageLayout::TwoWordAddress => {
                let xlogid = buf.get_u32_ne() as u64;
                let xrecoff = buf.get_u32_ne() as u64;
                ((xlogid << 32) | xrecoff, None)
            }
            PageLayout::SingleWordAddress => {
                let pageaddr = buf.get_u64_ne();
                let rem_len = buf.get_u32_ne();
                (pageaddr, Some(rem_len))
            }
        };

        let std = ShortPageHeader {
            magic,
            info,
            tli,
            pageaddr,
            rem_len,
        };
        if !std.is_long() {
            return Ok(WalPageHeader::Short(std));
        }

        let long_size = layout.long_header_size();
        if page.len() < long_size {
            return Err(FormatError::ShortBuffer {
                expected: long_size,
                actual: page.len(),
            });
        }

        let mut buf = &page[short_size..];
        Ok(WalPageHeader::Long {
            std,
            sysid: buf.get_u64_ne(),
            seg_size: buf.get_u32_ne(),
            xlog_blcksz: buf.get_u32_ne(),
        })
    }

    pub fn common(&self) -> &ShortPageHeader {
        match self {
            WalPageHeader::Short(std) | WalPageHeader::Long { std, .. } => std,
        }
    }

    pub fn magic(&self) -> u16 {
        self.common().magic
    }

    pub fn info(&self) -> u16 {
        self.common().info
    }

    pub fn is_long(&self) -> bool {
        matches!(self, WalPageHeader::Long { .. })
    }
}

/// Why a file is not a complete WAL segment.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "defect", rename_all = "snake_case")]
pub enum SegmentDefect {
    #[error("cannot read file: {reason}")]
    Unreadable { reason: String },

    #[error("first page is short: read {read} of {expected} bytes")]
    ShortPage { read: usize, expected: usize },

    #[error("bad page magic {found:#06X} (expected {expected:#06X})")]
    BadMagic { found: u16, expected: u16 },

    #[error("unknown page flags in info {info:#06X} (allowed {allowed:#06X})")]
    UnknownFlags { info: u16, allowed: u16 },

    #[error("first page has no long header (info {info:#06X})")]
    NotLongHeader { info: u16 },

    #[error("segment size in header is {found} (expected {expected})")]
    SegmentSizeMismatch { found: u32, expected: u32 },

    #[error("block size in header is {found} (expected {expected})")]
    BlockSizeMismatch { found: u32, expected: u32 },

    #[error("file size is {found} bytes (expected {expected})")]
    FileSizeMismatch { found: u64, expected: u64 },
}

/// What a complete WAL segment must look like for one installation.
///
/// Version-dependent parts (magic, legal flags, header layout, whether the
/// block size is checked) come from the server version at runtime, so one
/// binary serves every supported server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalPolicy {
    pub server_version: ServerVersion,
    pub magic: u16,
    pub all_flags: u16,
    pub layout: PageLayout,
    pub segment_size: SegmentSize,
    pub block_size: BlockSize,
    pub check_block_size: bool,
}

impl WalPolicy {
    /// Builds the policy for a server version.
    pub fn for_server(
        server_version: ServerVersion,
        segment_size: SegmentSize,
        block_size: BlockSize,
    ) -> Result<Self, FormatError> {
        let magic = server_version
            .page_magic()
            .ok_or(FormatError::UnsupportedServerVersion(server_version.as_u32()))?;

        Ok(Self {
            server_version,
            magic,
            all_flags: server_version.all_page_flags(),
            layout: PageLayout::for_version(server_version),
            segment_size,
            block_size,
            check_block_size: server_version.reports_block_size(),
        })
    }

    /// Overrides the expected page magic, for builds with a patched
    /// `XLOG_PAGE_MAGIC`.
    pub fn with_magic(mut self, magic: u16) -> Self {
        self.magic = magic;
        self
    }

    /// Validates the first page of a segment.
    ///
    /// Checks run in order and stop at the first failure: magic, unknown
    /// flag bits, long-header flag, segment size, then block size when the
    /// server populates it.
    pub fn check_first_page(&self, page: &[u8]) -> Result<WalPageHeader, SegmentDefect> {
        let expected = self.block_size.as_usize();
        if page.len() < expected {
            return Err(SegmentDefect::ShortPage {
                read: page.len(),
                expected,
            });
        }

        let header =
            WalPageHeader::parse(page, self.layout).map_err(|_| SegmentDefect::ShortPage {
                read: page.len(),
                expected,
            })?;
        let info = header.info();

        if header.magic() != self.magic {
            return Err(SegmentDefect::BadMagic {
                found: header.magic(),
                expected: self.magic,
            });
        }
        if info & !self.all_flags != 0 {
            return Err(SegmentDefect::UnknownFlags {
                info,
                allowed: self.all_flags,
            });
        }

        let (seg_size, xlog_blcksz) = match header {
            WalPageHeader::Long {
                seg_size,
                xlog_blcksz,
                ..
            } => (seg_size, xlog_blcksz),
            WalPageHeader::Short(_) => return Err(SegmentDefect::NotLongHeader { info }),
        };

        if seg_size != self.segment_size.get() {
            return Err(SegmentDefect::SegmentSizeMismatch {
                found: seg_size,
                expected: self.segment_size.get(),
            });
        }
        if self.check_block_size && xlog_blcksz != self.block_size.get() {
            return Err(SegmentDefect::BlockSizeMismatch {
                found: xlog_blcksz,
                expected: self.block_size.get(),
            });
        }

        Ok(header)
    }

    /// Validates the on-disk size of a segment file.
    ///
    /// Compressed or otherwise resized copies fail here just like
    /// truncated ones.
    pub fn check_file_size(&self, file_size: u64) -> Result<(), SegmentDefect> {
        if file_size != self.segment_size.as_u64() {
            return Err(SegmentDefect::FileSizeMismatch {
                found: file_size,
                expected: self.segment_size.as_u64(),
            });
        }
        Ok(())
    }

    /// Validates a segment from its first page and its on-disk size.
    pub fn check_segment(&self, first_page: &[u8], file_size: u64) -> Result<(), SegmentDefect> {
        self.check_first_page(first_page)?;
        self.check_file_size(file_size)
    }

    /// Builds a first page that passes [`WalPolicy::check_first_page`].
    pub fn first_page_template(&self, tli: u32, pageaddr: u64, sysid: u64) -> Vec<u8> {
        let mut page = vec![0u8; self.block_size.as_usize()];
        let mut at = 0;
        let mut put = |bytes: &[u8]| {
            page[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        };

        put(&self.magic.to_ne_bytes());
        put(&XLP_LONG_HEADER.to_ne_bytes());
        put(&tli.to_ne_bytes());
        match self.layout {
            PageLayout::TwoWordAddress => {
                put(&((pageaddr >> 32) as u32).to_ne_bytes());
                put(&(pageaddr as u32).to_ne_bytes());
            }
            PageLayout::SingleWordAddress => {
                put(&pageaddr.to_ne_bytes());
                put(&0u32.to_ne_bytes());
                put(&[0u8; 4]);
            }
        }
        put(&sysid.to_ne_bytes());
        put(&self.segment_size.get().to_ne_bytes());
        put(&self.block_size.get().to_ne_bytes());

        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(version: u32) -> WalPolicy {
        WalPolicy::for_server(
            ServerVersion::new(version),
            SegmentSize::default(),
            BlockSize::default(),
        )
        .unwrap()
    }

    fn write_u16(page: &mut [u8], at: usize, value: u16) {
        page[at..at + 2].copy_from_slice(&value.to_ne_bytes());
    }

    fn write_u32(page: &mut [u8], at: usize, value: u32) {
        page[at..at + 4].copy_from_slice(&value.to_ne_bytes());
    }

    const SEG_SIZE_AT: usize = 32;
    const BLCKSZ_AT: usize = 36;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(PageLayout::SingleWordAddress.short_header_size(), 24);
        assert_eq!(PageLayout::SingleWordAddress.long_header_size(), 40);
        assert_eq!(PageLayout::TwoWordAddress.short_header_size(), 16);
        assert_eq!(PageLayout::TwoWordAddress.long_header_size(), 32);
        assert_eq!(
            PageLayout::for_version(ServerVersion::new(90224)),
            PageLayout::TwoWordAddress
        );
    }

    #[test]
    fn test_parse_long_header() {
        let policy = policy(130004);
        let page = policy.first_page_template(3, 0x1_0000_0000, 0xDEAD_BEEF_CAFE);
        let header = WalPageHeader::parse(&page, policy.layout).unwrap();

        assert!(header.is_long());
        assert_eq!(header.magic(), 0xD106);
        match header {
            WalPageHeader::Long {
                std,
                sysid,
                seg_size,
                xlog_blcksz,
            } => {
                assert_eq!(std.tli, 3);
                assert_eq!(std.pageaddr, 0x1_0000_0000);
                assert_eq!(std.rem_len, Some(0));
                assert_eq!(sysid, 0xDEAD_BEEF_CAFE);
                assert_eq!(seg_size, 16 * 1024 * 1024);
                assert_eq!(xlog_blcksz, 8192);
            }
            WalPageHeader::Short(_) => panic!("expected long header"),
        }
    }

    #[test]
    fn test_parse_legacy_long_header() {
        let policy = policy(90224);
        let page = policy.first_page_template(1, 0x2_0500_0000, 42);
        let header = WalPageHeader::parse(&page, policy.layout).unwrap();

        assert_eq!(header.common().pageaddr, 0x2_0500_0000);
        assert_eq!(header.common().rem_len, None);
        assert!(matches!(header, WalPageHeader::Long { sysid: 42, .. }));
    }

    #[test]
    fn test_parse_short_header_skips_long_fields() {
        // Short header only; long fields would be out of bounds.
        let mut page = vec![0u8; 24];
        write_u16(&mut page, 0, 0xD106);
        write_u16(&mut page, 2, XLP_FIRST_IS_CONTRECORD);
        let header = WalPageHeader::parse(&page, PageLayout::SingleWordAddress).unwrap();
        assert!(!header.is_long());

        write_u16(&mut page, 2, XLP_LONG_HEADER);
        let result = WalPageHeader::parse(&page, PageLayout::SingleWordAddress);
        assert!(matches!(
            result,
            Err(FormatError::ShortBuffer { expected: 40, actual: 24 })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let result = WalPolicy::for_server(
            ServerVersion::new(70400),
            SegmentSize::default(),
            BlockSize::default(),
        );
        assert_eq!(result, Err(FormatError::UnsupportedServerVersion(70400)));
    }

    #[test]
    fn test_valid_first_page() {
        for version in [80300, 90224, 90603, 100005, 130004, 150002, 170000] {
            let policy = policy(version);
            let page = policy.first_page_template(1, 0, 1);
            assert!(policy.check_first_page(&page).is_ok(), "version {}", version);
            assert!(policy
                .check_segment(&page, 16 * 1024 * 1024)
                .is_ok());
        }
    }

    #[test]
    fn test_short_page() {
        let policy = policy(130004);
        let page = policy.first_page_template(1, 0, 1);
        assert_eq!(
            policy.check_first_page(&page[..8191]),
            Err(SegmentDefect::ShortPage {
                read: 8191,
                expected: 8192
            })
        );
        assert!(matches!(
            policy.check_first_page(&[]),
            Err(SegmentDefect::ShortPage { read: 0, .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let policy = policy(130004);
        let mut page = policy.first_page_template(1, 0, 1);
        write_u16(&mut page, 0, 0xD105);
        assert_eq!(
            policy.check_first_page(&page),
            Err(SegmentDefect::BadMagic {
                found: 0xD105,
                expected: 0xD106
            })
        );
    }

    #[test]
    fn test_unknown_flag_bit() {
        let policy = policy(130004);
        let mut page = policy.first_page_template(1, 0, 1);
        write_u16(&mut page, 2, XLP_LONG_HEADER | XLP_FIRST_IS_OVERWRITE_CONTRECORD);
        assert!(matches!(
            policy.check_first_page(&page),
            Err(SegmentDefect::UnknownFlags { info: 0x000A, allowed: 0x0007 })
        ));

        write_u16(&mut page, 2, XLP_LONG_HEADER | 0x0100);
        assert!(matches!(
            policy.check_first_page(&page),
            Err(SegmentDefect::UnknownFlags { .. })
        ));
    }

    #[test]
    fn test_overwrite_contrecord_legal_from_15() {
        let policy = policy(150002);
        let mut page = policy.first_page_template(1, 0, 1);
        write_u16(&mut page, 2, XLP_LONG_HEADER | XLP_FIRST_IS_OVERWRITE_CONTRECORD);
        assert!(policy.check_first_page(&page).is_ok());
    }

    #[test]
    fn test_missing_long_header() {
        let policy = policy(130004);
        let mut page = policy.first_page_template(1, 0, 1);
        write_u16(&mut page, 2, XLP_FIRST_IS_CONTRECORD);
        assert_eq!(
            policy.check_first_page(&page),
            Err(SegmentDefect::NotLongHeader { info: 0x0001 })
        );
    }

    #[test]
    fn test_segment_size_mismatch() {
        let policy = policy(130004);
        let mut page = policy.first_page_template(1, 0, 1);
        write_u32(&mut page, SEG_SIZE_AT, 64 * 1024 * 1024);
        assert!(matches!(
            policy.check_first_page(&page),
            Err(SegmentDefect::SegmentSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_block_size_checked_from_8_3() {
        let policy = policy(130004);
        let mut page = policy.first_page_template(1, 0, 1);
        write_u32(&mut page, BLCKSZ_AT, 16384);
        assert_eq!(
            policy.check_first_page(&page),
            Err(SegmentDefect::BlockSizeMismatch {
                found: 16384,
                expected: 8192
            })
        );
    }

    #[test]
    fn test_block_size_ignored_before_8_3() {
        let policy = policy(80204);
        assert!(!policy.check_block_size);
        let mut page = policy.first_page_template(1, 0, 1);
        // Two-word layout: block size field sits at 28.
        write_u32(&mut page, 28, 0);
        assert!(policy.check_first_page(&page).is_ok());
    }

    /// Builds a 9.2 first page field by field at the `XLogLongPageHeaderData`
    /// offsets, without going through the policy's template.
    fn legacy_first_page(seg_size: u32, xlog_blcksz: u32) -> Vec<u8> {
        let mut page = vec![0u8; 8192];
        write_u16(&mut page, 0, 0xD071);
        write_u16(&mut page, 2, XLP_LONG_HEADER);
        write_u32(&mut page, 4, 1);
        write_u32(&mut page, 8, 0x2);
        write_u32(&mut page, 12, 0x0500_0000);
        page[16..24].copy_from_slice(&0x1234_5678_9ABC_DEF0u64.to_ne_bytes());
        write_u32(&mut page, 24, seg_size);
        write_u32(&mut page, 28, xlog_blcksz);
        page
    }

    #[test]
    fn test_legacy_long_header_offsets() {
        let policy = policy(90224);
        let seg = 16 * 1024 * 1024;

        let header = policy.check_first_page(&legacy_first_page(seg, 8192)).unwrap();
        match header {
            WalPageHeader::Long {
                std,
                sysid,
                seg_size,
                xlog_blcksz,
            } => {
                assert_eq!(std.pageaddr, 0x2_0500_0000);
                assert_eq!(std.rem_len, None);
                assert_eq!(sysid, 0x1234_5678_9ABC_DEF0);
                assert_eq!(seg_size, seg);
                assert_eq!(xlog_blcksz, 8192);
            }
            other => panic!("expected long header, got {:?}", other),
        }

        assert_eq!(
            policy.check_first_page(&legacy_first_page(seg, 4096)),
            Err(SegmentDefect::BlockSizeMismatch {
                found: 4096,
                expected: 8192
            })
        );
        assert_eq!(
            policy.check_first_page(&legacy_first_page(seg * 2, 8192)),
            Err(SegmentDefect::SegmentSizeMismatch {
                found: seg * 2,
                expected: seg
            })
        );
    }

    #[test]
    fn test_file_size_must_match_exactly() {
        let policy = policy(130004);
        let seg = 16 * 1024 * 1024u64;
        assert!(policy.check_file_size(seg).is_ok());
        assert!(policy.check_file_size(seg - 1).is_err());
        assert!(policy.check_file_size(seg + 1).is_err());
        assert!(policy.check_file_size(0).is_err());

        let page = policy.first_page_template(1, 0, 1);
        assert_eq!(
            policy.check_segment(&page, seg - 1),
            Err(SegmentDefect::FileSizeMismatch {
                found: seg - 1,
                expected: seg
            })
        );
    }

    #[test]
    fn test_checks_run_in_order() {
        // Bad magic and bad size together report the magic first.
        let policy = policy(130004);
        let mut page = policy.first_page_template(1, 0, 1);
        write_u16(&mut page, 0, 0);
        write_u32(&mut page, SEG_SIZE_AT, 0);
        assert!(matches!(
            policy.check_segment(&page, 0),
            Err(SegmentDefect::BadMagic { .. })
        ));
    }

    #[test]
    fn test_with_magic_override() {
        let policy = policy(130004).with_magic(0xD1FF);
        let page = policy.first_page_template(1, 0, 1);
        assert!(policy.check_first_page(&page).is_ok());
        assert!(self::policy(130004).check_first_page(&page).is_err());
    }
}
