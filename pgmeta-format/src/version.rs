//! Server version numbers and the layout facts that depend on them.
//!
//! Versions use the `server_version_num` encoding: `90603` is 9.6.3,
//! `130004` is 13.4.

use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A PostgreSQL server version in `server_version_num` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerVersion(u32);

impl ServerVersion {
    /// First release whose long page header carries `xlp_xlog_blcksz`.
    pub const BLOCK_SIZE_IN_HEADER: ServerVersion = ServerVersion(80300);
    /// First release with a single 64-bit `XLogRecPtr`.
    pub const SINGLE_WORD_LSN: ServerVersion = ServerVersion(90300);
    /// First release with `XLP_FIRST_IS_OVERWRITE_CONTRECORD`.
    pub const OVERWRITE_CONTRECORD: ServerVersion = ServerVersion(150000);

    pub const fn new(num: u32) -> Self {
        Self(num)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Major version as `major * 100 + minor` for 8.x/9.x and `major * 100`
    /// afterwards: 906 for 9.6, 1300 for 13.
    pub fn major(self) -> u32 {
        if self.0 >= 100000 {
            (self.0 / 10000) * 100
        } else {
            self.0 / 100
        }
    }

    /// `XLOG_PAGE_MAGIC` for this major version.
    pub fn page_magic(self) -> Option<u16> {
        let magic = match self.major() {
            802 => 0xD05E,
            803 => 0xD062,
            804 => 0xD063,
            900 => 0xD064,
            901 => 0xD066,
            902 => 0xD071,
            903 => 0xD075,
            904 => 0xD07E,
            905 => 0xD087,
            906 => 0xD093,
            1000 => 0xD097,
            1100 => 0xD098,
            1200 => 0xD101,
            1300 => 0xD106,
            1400 => 0xD10D,
            1500 => 0xD110,
            1600 => 0xD113,
            1700 => 0xD116,
            _ => return None,
        };
        Some(magic)
    }

    /// `XLP_ALL_FLAGS` for this version.
    pub fn all_page_flags(self) -> u16 {
        if self >= Self::OVERWRITE_CONTRECORD {
            0x000F
        } else if self >= Self::BLOCK_SIZE_IN_HEADER {
            0x0007
        } else {
            0x0003
        }
    }

    /// Whether the long page header's `xlp_xlog_blcksz` is populated.
    pub fn reports_block_size(self) -> bool {
        self >= Self::BLOCK_SIZE_IN_HEADER
    }

    /// Whether log positions are a single 64-bit counter.
    pub fn uses_single_word_lsn(self) -> bool {
        self >= Self::SINGLE_WORD_LSN
    }
}

impl From<u32> for ServerVersion {
    fn from(num: u32) -> Self {
        Self(num)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 100000 {
            write!(f, "{}.{}", self.0 / 10000, self.0 % 10000)
        } else {
            write!(f, "{}.{}.{}", self.0 / 10000, (self.0 / 100) % 100, self.0 % 100)
        }
    }
}

/// Accepts `130004`, `13`, `13.4`, `9.6` and `9.6.3`. Bare numbers of three
/// or four digits are rejected.
impl FromStr for ServerVersion {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FormatError::InvalidServerVersion(s.to_string());
        let s = s.trim();

        if !s.contains('.') {
            let n: u32 = s.parse().map_err(|_| invalid())?;
            return match n {
                0..=99 => Ok(Self(n * 10000)),
                // Neither a major version nor a server_version_num.
                100..=9999 => Err(invalid()),
                _ => Ok(Self(n)),
            };
        }

        let parts = s
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match parts.as_slice() {
            [major, minor] if *major >= 10 => Ok(Self(major * 10000 + minor)),
            [major, minor] if *minor < 100 => Ok(Self(major * 10000 + minor * 100)),
            [major, minor, patch] if *major < 10 && *minor < 100 && *patch < 100 => {
                Ok(Self(major * 10000 + minor * 100 + patch))
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major() {
        assert_eq!(ServerVersion::new(90603).major(), 906);
        assert_eq!(ServerVersion::new(80304).major(), 803);
        assert_eq!(ServerVersion::new(100005).major(), 1000);
        assert_eq!(ServerVersion::new(130004).major(), 1300);
    }

    #[test]
    fn test_page_magic() {
        assert_eq!(ServerVersion::new(90603).page_magic(), Some(0xD093));
        assert_eq!(ServerVersion::new(130004).page_magic(), Some(0xD106));
        assert_eq!(ServerVersion::new(170000).page_magic(), Some(0xD116));
        assert_eq!(ServerVersion::new(70400).page_magic(), None);
        assert_eq!(ServerVersion::new(990000).page_magic(), None);
    }

    #[test]
    fn test_all_page_flags() {
        assert_eq!(ServerVersion::new(80200).all_page_flags(), 0x0003);
        assert_eq!(ServerVersion::new(90603).all_page_flags(), 0x0007);
        assert_eq!(ServerVersion::new(140000).all_page_flags(), 0x0007);
        assert_eq!(ServerVersion::new(150002).all_page_flags(), 0x000F);
    }

    #[test]
    fn test_version_gates() {
        assert!(!ServerVersion::new(80222).reports_block_size());
        assert!(ServerVersion::new(80300).reports_block_size());
        assert!(!ServerVersion::new(90224).uses_single_word_lsn());
        assert!(ServerVersion::new(90300).uses_single_word_lsn());
    }

    #[test]
    fn test_parse() {
        assert_eq!("130004".parse::<ServerVersion>().unwrap().as_u32(), 130004);
        assert_eq!("13".parse::<ServerVersion>().unwrap().as_u32(), 130000);
        assert_eq!("13.4".parse::<ServerVersion>().unwrap().as_u32(), 130004);
        assert_eq!("9.6".parse::<ServerVersion>().unwrap().as_u32(), 90600);
        assert_eq!("9.6.3".parse::<ServerVersion>().unwrap().as_u32(), 90603);
        assert!("9.x".parse::<ServerVersion>().is_err());
        assert!("".parse::<ServerVersion>().is_err());
        assert!("13.4.1".parse::<ServerVersion>().is_err());
    }

    #[test]
    fn test_parse_rejects_ambiguous_numbers() {
        assert!("1300".parse::<ServerVersion>().is_err());
        assert!("100".parse::<ServerVersion>().is_err());
        assert!("9999".parse::<ServerVersion>().is_err());
        assert_eq!("99".parse::<ServerVersion>().unwrap().as_u32(), 990000);
        assert_eq!("80204".parse::<ServerVersion>().unwrap().as_u32(), 80204);
    }

    #[test]
    fn test_display() {
        assert_eq!(ServerVersion::new(90603).to_string(), "9.6.3");
        assert_eq!(ServerVersion::new(130004).to_string(), "13.4");
    }
}
