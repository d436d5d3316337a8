//! Log sequence positions.

use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A position in the WAL stream as a single 64-bit counter (9.3 and later).
///
/// Displays in the `XXXXXXXX/YYYYYYYY` form the server prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lsn(pub u64);

impl Lsn {
    /// High 32 bits ("log id" in the legacy representation).
    pub fn xlogid(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Low 32 bits ("record offset" in the legacy representation).
    pub fn xrecoff(self) -> u32 {
        self.0 as u32
    }
}

impl From<u64> for Lsn {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<LegacyRecPtr> for Lsn {
    fn from(ptr: LegacyRecPtr) -> Self {
        Self(((ptr.xlogid as u64) << 32) | ptr.xrecoff as u64)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.xlogid(), self.xrecoff())
    }
}

impl FromStr for Lsn {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FormatError::InvalidLsn(s.to_string());
        let (hi, lo) = s.trim().split_once('/').ok_or_else(invalid)?;
        let well_formed =
            |part: &str| (1..=8).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed(hi) || !well_formed(lo) {
            return Err(invalid());
        }
        let hi = u32::from_str_radix(hi, 16).map_err(|_| invalid())?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| invalid())?;
        Ok(LegacyRecPtr::new(hi, lo).into())
    }
}

/// A position in the WAL stream as the two-word pair used before 9.3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegacyRecPtr {
    pub xlogid: u32,
    pub xrecoff: u32,
}

impl LegacyRecPtr {
    pub fn new(xlogid: u32, xrecoff: u32) -> Self {
        Self { xlogid, xrecoff }
    }
}

impl From<Lsn> for LegacyRecPtr {
    fn from(lsn: Lsn) -> Self {
        Self::new(lsn.xlogid(), lsn.xrecoff())
    }
}
