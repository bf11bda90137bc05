//! Common file header (magic + version) of the navigation files.

use serde::{Deserialize, Serialize};

use crate::bits::BitReader;
use crate::error::{FileKind, FormatError};

/// Format version found after the magic bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Version {
    #[default]
    V0100,
    V0200,
    /// Ultra HD Blu-ray.
    V0300,
}

impl Version {
    pub fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            Version::V0100 => b"0100",
            Version::V0200 => b"0200",
            Version::V0300 => b"0300",
        }
    }

    fn from_bytes(raw: &[u8]) -> Option<Self> {
        match raw {
            b"0100" => Some(Version::V0100),
            b"0200" => Some(Version::V0200),
            b"0300" => Some(Version::V0300),
            _ => None,
        }
    }
}

/// Check magic and version at the start of a file of the given kind.
pub(crate) fn read_header(r: &mut BitReader<'_>, kind: FileKind) -> Result<Version, FormatError> {
    let magic = r.read_bytes(4)?;
    if magic != kind.magic() {
        return Err(kind.corrupt("invalid magic", 0));
    }
    let version = r.read_bytes(4)?;
    Version::from_bytes(version).ok_or_else(|| kind.corrupt("unsupported version", 4))
}

/// Validate a section start address read from the header.
///
/// Addresses must point past the fixed 40-byte header and inside the file.
/// Zero means "section absent" where `optional` is set.
pub(crate) fn check_address(
    r: &BitReader<'_>,
    kind: FileKind,
    address: u32,
    optional: bool,
) -> Result<Option<usize>, FormatError> {
    if address == 0 && optional {
        return Ok(None);
    }
    let address = address as usize;
    if address < HEADER_END || address > r.len() {
        return Err(kind.corrupt("section address out of range", address));
    }
    Ok(Some(address))
}

/// Size of the fixed header; the first data block starts here.
pub const HEADER_END: usize = 40;
