//! Engine and plugin contracts.

use std::fmt;
use std::path::Path;

use crate::error::{AacsErrorCode, DecryptError};

/// Size of an aligned unit: 32 source packets of 192 bytes.
pub const ALIGNED_UNIT_SIZE: usize = 6144;

/// True when the copy-permission bits of the first packet header are set.
pub fn is_unit_encrypted(unit: &[u8]) -> bool {
    unit.first().map_or(false, |b| b & 0xC0 != 0)
}

/// An opened decryption context.
///
/// Dropping the engine closes the context; implementations release their
/// resources in `Drop`.
pub trait DecryptEngine: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Decrypt one aligned unit in place.
    ///
    /// `unit` is exactly [`ALIGNED_UNIT_SIZE`] bytes. Returns `false` when the
    /// unit could not be decrypted.
    fn decrypt_unit(&mut self, unit: &mut [u8]) -> bool;
}

/// Strategy that knows how to open an engine for a disc.
pub trait DecryptPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Open a context for the disc rooted at `device`.
    fn open(
        &self,
        device: &Path,
        keyfile: Option<&Path>,
    ) -> Result<Box<dyn DecryptEngine>, DecryptError>;
}

/// Decryption capability of a session, resolved once when the disc is opened.
pub enum DecryptCapability {
    /// No engine is available.
    Absent,
    /// An engine opened the disc.
    Present(Box<dyn DecryptEngine>),
    /// An engine exists but could not open the disc.
    Failed(AacsErrorCode),
}

impl DecryptCapability {
    pub fn is_present(&self) -> bool {
        matches!(self, DecryptCapability::Present(_))
    }

    pub fn error_code(&self) -> Option<AacsErrorCode> {
        match self {
            DecryptCapability::Failed(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Debug for DecryptCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptCapability::Absent => f.write_str("Absent"),
            DecryptCapability::Present(engine) => write!(f, "Present({})", engine.name()),
            DecryptCapability::Failed(code) => write!(f, "Failed({})", code),
        }
    }
}
