//! Error types for the playback session.

use bdnav_formats::{FormatError, UserOperation};
use thiserror::Error;

/// Failures returned by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A metadata file is malformed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Disc access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Title, playlist, chapter, mark, angle or stream does not exist.
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Operation not valid in the current session state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// The operation is prohibited by the current UO mask.
    #[error("User operation {0} is not permitted")]
    Disallowed(UserOperation),

    /// Interactive input needs a navigation engine.
    #[error("No navigation engine attached")]
    NoNavigationEngine,

    /// The unit at the given title byte offset could not be decrypted.
    #[error("Failed to decrypt aligned unit at byte {unit}")]
    UnitDecryptFailed { unit: u64 },

    /// Protected content and no usable decryption engine.
    #[error("Content is encrypted and no decryption engine is available")]
    Encrypted,
}

pub type Result<T> = std::result::Result<T, SessionError>;
