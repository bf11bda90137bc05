//! Error types for the decryption adapter.

use thiserror::Error;

/// Failures while resolving or opening a decryption engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    /// None of the candidate libraries could be loaded.
    #[error("Decryption library not found (tried: {0})")]
    LibraryNotFound(String),

    /// The library lacks a required entry point.
    #[error("Decryption library is missing symbol {0}")]
    MissingSymbol(String),

    /// The engine refused to open the disc.
    #[error("Decryption engine failed to open disc: {code}")]
    OpenFailed { code: AacsErrorCode },
}

/// Error codes reported when opening a protected disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AacsErrorCode {
    /// Opening failed without a specific reason.
    Unknown = 0,
    /// Disc metadata is corrupt.
    CorruptDisc = -1,
    /// No key configuration found.
    NoConfig = -2,
    /// No matching processing key.
    NoProcessingKey = -3,
    /// No valid host certificate.
    NoCertificate = -4,
    /// Host certificate has been revoked.
    CertificateRevoked = -5,
    /// Drive authentication failed.
    MmcFailed = -6,
}

impl From<i32> for AacsErrorCode {
    fn from(value: i32) -> Self {
        match value {
            -1 => AacsErrorCode::CorruptDisc,
            -2 => AacsErrorCode::NoConfig,
            -3 => AacsErrorCode::NoProcessingKey,
            -4 => AacsErrorCode::NoCertificate,
            -5 => AacsErrorCode::CertificateRevoked,
            -6 => AacsErrorCode::MmcFailed,
            _ => AacsErrorCode::Unknown,
        }
    }
}

impl From<AacsErrorCode> for i32 {
    fn from(value: AacsErrorCode) -> Self {
        value as i32
    }
}

impl std::fmt::Display for AacsErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AacsErrorCode::Unknown => "unknown error",
            AacsErrorCode::CorruptDisc => "corrupt disc",
            AacsErrorCode::NoConfig => "missing configuration",
            AacsErrorCode::NoProcessingKey => "no matching processing key",
            AacsErrorCode::NoCertificate => "no valid host certificate",
            AacsErrorCode::CertificateRevoked => "host certificate revoked",
            AacsErrorCode::MmcFailed => "drive authentication failed",
        };
        write!(f, "{} ({})", text, *self as i32)
    }
}
