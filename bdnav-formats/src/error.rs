//! Error types for the on-disc metadata parsers.

use thiserror::Error;

/// Structural failures found while decoding a metadata file.
///
/// Every variant carries a static reason and the byte offset where decoding
/// stopped. Truncation is reported through the variant of the file being read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// `index.bdmv` is malformed.
    #[error("Corrupt index.bdmv: {reason} (at byte {offset})")]
    CorruptIndex { reason: &'static str, offset: usize },

    /// A `*.mpls` playlist is malformed.
    #[error("Corrupt playlist: {reason} (at byte {offset})")]
    CorruptPlaylist { reason: &'static str, offset: usize },

    /// A `*.clpi` clip information file is malformed.
    #[error("Corrupt clip info: {reason} (at byte {offset})")]
    CorruptClipInfo { reason: &'static str, offset: usize },
}

impl FormatError {
    /// Which kind of file produced this error.
    pub fn kind(&self) -> FileKind {
        match self {
            FormatError::CorruptIndex { .. } => FileKind::Index,
            FormatError::CorruptPlaylist { .. } => FileKind::Playlist,
            FormatError::CorruptClipInfo { .. } => FileKind::ClipInfo,
        }
    }

    /// Byte offset at which decoding failed.
    pub fn offset(&self) -> usize {
        match self {
            FormatError::CorruptIndex { offset, .. }
            | FormatError::CorruptPlaylist { offset, .. }
            | FormatError::CorruptClipInfo { offset, .. } => *offset,
        }
    }
}

/// Metadata file families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Index,
    Playlist,
    ClipInfo,
}

impl FileKind {
    /// Build the error variant matching this file kind.
    pub fn corrupt(self, reason: &'static str, offset: usize) -> FormatError {
        match self {
            FileKind::Index => FormatError::CorruptIndex { reason, offset },
            FileKind::Playlist => FormatError::CorruptPlaylist { reason, offset },
            FileKind::ClipInfo => FormatError::CorruptClipInfo { reason, offset },
        }
    }

    /// Four-byte magic at the start of the file.
    pub fn magic(self) -> &'static [u8; 4] {
        match self {
            FileKind::Index => b"INDX",
            FileKind::Playlist => b"MPLS",
            FileKind::ClipInfo => b"HDMV",
        }
    }
}
