//! Blu-ray navigation metadata formats.
//!
//! This crate decodes (and, for fixtures and tooling, encodes) the three
//! binary metadata files that describe a BDMV disc:
//!
//! - `BDMV/index.bdmv`: title table, first play and top menu objects
//! - `BDMV/PLAYLIST/*.mpls`: playlists of clip time ranges with stream tables
//! - `BDMV/CLIPINF/*.clpi`: per-clip program and entry point maps
//!
//! All files are big-endian and share a 40-byte header:
//!
//! ```text
//! +--------+---------+------------------------------+
//! | Magic  | Version | Section start addresses      |
//! | 4 bytes| "0n00"  | u32 each, rest reserved      |
//! +--------+---------+------------------------------+
//! ```
//!
//! Parsers validate every length and address before use and return a
//! [`FormatError`] instead of a partial result.
//!
//! # Example
//!
//! ```rust
//! use bdnav_formats::{encode_playlist, parse_playlist, PlayItem, Playlist};
//!
//! let mut playlist = Playlist::default();
//! playlist.play_items.push(PlayItem::new("00001", 0, 45000));
//!
//! let parsed = parse_playlist(&encode_playlist(&playlist)).unwrap();
//! assert_eq!(parsed.duration(), 45000);
//! ```

mod bits;
pub mod clpi;
pub mod error;
pub mod header;
pub mod index;
pub mod mpls;
pub mod stream;
pub mod uo_mask;

pub use clpi::{
    encode_clip_info, parse_clip_info, AtcSequence, ClipAttributes, ClipInfo, EntryPoint,
    EpMapStream, Program, ProgramStream, StcSequence, SOURCE_PACKET_SIZE,
};
pub use error::{FileKind, FormatError};
pub use header::Version;
pub use index::{
    encode_index, parse_index, DiscIndex, IndexAppInfo, IndexObject, IndexTitle, ObjectType,
};
pub use mpls::{
    encode_playlist, parse_playlist, ClipRef, PlayItem, Playlist, PlaylistAppInfo, PlaylistMark,
    SecondaryAudioEntry, SecondaryVideoEntry, StillMode, StreamEntry, StreamSource, StreamTable,
    SubPath, SubPlayItem,
};
pub use stream::{coding_type, StreamAttributes, StreamCategory};
pub use uo_mask::{UoMask, UserOperation};
