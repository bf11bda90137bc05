//! `index.bdmv` parsing.
//!
//! Layout:
//! ```text
//! 0   "INDX" + version
//! 8   u32 indexes start address
//! 12  u32 extension data start address
//! 16  24 reserved bytes
//! 40  AppInfoBDMV (u32 length + 34 bytes)
//! ..  Indexes (u32 length, first play, top menu, u16 title count, titles)
//! ```
//! Every index object is 12 bytes: a 32-bit word holding the object type
//! (and access type for titles) followed by an HDMV or BD-J body.

use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::bits::BitReader;
use crate::error::{FileKind, FormatError};
use crate::header::{check_address, read_header, Version, HEADER_END};

/// Title access flags.
pub const ACCESS_PROHIBITED: u8 = 0x01;
pub const ACCESS_HIDDEN: u8 = 0x02;

/// HDMV movie object id used for an empty slot.
const HDMV_ID_NONE: u32 = 0xFFFF;

const APP_INFO_LEN: u32 = 34;
const OBJECT_LEN: u32 = 12;

/// Program kind behind an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectType {
    /// Interactive bytecode movie object.
    Hdmv = 1,
    /// Managed-runtime (BD-J) object.
    Bdj = 2,
}

/// Playback types of an index object.
pub mod playback_type {
    pub const HDMV_MOVIE: u8 = 0;
    pub const HDMV_INTERACTIVE: u8 = 1;
    pub const BDJ_MOVIE: u8 = 2;
    pub const BDJ_INTERACTIVE: u8 = 3;
}

/// Program launched by an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexObject {
    /// HDMV or BD-J.
    pub object_type: ObjectType,
    /// Raw playback type (see [`playback_type`]).
    pub playback_type: u8,
    /// Movie object id, or the BD-J object number parsed from its name.
    pub id_ref: u32,
    /// Five-character BD-J object name.
    pub bdjo_name: Option<String>,
}

impl IndexObject {
    pub fn hdmv(id_ref: u16, interactive: bool) -> Self {
        IndexObject {
            object_type: ObjectType::Hdmv,
            playback_type: if interactive {
                playback_type::HDMV_INTERACTIVE
            } else {
                playback_type::HDMV_MOVIE
            },
            id_ref: id_ref as u32,
            bdjo_name: None,
        }
    }

    pub fn bdj(name: &str, interactive: bool) -> Self {
        IndexObject {
            object_type: ObjectType::Bdj,
            playback_type: if interactive {
                playback_type::BDJ_INTERACTIVE
            } else {
                playback_type::BDJ_MOVIE
            },
            id_ref: name.parse().unwrap_or(0),
            bdjo_name: Some(name.to_string()),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(
            self.playback_type,
            playback_type::HDMV_INTERACTIVE | playback_type::BDJ_INTERACTIVE
        )
    }
}

/// One entry of the title table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTitle {
    /// Program started for this title.
    pub object: IndexObject,
    /// Access flags (see [`ACCESS_PROHIBITED`], [`ACCESS_HIDDEN`]).
    pub access_type: u8,
}

impl IndexTitle {
    pub fn accessible(&self) -> bool {
        self.access_type & ACCESS_PROHIBITED == 0
    }

    pub fn hidden(&self) -> bool {
        self.access_type & ACCESS_HIDDEN != 0
    }
}

/// AppInfoBDMV block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAppInfo {
    /// 0 = 2D, 1 = 3D.
    pub initial_output_mode_preference: u8,
    /// Disc carries stereoscopic content.
    pub content_exist_3d: bool,
    /// Initial dynamic range (UHD only).
    pub initial_dynamic_range_type: u8,
    /// Video format code.
    pub video_format: u8,
    /// Frame rate code.
    pub frame_rate: u8,
    /// Content provider data.
    pub user_data: [u8; 32],
}

impl Default for IndexAppInfo {
    fn default() -> Self {
        IndexAppInfo {
            initial_output_mode_preference: 0,
            content_exist_3d: false,
            initial_dynamic_range_type: 0,
            video_format: 0,
            frame_rate: 0,
            user_data: [0; 32],
        }
    }
}

/// Decoded `index.bdmv`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscIndex {
    pub version: Version,
    pub app_info: IndexAppInfo,
    /// Program run when the disc is inserted.
    pub first_play: Option<IndexObject>,
    /// Program run for the top menu.
    pub top_menu: Option<IndexObject>,
    /// Title table; title number `n` is `titles[n - 1]`.
    pub titles: Vec<IndexTitle>,
}

impl DiscIndex {
    /// Count titles per object type as (hdmv, bdj).
    pub fn title_counts(&self) -> (u32, u32) {
        self.titles
            .iter()
            .fold((0, 0), |(hdmv, bdj), t| match t.object.object_type {
                ObjectType::Hdmv => (hdmv + 1, bdj),
                ObjectType::Bdj => (hdmv, bdj + 1),
            })
    }
}

fn read_object_body(
    r: &mut BitReader<'_>,
    object_type: u32,
) -> Result<Option<IndexObject>, FormatError> {
    match object_type {
        1 => {
            let playback_type = r.read(2)? as u8;
            r.skip(14)?;
            let id_ref = r.read_u16()? as u32;
            r.skip(32)?;
            Ok(Some(IndexObject {
                object_type: ObjectType::Hdmv,
                playback_type,
                id_ref,
                bdjo_name: None,
            }))
        }
        2 => {
            let playback_type = r.read(2)? as u8;
            r.skip(14)?;
            let name = r.read_string(5)?;
            r.skip(8)?;
            Ok(Some(IndexObject {
                object_type: ObjectType::Bdj,
                playback_type,
                id_ref: name.parse().unwrap_or(0),
                bdjo_name: Some(name),
            }))
        }
        _ => {
            r.skip(64)?;
            Ok(None)
        }
    }
}

/// First play / top menu slot. Unknown object types and empty HDMV slots are absent.
fn read_playback_object(r: &mut BitReader<'_>) -> Result<Option<IndexObject>, FormatError> {
    let object_type = r.read(2)?;
    r.skip(30)?;
    let object = read_object_body(r, object_type)?;
    Ok(object.filter(|o| !(o.object_type == ObjectType::Hdmv && o.id_ref == HDMV_ID_NONE)))
}

fn read_app_info(r: &mut BitReader<'_>) -> Result<IndexAppInfo, FormatError> {
    let end = r.block(32)?;
    if end - r.byte_pos() < APP_INFO_LEN as usize {
        return Err(r.corrupt("AppInfoBDMV too short"));
    }
    r.skip(1)?;
    let initial_output_mode_preference = r.read(1)? as u8;
    let content_exist_3d = r.read_bool()?;
    r.skip(1)?;
    let initial_dynamic_range_type = r.read(4)? as u8;
    let video_format = r.read(4)? as u8;
    let frame_rate = r.read(4)? as u8;
    let mut user_data = [0u8; 32];
    user_data.copy_from_slice(r.read_bytes(32)?);
    r.end_block(end)?;

    Ok(IndexAppInfo {
        initial_output_mode_preference,
        content_exist_3d,
        initial_dynamic_range_type,
        video_format,
        frame_rate,
        user_data,
    })
}

/// Parse a complete `index.bdmv` image.
pub fn parse_index(data: &[u8]) -> Result<DiscIndex, FormatError> {
    let kind = FileKind::Index;
    let mut r = BitReader::new(data, kind);
    let version = read_header(&mut r, kind)?;

    let indexes_start = r.read_u32()?;
    let ext_start = r.read_u32()?;
    let indexes_start = check_address(&r, kind, indexes_start, false)?.unwrap_or(HEADER_END);
    check_address(&r, kind, ext_start, true)?;

    r.seek_byte(HEADER_END)?;
    let app_info = read_app_info(&mut r)?;
    if r.byte_pos() > indexes_start {
        return Err(kind.corrupt("AppInfoBDMV overlaps indexes", indexes_start));
    }

    r.seek_byte(indexes_start)?;
    let end = r.block(32)?;
    let first_play = read_playback_object(&mut r)?;
    let top_menu = read_playback_object(&mut r)?;

    let num_titles = r.read_u16()? as usize;
    if r.byte_pos() + num_titles * OBJECT_LEN as usize > end {
        return Err(r.corrupt("title count exceeds indexes length"));
    }

    let mut titles = Vec::with_capacity(num_titles);
    for _ in 0..num_titles {
        let object_type = r.read(2)?;
        let access_type = r.read(2)? as u8;
        r.skip(28)?;
        let object = read_object_body(&mut r, object_type)?
            .ok_or_else(|| r.corrupt("unknown title object type"))?;
        titles.push(IndexTitle {
            object,
            access_type,
        });
    }
    r.end_block(end)?;

    if first_play.is_none() {
        warn!("[Index] No first play object");
    }
    debug!(
        "[Index] Parsed index.bdmv: version={:?}, titles={}, first_play={}, top_menu={}",
        version,
        titles.len(),
        first_play.is_some(),
        top_menu.is_some()
    );

    Ok(DiscIndex {
        version,
        app_info,
        first_play,
        top_menu,
        titles,
    })
}

fn put_object(buf: &mut BytesMut, object: Option<&IndexObject>, access_type: u8) {
    let Some(object) = object else {
        buf.put_bytes(0, OBJECT_LEN as usize);
        return;
    };

    buf.put_u32((object.object_type as u32) << 30 | (access_type as u32 & 0x03) << 28);
    buf.put_u16((object.playback_type as u16 & 0x03) << 14);
    match object.object_type {
        ObjectType::Hdmv => {
            buf.put_u16(object.id_ref as u16);
            buf.put_u32(0);
        }
        ObjectType::Bdj => {
            let default_name = format!("{:05}", object.id_ref);
            let name = object.bdjo_name.as_deref().unwrap_or(&default_name);
            let mut raw = [b'0'; 5];
            for (dst, src) in raw.iter_mut().zip(name.bytes()) {
                *dst = src;
            }
            buf.put_slice(&raw);
            buf.put_u8(0);
        }
    }
}

/// Encode a [`DiscIndex`] into its on-disc representation.
pub fn encode_index(index: &DiscIndex) -> Bytes {
    let indexes_start = HEADER_END as u32 + 4 + APP_INFO_LEN;

    let mut buf = BytesMut::new();
    buf.put_slice(FileKind::Index.magic());
    buf.put_slice(index.version.as_bytes());
    buf.put_u32(indexes_start);
    buf.put_u32(0);
    buf.put_bytes(0, 24);

    let app = &index.app_info;
    buf.put_u32(APP_INFO_LEN);
    buf.put_u8(
        (app.initial_output_mode_preference & 0x01) << 6
            | (app.content_exist_3d as u8) << 5
            | (app.initial_dynamic_range_type & 0x0F),
    );
    buf.put_u8((app.video_format & 0x0F) << 4 | (app.frame_rate & 0x0F));
    buf.put_slice(&app.user_data);

    let indexes_len = OBJECT_LEN * 2 + 2 + OBJECT_LEN * index.titles.len() as u32;
    buf.put_u32(indexes_len);
    put_object(&mut buf, index.first_play.as_ref(), 0);
    put_object(&mut buf, index.top_menu.as_ref(), 0);
    buf.put_u16(index.titles.len() as u16);
    for title in &index.titles {
        put_object(&mut buf, Some(&title.object), title.access_type);
    }

    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> DiscIndex {
        DiscIndex {
            version: Version::V0200,
            app_info: IndexAppInfo {
                initial_output_mode_preference: 1,
                content_exist_3d: true,
                initial_dynamic_range_type: 0,
                video_format: 6,
                frame_rate: 4,
                user_data: [0x5A; 32],
            },
            first_play: Some(IndexObject::hdmv(0, false)),
            top_menu: Some(IndexObject::hdmv(1, true)),
            titles: vec![
                IndexTitle {
                    object: IndexObject::hdmv(2, false),
                    access_type: 0,
                },
                IndexTitle {
                    object: IndexObject::bdj("00003", true),
                    access_type: ACCESS_HIDDEN,
                },
                IndexTitle {
                    object: IndexObject::hdmv(4, false),
                    access_type: ACCESS_PROHIBITED,
                },
            ],
        }
    }

    #[test]
    fn test_parse_encoded_index() {
        let index = sample_index();
        let parsed = parse_index(&encode_index(&index)).unwrap();
        assert_eq!(parsed, index);

        assert!(parsed.titles[0].accessible());
        assert!(parsed.titles[1].hidden());
        assert!(parsed.titles[1].object.is_interactive());
        assert_eq!(parsed.titles[1].object.id_ref, 3);
        assert!(!parsed.titles[2].accessible());
        assert_eq!(parsed.title_counts(), (2, 1));
    }

    #[test]
    fn test_empty_slots_are_absent() {
        let mut index = sample_index();
        index.first_play = None;
        index.top_menu = Some(IndexObject::hdmv(0xFFFF, false));
        let parsed = parse_index(&encode_index(&index)).unwrap();
        assert!(parsed.first_play.is_none());
        assert!(parsed.top_menu.is_none());
        assert_eq!(parsed.titles.len(), 3);
    }

    #[test]
    fn test_truncated_index_rejected() {
        let data = encode_index(&sample_index());
        for cut in [10, 41, data.len() - 1] {
            let err = parse_index(&data[..cut]).unwrap_err();
            assert!(matches!(err, FormatError::CorruptIndex { .. }), "cut at {}", cut);
        }
    }

    #[test]
    fn test_title_count_overflow_rejected() {
        let mut data = encode_index(&sample_index()).to_vec();
        // The title count sits right after the indexes length and the two 12-byte slots.
        let count_at = 78 + 4 + 24;
        data[count_at] = 0x00;
        data[count_at + 1] = 0x09;
        let err = parse_index(&data).unwrap_err();
        assert_eq!(
            err,
            FormatError::CorruptIndex {
                reason: "title count exceeds indexes length",
                offset: count_at + 2
            }
        );
    }

    #[test]
    fn test_bad_indexes_address_rejected() {
        let mut data = encode_index(&sample_index()).to_vec();
        data[8..12].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        assert!(matches!(
            parse_index(&data),
            Err(FormatError::CorruptIndex {
                reason: "section address out of range",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_title_object_type_rejected() {
        let mut data = encode_index(&sample_index()).to_vec();
        let first_title = 78 + 4 + 24 + 2;
        data[first_title] |= 0xC0;
        assert!(matches!(
            parse_index(&data),
            Err(FormatError::CorruptIndex {
                reason: "unknown title object type",
                ..
            })
        ));
    }
}
