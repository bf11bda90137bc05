//! Stream coding information shared by playlists and clip info files.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::bits::BitReader;
use crate::error::FormatError;

/// Stream coding types.
pub mod coding_type {
    pub const MPEG1_VIDEO: u8 = 0x01;
    pub const MPEG2_VIDEO: u8 = 0x02;
    pub const MPEG1_AUDIO: u8 = 0x03;
    pub const MPEG2_AUDIO: u8 = 0x04;
    pub const LPCM: u8 = 0x80;
    pub const AC3: u8 = 0x81;
    pub const DTS: u8 = 0x82;
    pub const TRUHD: u8 = 0x83;
    pub const AC3PLUS: u8 = 0x84;
    pub const DTSHD: u8 = 0x85;
    pub const DTSHD_MASTER: u8 = 0x86;
    pub const PG: u8 = 0x90;
    pub const IG: u8 = 0x91;
    pub const TEXT_SUBTITLE: u8 = 0x92;
    pub const AC3PLUS_SECONDARY: u8 = 0xa1;
    pub const DTSHD_SECONDARY: u8 = 0xa2;
    pub const H264: u8 = 0x1b;
    pub const H264_MVC: u8 = 0x20;
    pub const HEVC: u8 = 0x24;
    pub const VC1: u8 = 0xea;
}

/// Broad stream family derived from the coding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamCategory {
    Video,
    Audio,
    Presentation,
    Interactive,
    Text,
    Unknown,
}

impl StreamCategory {
    pub fn of(coding: u8) -> Self {
        use coding_type::*;
        match coding {
            MPEG1_VIDEO | MPEG2_VIDEO | VC1 | H264 | H264_MVC | HEVC => StreamCategory::Video,
            MPEG1_AUDIO | MPEG2_AUDIO | LPCM | AC3 | DTS | TRUHD | AC3PLUS | DTSHD
            | DTSHD_MASTER | AC3PLUS_SECONDARY | DTSHD_SECONDARY => StreamCategory::Audio,
            PG => StreamCategory::Presentation,
            IG => StreamCategory::Interactive,
            TEXT_SUBTITLE => StreamCategory::Text,
            _ => StreamCategory::Unknown,
        }
    }
}

/// Coding information of one elementary stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAttributes {
    /// Coding type (see [`coding_type`]).
    pub coding_type: u8,
    /// Video format or audio channel layout.
    pub format: u8,
    /// Frame rate or sample rate code.
    pub rate: u8,
    /// Aspect ratio code (clip info only).
    pub aspect: u8,
    /// Original-content flag (clip info only).
    pub oc_flag: bool,
    /// HEVC dynamic range type.
    pub dynamic_range_type: u8,
    /// HEVC color space.
    pub color_space: u8,
    /// HEVC copy restriction flag.
    pub cr_flag: bool,
    /// HDR10+ flag.
    pub hdr_plus: bool,
    /// Character code of text subtitles.
    pub char_code: u8,
    /// ISO 639-2 language code, empty for video.
    pub lang: String,
}

impl StreamAttributes {
    pub fn category(&self) -> StreamCategory {
        StreamCategory::of(self.coding_type)
    }

    pub fn coding_name(&self) -> &'static str {
        use coding_type::*;
        match self.coding_type {
            MPEG1_VIDEO => "MPEG-1 Video",
            MPEG2_VIDEO => "MPEG-2 Video",
            VC1 => "VC-1",
            H264 => "H.264",
            H264_MVC => "H.264 MVC",
            HEVC => "HEVC",
            MPEG1_AUDIO => "MPEG-1 Audio",
            MPEG2_AUDIO => "MPEG-2 Audio",
            LPCM => "LPCM",
            AC3 => "AC-3",
            DTS => "DTS",
            TRUHD => "TrueHD",
            AC3PLUS | AC3PLUS_SECONDARY => "E-AC-3",
            DTSHD | DTSHD_SECONDARY => "DTS-HD",
            DTSHD_MASTER => "DTS-HD Master Audio",
            PG => "Presentation Graphics",
            IG => "Interactive Graphics",
            TEXT_SUBTITLE => "Text Subtitle",
            _ => "Unknown",
        }
    }
}

/// Which file the attribute block comes from; the video layouts differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrLayout {
    Playlist,
    ClipInfo,
}

/// Parse a length-prefixed coding info block.
pub(crate) fn read_attributes(
    r: &mut BitReader<'_>,
    layout: AttrLayout,
) -> Result<StreamAttributes, FormatError> {
    let end = r.block(8)?;
    let mut attrs = StreamAttributes {
        coding_type: r.read_u8()?,
        ..Default::default()
    };

    match attrs.category() {
        StreamCategory::Video => {
            attrs.format = r.read(4)? as u8;
            attrs.rate = r.read(4)? as u8;
            match layout {
                AttrLayout::Playlist => {
                    if attrs.coding_type == coding_type::HEVC {
                        attrs.dynamic_range_type = r.read(4)? as u8;
                        attrs.color_space = r.read(4)? as u8;
                        attrs.cr_flag = r.read_bool()?;
                        attrs.hdr_plus = r.read_bool()?;
                    }
                }
                AttrLayout::ClipInfo => {
                    attrs.aspect = r.read(4)? as u8;
                    r.skip(2)?;
                    attrs.oc_flag = r.read_bool()?;
                    if attrs.coding_type == coding_type::HEVC {
                        attrs.cr_flag = r.read_bool()?;
                        attrs.dynamic_range_type = r.read(4)? as u8;
                        attrs.color_space = r.read(4)? as u8;
                        attrs.hdr_plus = r.read_bool()?;
                    }
                }
            }
        }
        StreamCategory::Audio => {
            attrs.format = r.read(4)? as u8;
            attrs.rate = r.read(4)? as u8;
            attrs.lang = r.read_string(3)?;
        }
        StreamCategory::Presentation | StreamCategory::Interactive => {
            attrs.lang = r.read_string(3)?;
        }
        StreamCategory::Text => {
            attrs.char_code = r.read_u8()?;
            attrs.lang = r.read_string(3)?;
        }
        StreamCategory::Unknown => {
            log::debug!(
                "[Streams] Unrecognized coding type 0x{:02x}, skipping attributes",
                attrs.coding_type
            );
        }
    }

    r.end_block(end)?;
    Ok(attrs)
}

fn put_lang(buf: &mut BytesMut, lang: &str) {
    let mut code = [0u8; 3];
    for (dst, src) in code.iter_mut().zip(lang.bytes()) {
        *dst = src;
    }
    buf.put_slice(&code);
}

/// Encode a coding info block including its length byte.
pub(crate) fn write_attributes(buf: &mut BytesMut, attrs: &StreamAttributes, layout: AttrLayout) {
    let mut body = BytesMut::new();
    body.put_u8(attrs.coding_type);

    match attrs.category() {
        StreamCategory::Video => {
            body.put_u8((attrs.format & 0x0F) << 4 | (attrs.rate & 0x0F));
            let hevc = attrs.coding_type == coding_type::HEVC;
            match layout {
                AttrLayout::Playlist => {
                    if hevc {
                        body.put_u8((attrs.dynamic_range_type & 0x0F) << 4 | (attrs.color_space & 0x0F));
                        body.put_u8((attrs.cr_flag as u8) << 7 | (attrs.hdr_plus as u8) << 6);
                    }
                }
                AttrLayout::ClipInfo => {
                    let mut word = (attrs.aspect as u32 & 0x0F) << 12 | (attrs.oc_flag as u32) << 9;
                    if hevc {
                        word |= (attrs.cr_flag as u32) << 8
                            | (attrs.dynamic_range_type as u32 & 0x0F) << 4
                            | (attrs.color_space as u32 & 0x0F);
                        body.put_u16(word as u16);
                        body.put_u8((attrs.hdr_plus as u8) << 7);
                    } else {
                        body.put_u8((word >> 8) as u8);
                    }
                }
            }
            // Pad to the customary fixed size of the attribute block.
            while body.len() < 5 {
                body.put_u8(0);
            }
        }
        StreamCategory::Audio => {
            body.put_u8((attrs.format & 0x0F) << 4 | (attrs.rate & 0x0F));
            put_lang(&mut body, &attrs.lang);
        }
        StreamCategory::Presentation | StreamCategory::Interactive => {
            put_lang(&mut body, &attrs.lang);
        }
        StreamCategory::Text => {
            body.put_u8(attrs.char_code);
            put_lang(&mut body, &attrs.lang);
        }
        StreamCategory::Unknown => {}
    }

    buf.put_u8(body.len() as u8);
    buf.put_slice(&body);
}
