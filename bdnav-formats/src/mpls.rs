//! `*.mpls` playlist parsing.
//!
//! Layout:
//! ```text
//! 0   "MPLS" + version
//! 8   u32 PlayList start address
//! 12  u32 PlayListMark start address
//! 16  u32 extension data start address
//! 40  AppInfoPlayList
//! ..  PlayList (play items with STN tables, sub paths)
//! ..  PlayListMark
//! ```
//! All times are 45 kHz ticks.

use bytes::{BufMut, Bytes, BytesMut};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::bits::BitReader;
use crate::error::{FileKind, FormatError};
use crate::header::{check_address, read_header, Version, HEADER_END};
use crate::stream::{read_attributes, write_attributes, AttrLayout, StreamAttributes};
use crate::uo_mask::UoMask;

/// Playlist playback types.
pub mod playlist_type {
    pub const SEQUENTIAL: u8 = 1;
    pub const RANDOM: u8 = 2;
    pub const SHUFFLE: u8 = 3;
}

/// Mark types.
pub mod mark_type {
    /// Chapter entry point.
    pub const ENTRY: u8 = 1;
    pub const LINK: u8 = 2;
}

/// AppInfoPlayList block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistAppInfo {
    /// Sequential, random or shuffle (see [`playlist_type`]).
    pub playback_type: u8,
    /// Number of items played for random/shuffle playlists.
    pub playback_count: u16,
    /// Operations prohibited for the whole playlist.
    pub uo_mask: UoMask,
    pub random_access_flag: bool,
    pub audio_mix_flag: bool,
    pub lossless_bypass_flag: bool,
    pub mvc_base_view_r_flag: bool,
    pub sdr_conversion_notification_flag: bool,
}

/// Reference to a clip file (`BDMV/STREAM/<clip_id>.m2ts`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRef {
    /// Five-digit clip name.
    pub clip_id: String,
    /// Codec identifier, normally `M2TS`.
    pub codec_id: String,
    pub stc_id: u8,
}

impl ClipRef {
    pub fn new(clip_id: &str) -> Self {
        ClipRef {
            clip_id: clip_id.to_string(),
            codec_id: "M2TS".to_string(),
            stc_id: 0,
        }
    }
}

/// Still behaviour at the end of a play item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StillMode {
    #[default]
    None = 0,
    /// Hold for `still_time` seconds.
    Timed = 1,
    /// Hold until the still is released.
    Infinite = 2,
}

impl From<u8> for StillMode {
    fn from(value: u8) -> Self {
        match value {
            1 => StillMode::Timed,
            2 => StillMode::Infinite,
            _ => StillMode::None,
        }
    }
}

/// Where the packets of a stream come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamSource {
    /// Stream type 1: the play item's own clip.
    PlayItem { pid: u16 },
    /// Stream type 2: a clip of a sub path.
    SubPath {
        subpath_id: u8,
        subclip_id: u8,
        pid: u16,
    },
    /// Stream types 3 and 4: sub path multiplexed in the main clip.
    InMux {
        stream_type: u8,
        subpath_id: u8,
        pid: u16,
    },
}

impl StreamSource {
    pub fn pid(&self) -> u16 {
        match *self {
            StreamSource::PlayItem { pid }
            | StreamSource::SubPath { pid, .. }
            | StreamSource::InMux { pid, .. } => pid,
        }
    }

    pub fn stream_type(&self) -> u8 {
        match *self {
            StreamSource::PlayItem { .. } => 1,
            StreamSource::SubPath { .. } => 2,
            StreamSource::InMux { stream_type, .. } => stream_type,
        }
    }

    pub fn subpath_id(&self) -> Option<u8> {
        match *self {
            StreamSource::PlayItem { .. } => None,
            StreamSource::SubPath { subpath_id, .. } | StreamSource::InMux { subpath_id, .. } => {
                Some(subpath_id)
            }
        }
    }
}

/// One entry of a stream number table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub source: StreamSource,
    pub attributes: StreamAttributes,
}

/// Secondary audio entry with the primary audio streams it may mix with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryAudioEntry {
    pub stream: StreamEntry,
    pub primary_audio_refs: Vec<u8>,
}

/// Secondary (PiP) video entry with its companion stream references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryVideoEntry {
    pub stream: StreamEntry,
    pub secondary_audio_refs: Vec<u8>,
    pub pip_pg_refs: Vec<u8>,
}

/// Stream number table of a play item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTable {
    pub video: Vec<StreamEntry>,
    pub audio: Vec<StreamEntry>,
    pub pg: Vec<StreamEntry>,
    pub pip_pg: Vec<StreamEntry>,
    pub ig: Vec<StreamEntry>,
    pub secondary_audio: Vec<SecondaryAudioEntry>,
    pub secondary_video: Vec<SecondaryVideoEntry>,
    /// Dolby Vision enhancement layer streams.
    pub dv: Vec<StreamEntry>,
}

impl StreamTable {
    /// Every stream entry in table order.
    pub fn entries(&self) -> impl Iterator<Item = &StreamEntry> {
        self.video
            .iter()
            .chain(self.audio.iter())
            .chain(self.pg.iter())
            .chain(self.pip_pg.iter())
            .chain(self.ig.iter())
            .chain(self.secondary_audio.iter().map(|e| &e.stream))
            .chain(self.secondary_video.iter().map(|e| &e.stream))
            .chain(self.dv.iter())
    }
}

/// Play item: a time range of one clip (per angle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayItem {
    /// Clip per angle; index 0 is the default angle.
    pub clips: Vec<ClipRef>,
    pub connection_condition: u8,
    pub in_time: u32,
    pub out_time: u32,
    pub uo_mask: UoMask,
    pub random_access_flag: bool,
    pub still_mode: StillMode,
    /// Still duration in seconds for [`StillMode::Timed`].
    pub still_time: u16,
    pub is_different_audio: bool,
    pub is_seamless_angle: bool,
    pub stn: StreamTable,
}

impl PlayItem {
    pub fn new(clip_id: &str, in_time: u32, out_time: u32) -> Self {
        PlayItem {
            clips: vec![ClipRef::new(clip_id)],
            connection_condition: 1,
            in_time,
            out_time,
            uo_mask: UoMask::EMPTY,
            random_access_flag: false,
            still_mode: StillMode::None,
            still_time: 0,
            is_different_audio: false,
            is_seamless_angle: false,
            stn: StreamTable::default(),
        }
    }

    pub fn angle_count(&self) -> usize {
        self.clips.len()
    }

    pub fn duration(&self) -> u32 {
        self.out_time.saturating_sub(self.in_time)
    }
}

/// Clip played by a sub path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPlayItem {
    pub clips: Vec<ClipRef>,
    pub connection_condition: u8,
    pub in_time: u32,
    pub out_time: u32,
    pub sync_play_item_id: u16,
    pub sync_pts: u32,
}

/// Sub path (secondary audio/video, text subtitles, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPath {
    pub sub_path_type: u8,
    pub is_repeat: bool,
    pub sub_play_items: Vec<SubPlayItem>,
}

/// Playlist mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistMark {
    /// Entry (chapter) or link mark (see [`mark_type`]).
    pub mark_type: u8,
    /// Index of the play item holding the mark.
    pub play_item_ref: u16,
    /// Clip time of the mark.
    pub time: u32,
    pub entry_es_pid: u16,
    pub duration: u32,
}

impl PlaylistMark {
    pub fn entry(play_item_ref: u16, time: u32) -> Self {
        PlaylistMark {
            mark_type: mark_type::ENTRY,
            play_item_ref,
            time,
            entry_es_pid: 0xFFFF,
            duration: 0,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.mark_type == mark_type::ENTRY
    }
}

/// Decoded playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub version: Version,
    pub app_info: PlaylistAppInfo,
    pub play_items: Vec<PlayItem>,
    pub sub_paths: Vec<SubPath>,
    /// Marks ordered by playlist time.
    pub marks: Vec<PlaylistMark>,
}

impl Playlist {
    /// Total duration in 45 kHz ticks.
    pub fn duration(&self) -> u64 {
        self.play_items.iter().map(|pi| pi.duration() as u64).sum()
    }

    /// Playlist time (45 kHz) of a mark.
    pub fn mark_time(&self, mark: &PlaylistMark) -> u64 {
        let item = mark.play_item_ref as usize;
        let before: u64 = self.play_items[..item.min(self.play_items.len())]
            .iter()
            .map(|pi| pi.duration() as u64)
            .sum();
        let in_time = self
            .play_items
            .get(item)
            .map(|pi| pi.in_time)
            .unwrap_or(0);
        before + mark.time.saturating_sub(in_time) as u64
    }
}

fn read_clip_ref(r: &mut BitReader<'_>) -> Result<(String, String), FormatError> {
    let clip_id = r.read_string(5)?;
    let codec_id = r.read_string(4)?;
    Ok((clip_id, codec_id))
}

fn read_app_info(r: &mut BitReader<'_>) -> Result<PlaylistAppInfo, FormatError> {
    let end = r.block(32)?;
    r.skip(8)?;
    let playback_type = r.read_u8()?;
    let playback_count = r.read_u16()?;
    let playback_count = match playback_type {
        playlist_type::RANDOM | playlist_type::SHUFFLE => playback_count,
        _ => 0,
    };
    let uo_mask = UoMask::from_wire(r.read_u64()?);
    let random_access_flag = r.read_bool()?;
    let audio_mix_flag = r.read_bool()?;
    let lossless_bypass_flag = r.read_bool()?;
    let mvc_base_view_r_flag = r.read_bool()?;
    let sdr_conversion_notification_flag = r.read_bool()?;
    r.skip(11)?;
    r.end_block(end)?;

    Ok(PlaylistAppInfo {
        playback_type,
        playback_count,
        uo_mask,
        random_access_flag,
        audio_mix_flag,
        lossless_bypass_flag,
        mvc_base_view_r_flag,
        sdr_conversion_notification_flag,
    })
}

fn read_stream(r: &mut BitReader<'_>) -> Result<StreamEntry, FormatError> {
    let end = r.block(8)?;
    let stream_type = r.read_u8()?;
    let source = match stream_type {
        1 => StreamSource::PlayItem { pid: r.read_u16()? },
        2 => StreamSource::SubPath {
            subpath_id: r.read_u8()?,
            subclip_id: r.read_u8()?,
            pid: r.read_u16()?,
        },
        3 | 4 => StreamSource::InMux {
            stream_type,
            subpath_id: r.read_u8()?,
            pid: r.read_u16()?,
        },
        _ => return Err(r.corrupt("unknown stream entry type")),
    };
    r.end_block(end)?;

    let attributes = read_attributes(r, AttrLayout::Playlist)?;
    Ok(StreamEntry { source, attributes })
}

fn read_refs(r: &mut BitReader<'_>) -> Result<Vec<u8>, FormatError> {
    let count = r.read_u8()? as usize;
    r.skip(8)?;
    let refs = r.read_bytes(count)?.to_vec();
    if count % 2 == 1 {
        r.skip(8)?;
    }
    Ok(refs)
}

fn read_streams(r: &mut BitReader<'_>, count: u8) -> Result<Vec<StreamEntry>, FormatError> {
    (0..count).map(|_| read_stream(r)).collect()
}

fn read_stn(r: &mut BitReader<'_>) -> Result<StreamTable, FormatError> {
    let end = r.block(16)?;
    r.skip(16)?;
    let num_video = r.read_u8()?;
    let num_audio = r.read_u8()?;
    let num_pg = r.read_u8()?;
    let num_ig = r.read_u8()?;
    let num_secondary_audio = r.read_u8()?;
    let num_secondary_video = r.read_u8()?;
    let num_pip_pg = r.read_u8()?;
    let num_dv = r.read_u8()?;
    r.skip_bytes(4)?;

    let video = read_streams(r, num_video)?;
    let audio = read_streams(r, num_audio)?;
    let pg = read_streams(r, num_pg)?;
    let pip_pg = read_streams(r, num_pip_pg)?;
    let ig = read_streams(r, num_ig)?;

    let mut secondary_audio = Vec::with_capacity(num_secondary_audio as usize);
    for _ in 0..num_secondary_audio {
        let stream = read_stream(r)?;
        let primary_audio_refs = read_refs(r)?;
        secondary_audio.push(SecondaryAudioEntry {
            stream,
            primary_audio_refs,
        });
    }

    let mut secondary_video = Vec::with_capacity(num_secondary_video as usize);
    for _ in 0..num_secondary_video {
        let stream = read_stream(r)?;
        let secondary_audio_refs = read_refs(r)?;
        let pip_pg_refs = read_refs(r)?;
        secondary_video.push(SecondaryVideoEntry {
            stream,
            secondary_audio_refs,
            pip_pg_refs,
        });
    }

    let dv = read_streams(r, num_dv)?;
    r.end_block(end)?;

    Ok(StreamTable {
        video,
        audio,
        pg,
        pip_pg,
        ig,
        secondary_audio,
        secondary_video,
        dv,
    })
}

fn read_play_item(r: &mut BitReader<'_>) -> Result<PlayItem, FormatError> {
    let end = r.block(16)?;
    let (clip_id, codec_id) = read_clip_ref(r)?;
    r.skip(11)?;
    let is_multi_angle = r.read_bool()?;
    let connection_condition = r.read(4)? as u8;
    let stc_id = r.read_u8()?;
    let in_time = r.read_u32()?;
    let out_time = r.read_u32()?;
    if out_time < in_time {
        return Err(r.corrupt("play item ends before it starts"));
    }
    let uo_mask = UoMask::from_wire(r.read_u64()?);
    let random_access_flag = r.read_bool()?;
    r.skip(7)?;
    let still_mode = StillMode::from(r.read_u8()?);
    let still_time = r.read_u16()?;
    let still_time = if still_mode == StillMode::Timed { still_time } else { 0 };

    let mut clips = vec![ClipRef {
        clip_id,
        codec_id,
        stc_id,
    }];
    let mut is_different_audio = false;
    let mut is_seamless_angle = false;
    if is_multi_angle {
        let angle_count = r.read_u8()?.max(1);
        r.skip(6)?;
        is_different_audio = r.read_bool()?;
        is_seamless_angle = r.read_bool()?;
        for _ in 1..angle_count {
            let (clip_id, codec_id) = read_clip_ref(r)?;
            let stc_id = r.read_u8()?;
            clips.push(ClipRef {
                clip_id,
                codec_id,
                stc_id,
            });
        }
    }

    let stn = read_stn(r)?;
    r.end_block(end)?;

    Ok(PlayItem {
        clips,
        connection_condition,
        in_time,
        out_time,
        uo_mask,
        random_access_flag,
        still_mode,
        still_time,
        is_different_audio,
        is_seamless_angle,
        stn,
    })
}

fn read_sub_play_item(r: &mut BitReader<'_>) -> Result<SubPlayItem, FormatError> {
    let end = r.block(16)?;
    let (clip_id, codec_id) = read_clip_ref(r)?;
    r.skip(27)?;
    let connection_condition = r.read(4)? as u8;
    let is_multi_clip = r.read_bool()?;
    let stc_id = r.read_u8()?;
    let in_time = r.read_u32()?;
    let out_time = r.read_u32()?;
    let sync_play_item_id = r.read_u16()?;
    let sync_pts = r.read_u32()?;

    let mut clips = vec![ClipRef {
        clip_id,
        codec_id,
        stc_id,
    }];
    if is_multi_clip {
        let clip_count = r.read_u8()?.max(1);
        r.skip(8)?;
        for _ in 1..clip_count {
            let (clip_id, codec_id) = read_clip_ref(r)?;
            let stc_id = r.read_u8()?;
            clips.push(ClipRef {
                clip_id,
                codec_id,
                stc_id,
            });
        }
    }
    r.end_block(end)?;

    Ok(SubPlayItem {
        clips,
        connection_condition,
        in_time,
        out_time,
        sync_play_item_id,
        sync_pts,
    })
}

fn read_sub_path(r: &mut BitReader<'_>) -> Result<SubPath, FormatError> {
    let end = r.block(32)?;
    r.skip(8)?;
    let sub_path_type = r.read_u8()?;
    r.skip(15)?;
    let is_repeat = r.read_bool()?;
    r.skip(8)?;
    let count = r.read_u8()?;
    let sub_play_items = (0..count)
        .map(|_| read_sub_play_item(r))
        .collect::<Result<Vec<_>, _>>()?;
    r.end_block(end)?;

    Ok(SubPath {
        sub_path_type,
        is_repeat,
        sub_play_items,
    })
}

fn read_marks(r: &mut BitReader<'_>) -> Result<Vec<PlaylistMark>, FormatError> {
    let end = r.block(32)?;
    let count = r.read_u16()? as usize;
    if r.byte_pos() + count * 14 > end {
        return Err(r.corrupt("mark count exceeds block length"));
    }
    let mut marks = Vec::with_capacity(count);
    for _ in 0..count {
        r.skip(8)?;
        marks.push(PlaylistMark {
            mark_type: r.read_u8()?,
            play_item_ref: r.read_u16()?,
            time: r.read_u32()?,
            entry_es_pid: r.read_u16()?,
            duration: r.read_u32()?,
        });
    }
    r.end_block(end)?;
    Ok(marks)
}

/// Check every cross reference inside the playlist.
fn validate(playlist: &Playlist, kind: FileKind, offset: usize) -> Result<(), FormatError> {
    let sub_paths = &playlist.sub_paths;

    for item in &playlist.play_items {
        let stn = &item.stn;
        for entry in stn.entries() {
            match entry.source {
                StreamSource::PlayItem { .. } => {}
                StreamSource::SubPath {
                    subpath_id,
                    subclip_id,
                    ..
                } => {
                    let path = sub_paths
                        .get(subpath_id as usize)
                        .ok_or_else(|| kind.corrupt("stream references missing sub path", offset))?;
                    if subclip_id as usize >= path.sub_play_items.len() {
                        return Err(kind.corrupt("stream references missing sub clip", offset));
                    }
                }
                StreamSource::InMux { subpath_id, .. } => {
                    if subpath_id as usize >= sub_paths.len() {
                        return Err(kind.corrupt("stream references missing sub path", offset));
                    }
                }
            }
        }

        for sa in &stn.secondary_audio {
            if sa.primary_audio_refs.iter().any(|&r| r as usize >= stn.audio.len()) {
                return Err(kind.corrupt("secondary audio references missing primary audio", offset));
            }
        }
        for sv in &stn.secondary_video {
            if sv
                .secondary_audio_refs
                .iter()
                .any(|&r| r as usize >= stn.secondary_audio.len())
            {
                return Err(kind.corrupt("secondary video references missing secondary audio", offset));
            }
            if sv.pip_pg_refs.iter().any(|&r| r as usize >= stn.pip_pg.len()) {
                return Err(kind.corrupt("secondary video references missing PiP PG stream", offset));
            }
        }
    }

    for mark in &playlist.marks {
        if mark.play_item_ref as usize >= playlist.play_items.len() {
            return Err(kind.corrupt("mark references missing play item", offset));
        }
    }
    Ok(())
}

/// Parse a complete `*.mpls` image.
pub fn parse_playlist(data: &[u8]) -> Result<Playlist, FormatError> {
    let kind = FileKind::Playlist;
    let mut r = BitReader::new(data, kind);
    let version = read_header(&mut r, kind)?;

    let list_pos = r.read_u32()?;
    let mark_pos = r.read_u32()?;
    let ext_pos = r.read_u32()?;
    let list_pos = check_address(&r, kind, list_pos, false)?.unwrap_or(HEADER_END);
    let mark_pos = check_address(&r, kind, mark_pos, false)?.unwrap_or(HEADER_END);
    check_address(&r, kind, ext_pos, true)?;

    r.seek_byte(HEADER_END)?;
    let app_info = read_app_info(&mut r)?;

    r.seek_byte(list_pos)?;
    let end = r.block(32)?;
    r.skip(16)?;
    let item_count = r.read_u16()?;
    let sub_count = r.read_u16()?;
    let play_items = (0..item_count)
        .map(|_| read_play_item(&mut r))
        .collect::<Result<Vec<_>, _>>()?;
    let sub_paths = (0..sub_count)
        .map(|_| read_sub_path(&mut r))
        .collect::<Result<Vec<_>, _>>()?;
    r.end_block(end)?;

    r.seek_byte(mark_pos)?;
    let marks = read_marks(&mut r)?;

    let mut playlist = Playlist {
        version,
        app_info,
        play_items,
        sub_paths,
        marks,
    };
    validate(&playlist, kind, list_pos)?;

    let mut marks = std::mem::take(&mut playlist.marks);
    marks.sort_by_key(|m| playlist.mark_time(m));
    playlist.marks = marks;

    debug!(
        "[Mpls] Parsed playlist: items={}, sub_paths={}, marks={}, duration={} (45kHz)",
        playlist.play_items.len(),
        playlist.sub_paths.len(),
        playlist.marks.len(),
        playlist.duration()
    );
    Ok(playlist)
}

fn put_fixed(buf: &mut BytesMut, value: &str, width: usize) {
    let mut raw = vec![b'0'; width];
    for (dst, src) in raw.iter_mut().zip(value.bytes()) {
        *dst = src;
    }
    buf.put_slice(&raw);
}

fn put_stream(buf: &mut BytesMut, entry: &StreamEntry) {
    let mut body = BytesMut::new();
    body.put_u8(entry.source.stream_type());
    match entry.source {
        StreamSource::PlayItem { pid } => body.put_u16(pid),
        StreamSource::SubPath {
            subpath_id,
            subclip_id,
            pid,
        } => {
            body.put_u8(subpath_id);
            body.put_u8(subclip_id);
            body.put_u16(pid);
        }
        StreamSource::InMux {
            subpath_id, pid, ..
        } => {
            body.put_u8(subpath_id);
            body.put_u16(pid);
        }
    }
    while body.len() < 9 {
        body.put_u8(0);
    }
    buf.put_u8(body.len() as u8);
    buf.put_slice(&body);
    write_attributes(buf, &entry.attributes, AttrLayout::Playlist);
}

fn put_refs(buf: &mut BytesMut, refs: &[u8]) {
    buf.put_u8(refs.len() as u8);
    buf.put_u8(0);
    buf.put_slice(refs);
    if refs.len() % 2 == 1 {
        buf.put_u8(0);
    }
}

fn put_stn(buf: &mut BytesMut, stn: &StreamTable) {
    let mut body = BytesMut::new();
    body.put_u16(0);
    for count in [
        stn.video.len(),
        stn.audio.len(),
        stn.pg.len(),
        stn.ig.len(),
        stn.secondary_audio.len(),
        stn.secondary_video.len(),
        stn.pip_pg.len(),
        stn.dv.len(),
    ] {
        body.put_u8(count as u8);
    }
    body.put_u32(0);

    for entry in stn.video.iter().chain(&stn.audio).chain(&stn.pg).chain(&stn.pip_pg).chain(&stn.ig) {
        put_stream(&mut body, entry);
    }
    for sa in &stn.secondary_audio {
        put_stream(&mut body, &sa.stream);
        put_refs(&mut body, &sa.primary_audio_refs);
    }
    for sv in &stn.secondary_video {
        put_stream(&mut body, &sv.stream);
        put_refs(&mut body, &sv.secondary_audio_refs);
        put_refs(&mut body, &sv.pip_pg_refs);
    }
    for entry in &stn.dv {
        put_stream(&mut body, entry);
    }

    buf.put_u16(body.len() as u16);
    buf.put_slice(&body);
}

fn put_play_item(buf: &mut BytesMut, item: &PlayItem) {
    let mut body = BytesMut::new();
    let (first, angles) = match item.clips.split_first() {
        Some((first, rest)) => (first.clone(), rest),
        None => (ClipRef::new("00000"), &[][..]),
    };
    let multi_angle = !angles.is_empty();

    put_fixed(&mut body, &first.clip_id, 5);
    put_fixed(&mut body, &first.codec_id, 4);
    body.put_u16((multi_angle as u16) << 4 | (item.connection_condition as u16 & 0x0F));
    body.put_u8(first.stc_id);
    body.put_u32(item.in_time);
    body.put_u32(item.out_time);
    body.put_u64(item.uo_mask.to_wire());
    body.put_u8((item.random_access_flag as u8) << 7);
    body.put_u8(item.still_mode as u8);
    body.put_u16(item.still_time);
    if multi_angle {
        body.put_u8(item.clips.len() as u8);
        body.put_u8((item.is_different_audio as u8) << 1 | item.is_seamless_angle as u8);
        for clip in angles {
            put_fixed(&mut body, &clip.clip_id, 5);
            put_fixed(&mut body, &clip.codec_id, 4);
            body.put_u8(clip.stc_id);
        }
    }
    put_stn(&mut body, &item.stn);

    buf.put_u16(body.len() as u16);
    buf.put_slice(&body);
}

fn put_sub_path(buf: &mut BytesMut, path: &SubPath) {
    let mut body = BytesMut::new();
    body.put_u8(0);
    body.put_u8(path.sub_path_type);
    body.put_u16(path.is_repeat as u16);
    body.put_u8(0);
    body.put_u8(path.sub_play_items.len() as u8);

    for spi in &path.sub_play_items {
        let mut item = BytesMut::new();
        let (first, extra) = match spi.clips.split_first() {
            Some((first, rest)) => (first.clone(), rest),
            None => (ClipRef::new("00000"), &[][..]),
        };
        let multi_clip = !extra.is_empty();
        put_fixed(&mut item, &first.clip_id, 5);
        put_fixed(&mut item, &first.codec_id, 4);
        item.put_u32(((spi.connection_condition as u32 & 0x0F) << 1) | multi_clip as u32);
        item.put_u8(first.stc_id);
        item.put_u32(spi.in_time);
        item.put_u32(spi.out_time);
        item.put_u16(spi.sync_play_item_id);
        item.put_u32(spi.sync_pts);
        if multi_clip {
            item.put_u8(spi.clips.len() as u8);
            item.put_u8(0);
            for clip in extra {
                put_fixed(&mut item, &clip.clip_id, 5);
                put_fixed(&mut item, &clip.codec_id, 4);
                item.put_u8(clip.stc_id);
            }
        }
        body.put_u16(item.len() as u16);
        body.put_slice(&item);
    }

    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
}

/// Encode a [`Playlist`] into its on-disc representation.
pub fn encode_playlist(playlist: &Playlist) -> Bytes {
    let app = &playlist.app_info;
    let mut app_body = BytesMut::new();
    app_body.put_u8(0);
    app_body.put_u8(app.playback_type);
    app_body.put_u16(app.playback_count);
    app_body.put_u64(app.uo_mask.to_wire());
    app_body.put_u16(
        (app.random_access_flag as u16) << 15
            | (app.audio_mix_flag as u16) << 14
            | (app.lossless_bypass_flag as u16) << 13
            | (app.mvc_base_view_r_flag as u16) << 12
            | (app.sdr_conversion_notification_flag as u16) << 11,
    );

    let mut list_body = BytesMut::new();
    list_body.put_u16(0);
    list_body.put_u16(playlist.play_items.len() as u16);
    list_body.put_u16(playlist.sub_paths.len() as u16);
    for item in &playlist.play_items {
        put_play_item(&mut list_body, item);
    }
    for path in &playlist.sub_paths {
        put_sub_path(&mut list_body, path);
    }

    let mut mark_body = BytesMut::new();
    mark_body.put_u16(playlist.marks.len() as u16);
    for mark in &playlist.marks {
        mark_body.put_u8(0);
        mark_body.put_u8(mark.mark_type);
        mark_body.put_u16(mark.play_item_ref);
        mark_body.put_u32(mark.time);
        mark_body.put_u16(mark.entry_es_pid);
        mark_body.put_u32(mark.duration);
    }

    let list_pos = HEADER_END + 4 + app_body.len();
    let mark_pos = list_pos + 4 + list_body.len();

    let mut buf = BytesMut::new();
    buf.put_slice(FileKind::Playlist.magic());
    buf.put_slice(playlist.version.as_bytes());
    buf.put_u32(list_pos as u32);
    buf.put_u32(mark_pos as u32);
    buf.put_u32(0);
    buf.put_bytes(0, HEADER_END - 20);
    buf.put_u32(app_body.len() as u32);
    buf.put_slice(&app_body);
    buf.put_u32(list_body.len() as u32);
    buf.put_slice(&list_body);
    buf.put_u32(mark_body.len() as u32);
    buf.put_slice(&mark_body);
    buf.freeze()
}
