//! Title model: clips, chapters, marks and angles of a playlist.
//!
//! Times in the model are 90 kHz ticks; on disc they are 45 kHz. Byte
//! offsets are relative to the start of the title's packet stream, where
//! each clip contributes the source packets between its in and out points,
//! padded to a whole aligned unit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bdnav_formats::{
    ClipInfo, FileKind, PlayItem, Playlist, StillMode, StreamEntry, StreamSource, UoMask,
    SOURCE_PACKET_SIZE,
};
use log::{debug, info, warn};
use serde::Serialize;

use crate::disc::DiscAccess;
use crate::error::{Result, SessionError};
use crate::meta;

/// Source packets per aligned unit.
pub const UNIT_PACKETS: u32 = 32;

/// Title list filters.
pub const TITLES_ALL: u8 = 0;
/// Drop playlists identical to an earlier one.
pub const TITLES_FILTER_DUP_TITLE: u8 = 0x01;
/// Drop playlists repeating one clip more than twice.
pub const TITLES_FILTER_DUP_CLIP: u8 = 0x02;
pub const TITLES_RELEVANT: u8 = TITLES_FILTER_DUP_TITLE | TITLES_FILTER_DUP_CLIP;

/// Elementary stream as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub coding_type: u8,
    pub format: u8,
    pub rate: u8,
    pub char_code: u8,
    pub lang: String,
    pub pid: u16,
    /// Aspect ratio code from the clip's program info.
    pub aspect: u8,
    /// Sub path carrying the stream, `None` for the main path.
    pub subpath_id: Option<u8>,
}

/// One play item of the title, resolved for the selected angle.
#[derive(Debug, Clone, Serialize)]
pub struct Clip {
    /// Five-digit clip name.
    pub clip_id: String,
    /// Source packets read from the clip file.
    pub pkt_count: u32,
    pub still_mode: StillMode,
    pub still_time: u16,
    pub video_streams: Vec<StreamInfo>,
    pub audio_streams: Vec<StreamInfo>,
    pub pg_streams: Vec<StreamInfo>,
    pub ig_streams: Vec<StreamInfo>,
    pub sec_audio_streams: Vec<StreamInfo>,
    pub sec_video_streams: Vec<StreamInfo>,
    /// Title time at which the clip starts.
    pub start_time: u64,
    /// Clip time of the in point.
    pub in_time: u64,
    /// Clip time of the out point.
    pub out_time: u64,
    /// First source packet read from the clip file.
    pub start_pkt: u32,
    /// Source packet after the last one read.
    pub end_pkt: u32,
    /// Packet offset of the clip inside the title.
    pub title_pkt: u64,
    pub uo_mask: UoMask,
    pub is_seamless_angle: bool,
    #[serde(skip)]
    pub(crate) info: Arc<ClipInfo>,
}

impl Clip {
    pub fn duration(&self) -> u64 {
        self.out_time - self.in_time
    }

    /// Title byte offset of the first byte of the clip.
    pub fn start_offset(&self) -> u64 {
        self.title_pkt * SOURCE_PACKET_SIZE
    }

    /// Title byte offset just past the clip.
    pub fn end_offset(&self) -> u64 {
        (self.title_pkt + self.span_pkts()) * SOURCE_PACKET_SIZE
    }

    /// Packets the clip occupies in the title: `pkt_count` rounded up to a
    /// whole unit, so every clip starts on a unit boundary.
    pub fn span_pkts(&self) -> u64 {
        (self.pkt_count as u64).div_ceil(UNIT_PACKETS as u64) * UNIT_PACKETS as u64
    }

    /// Title byte offset of a clip time (45 kHz), snapped to the entry point before it.
    pub(crate) fn offset_of_time(&self, clip_time45: u32) -> u64 {
        let spn = self
            .info
            .lookup_spn(clip_time45, true)
            .clamp(self.start_pkt, self.end_pkt);
        (self.title_pkt + (spn - self.start_pkt) as u64) * SOURCE_PACKET_SIZE
    }

    /// Clip time (45 kHz) at a title byte offset inside this clip.
    pub(crate) fn time_of_offset(&self, offset: u64) -> u32 {
        let pkt = (offset / SOURCE_PACKET_SIZE).saturating_sub(self.title_pkt);
        let spn = self.start_pkt as u64 + pkt;
        let in45 = (self.in_time / 2) as u32;
        let out45 = (self.out_time / 2) as u32;
        match self.info.lookup_pts(spn as u32) {
            Some(pts) => pts.clamp(in45, out45),
            None if self.pkt_count > 0 => {
                let span = (out45 - in45) as u64;
                let pkt = pkt.min(self.pkt_count as u64);
                in45 + (span * pkt / self.pkt_count as u64) as u32
            }
            None => in45,
        }
    }
}

/// Chapter (entry mark) of the title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub idx: u32,
    pub start: u64,
    pub duration: u64,
    /// Title byte offset.
    pub offset: u64,
    /// Index into [`TitleInfo::clips`].
    pub clip_ref: usize,
}

/// Playlist mark of the title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mark {
    pub idx: u32,
    pub mark_type: u8,
    pub start: u64,
    pub duration: u64,
    /// Title byte offset.
    pub offset: u64,
    /// Index into [`TitleInfo::clips`].
    pub clip_ref: usize,
}

/// Navigable model of one playlist for one angle.
#[derive(Debug, Clone, Serialize)]
pub struct TitleInfo {
    pub playlist: u32,
    /// Total duration (90 kHz).
    pub duration: u64,
    pub angle_count: u8,
    /// Selected angle, 0-based.
    pub angle: u8,
    pub clips: Vec<Clip>,
    pub chapters: Vec<Chapter>,
    pub marks: Vec<Mark>,
    /// Playlist-level UO mask.
    pub uo_mask: UoMask,
}

impl TitleInfo {
    /// Size of the title in bytes.
    pub fn size(&self) -> u64 {
        self.clips.last().map(|c| c.end_offset()).unwrap_or(0)
    }

    /// Clip holding a title byte offset; offsets past the end map to the last clip.
    pub fn clip_at_offset(&self, offset: u64) -> Option<usize> {
        if self.clips.is_empty() {
            return None;
        }
        let idx = self.clips.partition_point(|c| c.end_offset() <= offset);
        Some(idx.min(self.clips.len() - 1))
    }

    /// Clip playing at a title time (90 kHz).
    pub fn clip_at_time(&self, time: u64) -> Option<usize> {
        if self.clips.is_empty() {
            return None;
        }
        let idx = self
            .clips
            .partition_point(|c| c.start_time + c.duration() <= time);
        Some(idx.min(self.clips.len() - 1))
    }

    /// Chapter containing a title byte offset, 0-based.
    pub fn chapter_at_offset(&self, offset: u64) -> Option<usize> {
        let n = self.chapters.partition_point(|c| c.offset <= offset);
        n.checked_sub(1)
    }
}

fn stream_info(entry: &StreamEntry, clip: &ClipInfo) -> StreamInfo {
    let pid = entry.source.pid();
    let aspect = clip
        .programs
        .iter()
        .flat_map(|p| p.streams.iter())
        .find(|s| s.pid == pid)
        .map(|s| s.attributes.aspect)
        .unwrap_or(0);
    let attrs = &entry.attributes;
    StreamInfo {
        coding_type: attrs.coding_type,
        format: attrs.format,
        rate: attrs.rate,
        char_code: attrs.char_code,
        lang: attrs.lang.clone(),
        pid,
        aspect,
        subpath_id: entry.source.subpath_id(),
    }
}

fn streams<'a>(entries: impl Iterator<Item = &'a StreamEntry>, clip: &ClipInfo) -> Vec<StreamInfo> {
    entries.map(|e| stream_info(e, clip)).collect()
}

fn check_pids(item: &PlayItem, clip_id: &str, clip: &ClipInfo) -> Result<()> {
    if clip.programs.is_empty() {
        return Ok(());
    }
    for entry in item.stn.entries() {
        if let StreamSource::PlayItem { pid } = entry.source {
            if !clip.has_pid(pid) {
                warn!(
                    "[Titles] Stream PID 0x{:04x} not declared by clip {}",
                    pid, clip_id
                );
                return Err(FileKind::Playlist
                    .corrupt("stream PID not present in clip", 0)
                    .into());
            }
        }
    }
    Ok(())
}

fn align_down(pkt: u32) -> u32 {
    pkt - pkt % UNIT_PACKETS
}

fn align_up(pkt: u32, limit: u32) -> u32 {
    pkt.div_ceil(UNIT_PACKETS)
        .saturating_mul(UNIT_PACKETS)
        .min(limit)
}

/// Build the title model of a playlist for `angle` (0-based).
///
/// Play items with fewer angles use their first clip. `load_clip` supplies
/// the parsed clip info of a clip id.
pub fn build_title(
    playlist_id: u32,
    playlist: &Playlist,
    angle: u8,
    mut load_clip: impl FnMut(&str) -> Result<Arc<ClipInfo>>,
) -> Result<TitleInfo> {
    let angle_count = playlist
        .play_items
        .iter()
        .map(|pi| pi.angle_count())
        .max()
        .unwrap_or(1)
        .clamp(1, u8::MAX as usize) as u8;
    let angle = if angle < angle_count { angle } else { 0 };

    let mut clips = Vec::with_capacity(playlist.play_items.len());
    let mut start_time = 0u64;
    let mut title_pkt = 0u64;

    for item in &playlist.play_items {
        let clip_ref = item
            .clips
            .get(angle as usize)
            .or_else(|| item.clips.first())
            .ok_or_else(|| SessionError::from(FileKind::Playlist.corrupt("play item without clip", 0)))?;
        let info = load_clip(&clip_ref.clip_id)?;
        check_pids(item, &clip_ref.clip_id, &info)?;

        let packets = info.clip.num_source_packets;
        let start_pkt = align_down(info.lookup_spn(item.in_time, true).min(packets));
        let end_pkt = align_up(info.lookup_spn(item.out_time, false), packets).max(start_pkt);
        let pkt_count = end_pkt - start_pkt;

        let stn = &item.stn;
        let clip = Clip {
            clip_id: clip_ref.clip_id.clone(),
            pkt_count,
            still_mode: item.still_mode,
            still_time: item.still_time,
            video_streams: streams(stn.video.iter(), &info),
            audio_streams: streams(stn.audio.iter(), &info),
            pg_streams: streams(stn.pg.iter().chain(stn.pip_pg.iter()), &info),
            ig_streams: streams(stn.ig.iter(), &info),
            sec_audio_streams: streams(stn.secondary_audio.iter().map(|e| &e.stream), &info),
            sec_video_streams: streams(stn.secondary_video.iter().map(|e| &e.stream), &info),
            start_time,
            in_time: item.in_time as u64 * 2,
            out_time: item.out_time as u64 * 2,
            start_pkt,
            end_pkt,
            title_pkt,
            uo_mask: item.uo_mask,
            is_seamless_angle: item.is_seamless_angle,
            info: info.clone(),
        };

        start_time += clip.duration();
        title_pkt += clip.span_pkts();
        clips.push(clip);
    }

    let duration = start_time;

    let mut marks = Vec::with_capacity(playlist.marks.len());
    for (idx, mark) in playlist.marks.iter().enumerate() {
        let clip_ref = mark.play_item_ref as usize;
        let clip = clips
            .get(clip_ref)
            .ok_or_else(|| SessionError::from(FileKind::Playlist.corrupt("mark references missing play item", 0)))?;
        let start = clip.start_time + (mark.time as u64 * 2).saturating_sub(clip.in_time);
        marks.push(Mark {
            idx: idx as u32,
            mark_type: mark.mark_type,
            start,
            duration: 0,
            offset: clip.offset_of_time(mark.time),
            clip_ref,
        });
    }
    for i in 0..marks.len() {
        let next = marks.get(i + 1).map(|m| m.start).unwrap_or(duration);
        marks[i].duration = next.saturating_sub(marks[i].start);
    }

    let mut chapters: Vec<Chapter> = marks
        .iter()
        .zip(&playlist.marks)
        .filter(|(_, raw)| raw.is_entry())
        .enumerate()
        .map(|(idx, (mark, _))| Chapter {
            idx: idx as u32,
            start: mark.start,
            duration: 0,
            offset: mark.offset,
            clip_ref: mark.clip_ref,
        })
        .collect();
    for i in 0..chapters.len() {
        let next = chapters.get(i + 1).map(|c| c.start).unwrap_or(duration);
        chapters[i].duration = next.saturating_sub(chapters[i].start);
    }

    debug!(
        "[Titles] Built playlist {:05}: clips={}, chapters={}, marks={}, angles={}, duration={}",
        playlist_id,
        clips.len(),
        chapters.len(),
        marks.len(),
        angle_count,
        duration
    );

    Ok(TitleInfo {
        playlist: playlist_id,
        duration,
        angle_count,
        angle,
        clips,
        chapters,
        marks,
        uo_mask: playlist.app_info.uo_mask,
    })
}

/// Entry of the title list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleSummary {
    pub playlist: u32,
    /// Duration (90 kHz).
    pub duration: u64,
    pub clip_count: usize,
    pub chapter_count: usize,
    pub angle_count: usize,
}

/// Titles found on the disc after filtering.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TitleList {
    pub titles: Vec<TitleSummary>,
    /// Index of the longest title.
    pub main_title: Option<usize>,
}

impl TitleList {
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Identity used by the duplicate-title filter.
fn playlist_signature(playlist: &Playlist) -> (Vec<(String, u32, u32)>, Vec<(u16, u32)>) {
    let items = playlist
        .play_items
        .iter()
        .map(|pi| {
            let clip = pi.clips.first().map(|c| c.clip_id.clone()).unwrap_or_default();
            (clip, pi.in_time, pi.out_time)
        })
        .collect();
    let chapters = playlist
        .marks
        .iter()
        .filter(|m| m.is_entry())
        .map(|m| (m.play_item_ref, m.time))
        .collect();
    (items, chapters)
}

fn repeats_clip(playlist: &Playlist) -> bool {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in &playlist.play_items {
        if let Some(clip) = item.clips.first() {
            let n = counts.entry(clip.clip_id.as_str()).or_default();
            *n += 1;
            if *n > 2 {
                return true;
            }
        }
    }
    false
}

/// Scan `BDMV/PLAYLIST` and build the filtered title list.
///
/// Unreadable playlists are skipped. `min_title_length` is in seconds.
pub fn scan_titles(disc: &dyn DiscAccess, flags: u8, min_title_length: u32) -> Result<TitleList> {
    let mut ids: Vec<u32> = disc
        .list_dir(meta::PLAYLIST_DIR)?
        .iter()
        .filter_map(|name| meta::playlist_id(name))
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut seen = HashSet::new();
    let mut list = TitleList::default();

    for id in ids {
        let playlist = match meta::load_playlist(disc, id) {
            Ok(p) => p,
            Err(e) => {
                warn!("[Titles] Skipping playlist {:05}: {}", id, e);
                continue;
            }
        };

        let duration = playlist.duration() * 2;
        if duration / 90_000 < min_title_length as u64 {
            debug!("[Titles] Playlist {:05} shorter than {}s", id, min_title_length);
            continue;
        }
        if flags & TITLES_FILTER_DUP_CLIP != 0 && repeats_clip(&playlist) {
            debug!("[Titles] Playlist {:05} repeats a clip", id);
            continue;
        }
        if flags & TITLES_FILTER_DUP_TITLE != 0 && !seen.insert(playlist_signature(&playlist)) {
            debug!("[Titles] Playlist {:05} duplicates an earlier one", id);
            continue;
        }

        list.titles.push(TitleSummary {
            playlist: id,
            duration,
            clip_count: playlist.play_items.len(),
            chapter_count: playlist.marks.iter().filter(|m| m.is_entry()).count(),
            angle_count: playlist
                .play_items
                .iter()
                .map(|pi| pi.angle_count())
                .max()
                .unwrap_or(1),
        });
    }

    list.main_title = list
        .titles
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|(_, t)| t.duration)
        .map(|(idx, _)| idx);

    info!(
        "[Titles] {} titles (flags=0x{:02x}, min_length={}s)",
        list.len(),
        flags,
        min_title_length
    );
    Ok(list)
}
