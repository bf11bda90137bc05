//! Playback session.
//!
//! A [`Bluray`] owns one opened disc. All session state lives behind one
//! mutex; navigation requests posted from other threads are queued on the
//! [`NavigationHandle`] and applied under that mutex before and after every
//! read and seek.
//!
//! ```text
//! Closed <- close() -- Opened --select--> TitleSelected --read--> Playing
//!                        ^                                  |    ^   |
//!                        +------------- Stop ---------------+    |   v
//!                                                     MenuActive  Still
//! ```

use std::path::Path;
use std::sync::Arc;

use bdnav_decrypt::{DecryptCapability, PluginRegistry, UnitPipe, UnitStatus, ALIGNED_UNIT_SIZE};
use bdnav_formats::{DiscIndex, StillMode, UoMask, UserOperation};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::disc::{read_full, DirectoryDisc, DiscAccess, DiscFile};
use crate::error::{Result, SessionError};
use crate::event::{ErrorKind, Event, EventQueue, EventType};
use crate::info::DiscInfo;
use crate::meta;
use crate::nav::{key_operation, NavRequest, NavigationEngine, NavigationHandle, StreamKind};
use crate::title::{build_title, scan_titles, TitleInfo, TitleList};
use crate::uo::UoMaskTable;

/// Playback paused.
pub const RATE_PAUSED: u32 = 0;
/// Normal speed playback.
pub const RATE_NORMAL: u32 = 90_000;

/// Index title number of the top menu.
pub const TITLE_TOP_MENU: u32 = 0;
/// Index title number of the first play object.
pub const TITLE_FIRST_PLAY: u32 = 0xFFFF;

const UNIT: u64 = ALIGNED_UNIT_SIZE as u64;

/// Session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    /// Disc opened, no title selected.
    Opened,
    /// Title selected, nothing read yet.
    TitleSelected,
    Playing,
    /// Waiting in a still; reads return 0.
    Still,
    /// Interactive menu shown over the title.
    MenuActive,
}

/// Where the session is in the current title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Index in the title list, when selected by title.
    pub title: Option<usize>,
    pub playlist: u32,
    /// Current play item.
    pub clip: usize,
    /// Current angle, 0-based.
    pub angle: u8,
    /// Last requested byte offset.
    pub raw: u64,
    /// Byte offset reads continue from.
    pub aligned: u64,
    /// Time (90 kHz) at the aligned offset.
    pub time: u64,
}

struct OpenStream {
    clip_id: String,
    file: Box<dyn DiscFile>,
}

struct CachedUnit {
    clip_id: String,
    start: u64,
    data: Vec<u8>,
}

/// Geometry of the current clip, copied out of the title.
struct ClipSpan {
    clip_id: String,
    still: Option<u32>,
    title_start: u64,
    title_end: u64,
    file_start: u64,
    file_end: u64,
    last: bool,
}

struct Session {
    state: SessionState,
    disc: Arc<dyn DiscAccess>,
    config: SessionConfig,
    index: DiscIndex,
    info: DiscInfo,
    pipe: UnitPipe,
    titles: Option<TitleList>,
    title: Option<TitleInfo>,
    title_idx: Option<usize>,
    index_title: Option<u32>,
    uo: UoMaskTable,
    events: EventQueue,
    pos: u64,
    raw_pos: u64,
    clip_idx: usize,
    next_mark: usize,
    next_chapter: usize,
    end_posted: bool,
    still_done: Option<usize>,
    popup_visible: bool,
    rate: u32,
    stream: Option<OpenStream>,
    unit: Option<CachedUnit>,
    engine: Option<Box<dyn NavigationEngine>>,
}

/// Clips start on unit boundaries, so aligning in the title aligns in the clip.
fn align_down(offset: u64) -> u64 {
    offset - offset % UNIT
}

impl Session {
    fn require_open(&self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(SessionError::InvalidState("session is closed".into()));
        }
        Ok(())
    }

    fn require_title(&self) -> Result<&TitleInfo> {
        self.require_open()?;
        self.title
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("no title selected".into()))
    }

    fn check_uo(&self, op: UserOperation) -> Result<()> {
        if self.uo.is_allowed(op) {
            Ok(())
        } else {
            debug!("[Session] {} rejected by UO mask {:?}", op, self.uo.combined());
            Err(SessionError::Disallowed(op))
        }
    }

    fn post(&mut self, event: EventType, param: u32) {
        self.events.push(Event::new(event, param));
    }

    fn post_uo_mask(&mut self) {
        let param = self.uo.combined().event_param();
        self.post(EventType::UoMaskChanged, param);
    }

    // Titles

    fn load_title(&self, playlist: u32, angle: u8) -> Result<TitleInfo> {
        let disc = self.disc.clone();
        let mpls = meta::load_playlist(disc.as_ref(), playlist)?;
        build_title(playlist, &mpls, angle, |clip_id| {
            meta::load_clip_info(disc.as_ref(), clip_id)
        })
    }

    fn get_titles(&mut self, flags: u8, min_title_length: u32) -> Result<usize> {
        self.require_open()?;
        let list = scan_titles(self.disc.as_ref(), flags, min_title_length)?;
        let count = list.len();
        self.titles = Some(list);
        Ok(count)
    }

    fn title_list(&mut self) -> Result<&TitleList> {
        if self.titles.is_none() {
            let (flags, min) = (self.config.title_flags, self.config.min_title_length);
            self.get_titles(flags, min)?;
        }
        self.titles
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("title list unavailable".into()))
    }

    fn title_playlist(&mut self, idx: usize) -> Result<u32> {
        let list = self.title_list()?;
        list.titles
            .get(idx)
            .map(|t| t.playlist)
            .ok_or_else(|| {
                SessionError::InvalidSelection(format!(
                    "title {} out of range (have {})",
                    idx,
                    list.len()
                ))
            })
    }

    fn select_playlist(&mut self, playlist: u32, title_idx: Option<usize>) -> Result<()> {
        self.require_open()?;
        let reselect = self.state == SessionState::TitleSelected
            && self.pos == 0
            && self.title_idx == title_idx
            && self.title.as_ref().is_some_and(|t| t.playlist == playlist);
        if reselect {
            debug!("[Session] Playlist {:05} already selected", playlist);
            return Ok(());
        }
        let title = self.load_title(playlist, 0)?;

        info!(
            "[Session] Selected playlist {:05}: {} clips, {} chapters, {} bytes",
            playlist,
            title.clips.len(),
            title.chapters.len(),
            title.size()
        );

        self.events.clear_points();
        let first_mask = title.clips.first().map(|c| c.uo_mask).unwrap_or_default();
        let mask_changed = self.uo.select_playlist(title.uo_mask, first_mask);

        self.title = Some(title);
        self.title_idx = title_idx;
        self.pos = 0;
        self.raw_pos = 0;
        self.clip_idx = 0;
        self.next_mark = 0;
        self.next_chapter = 0;
        self.end_posted = false;
        self.still_done = None;
        self.rate = RATE_NORMAL;
        self.stream = None;
        self.unit = None;
        self.state = SessionState::TitleSelected;

        if let Some(idx) = title_idx {
            self.post(EventType::Title, idx as u32 + 1);
        }
        self.post(EventType::Playlist, playlist);
        if mask_changed {
            self.post_uo_mask();
        }
        Ok(())
    }

    fn select_title(&mut self, idx: usize) -> Result<()> {
        self.require_open()?;
        let playlist = self.title_playlist(idx)?;
        self.select_playlist(playlist, Some(idx))
    }

    fn stop(&mut self) {
        self.title = None;
        self.title_idx = None;
        self.stream = None;
        self.unit = None;
        self.events.clear_points();
        if self.uo.reset() {
            self.post_uo_mask();
        }
        self.state = SessionState::Opened;
        self.post(EventType::PlaylistStop, 0);
    }

    // Position

    fn enter_clip(&mut self, idx: usize) {
        if idx == self.clip_idx {
            return;
        }
        let Some(mask) = self
            .title
            .as_ref()
            .and_then(|t| t.clips.get(idx))
            .map(|c| c.uo_mask)
        else {
            return;
        };
        debug!("[Session] Entering play item {}", idx);
        self.clip_idx = idx;
        self.still_done = None;
        self.post(EventType::PlayItem, idx as u32);
        if self.uo.set_play_item(mask) {
            self.post_uo_mask();
        }
    }

    /// Post chapter and mark events for points the read position has passed.
    fn update_points(&mut self) {
        let Some(title) = self.title.as_ref() else {
            return;
        };
        while let Some(mark) = title.marks.get(self.next_mark) {
            if mark.offset >= self.pos {
                break;
            }
            self.events.push(Event::new(EventType::PlayMark, mark.idx));
            self.next_mark += 1;
        }
        while let Some(chapter) = title.chapters.get(self.next_chapter) {
            if chapter.offset >= self.pos {
                break;
            }
            self.events.push(Event::new(EventType::Chapter, chapter.idx + 1));
            self.next_chapter += 1;
        }
    }

    fn reset_points(&mut self) {
        let pos = self.pos;
        if let Some(title) = self.title.as_ref() {
            self.next_mark = title.marks.partition_point(|m| m.offset < pos);
            self.next_chapter = title.chapters.partition_point(|c| c.offset < pos);
        }
    }

    fn seek_to(&mut self, target: u64) -> Result<u64> {
        let active = self.pipe.is_active();
        let (clip_idx, raw, aligned, time45) = {
            let title = self.require_title()?;
            let raw = target.min(title.size());
            let clip_idx = title.clip_at_offset(raw).unwrap_or(0);
            let aligned = if active {
                align_down(raw)
            } else {
                raw
            };
            let time45 = title
                .clips
                .get(clip_idx)
                .map(|c| c.time_of_offset(aligned))
                .unwrap_or(0);
            (clip_idx, raw, aligned, time45)
        };

        self.enter_clip(clip_idx);
        self.pos = aligned;
        self.raw_pos = raw;
        self.end_posted = false;
        self.still_done = None;
        self.reset_points();
        if self.state == SessionState::Still {
            self.state = SessionState::Playing;
        }

        debug!(
            "[Session] Seek to {} (aligned {}), play item {}",
            raw, aligned, clip_idx
        );
        self.post(EventType::Seek, time45);
        Ok(aligned)
    }

    fn seek_time(&mut self, tick: u64) -> Result<u64> {
        let offset = {
            let title = self.require_title()?;
            if tick > title.duration {
                return Err(SessionError::InvalidSelection(format!(
                    "time {} beyond title duration {}",
                    tick, title.duration
                )));
            }
            match title.clip_at_time(tick).and_then(|idx| title.clips.get(idx)) {
                Some(clip) => {
                    let clip_time = (clip.in_time + tick.saturating_sub(clip.start_time))
                        .min(clip.out_time);
                    clip.offset_of_time((clip_time / 2) as u32)
                }
                None => 0,
            }
        };
        self.seek_to(offset)
    }

    fn chapter_pos(&self, chapter: usize) -> Result<u64> {
        let title = self.require_title()?;
        title
            .chapters
            .get(chapter)
            .map(|c| c.offset)
            .ok_or_else(|| SessionError::InvalidSelection(format!("no chapter {}", chapter)))
    }

    fn seek_chapter(&mut self, chapter: usize) -> Result<u64> {
        let offset = self.chapter_pos(chapter)?;
        self.seek_to(offset)
    }

    fn seek_mark(&mut self, mark: usize) -> Result<u64> {
        let offset = {
            let title = self.require_title()?;
            title
                .marks
                .get(mark)
                .map(|m| m.offset)
                .ok_or_else(|| SessionError::InvalidSelection(format!("no mark {}", mark)))?
        };
        self.seek_to(offset)
    }

    fn seek_playitem(&mut self, item: usize) -> Result<u64> {
        let offset = {
            let title = self.require_title()?;
            title
                .clips
                .get(item)
                .map(|c| c.start_offset())
                .ok_or_else(|| SessionError::InvalidSelection(format!("no play item {}", item)))?
        };
        self.seek_to(offset)
    }

    fn tell_time(&self) -> u64 {
        let Some(clip) = self.title.as_ref().and_then(|t| t.clips.get(self.clip_idx)) else {
            return 0;
        };
        let t45 = clip.time_of_offset(self.pos) as u64;
        clip.start_time + (t45 * 2).saturating_sub(clip.in_time)
    }

    fn position(&self) -> PlaybackPosition {
        let (playlist, angle) = self
            .title
            .as_ref()
            .map(|t| (t.playlist, t.angle))
            .unwrap_or_default();
        PlaybackPosition {
            title: self.title_idx,
            playlist,
            clip: self.clip_idx,
            angle,
            raw: self.raw_pos,
            aligned: self.pos,
            time: self.tell_time(),
        }
    }

    fn current_chapter(&self) -> Option<usize> {
        self.title.as_ref()?.chapter_at_offset(self.pos)
    }

    fn select_angle(&mut self, angle: u8) -> Result<()> {
        let (playlist, current) = {
            let title = self.require_title()?;
            if angle >= title.angle_count {
                return Err(SessionError::InvalidSelection(format!(
                    "angle {} out of range (have {})",
                    angle, title.angle_count
                )));
            }
            (title.playlist, title.angle)
        };
        if angle == current {
            return Ok(());
        }

        let new = self.load_title(playlist, angle)?;
        let (seamless, new_pos, time45) = {
            let Some(old) = self.title.as_ref() else {
                return Err(SessionError::InvalidState("no title selected".into()));
            };
            let seamless = old.clips.len() == new.clips.len()
                && old
                    .clips
                    .iter()
                    .zip(&new.clips)
                    .all(|(a, b)| a.title_pkt == b.title_pkt && a.pkt_count == b.pkt_count);
            let time45 = old
                .clips
                .get(self.clip_idx)
                .map(|c| c.time_of_offset(self.pos))
                .unwrap_or(0);
            let new_pos = if seamless {
                self.pos
            } else {
                let offset = new
                    .clips
                    .get(self.clip_idx)
                    .map(|c| c.offset_of_time(time45))
                    .unwrap_or(0);
                if self.pipe.is_active() {
                    align_down(offset)
                } else {
                    offset
                }
            };
            (seamless, new_pos, time45)
        };

        info!(
            "[Session] Angle {} -> {} ({})",
            current + 1,
            angle + 1,
            if seamless { "seamless" } else { "realigned" }
        );
        self.title = Some(new);
        self.stream = None;
        self.unit = None;
        if !seamless {
            self.pos = new_pos;
            self.raw_pos = new_pos;
            self.reset_points();
            self.post(EventType::Seek, time45);
        }
        self.post(EventType::Angle, angle as u32 + 1);
        Ok(())
    }

    // Reading

    fn current_span(&self) -> Option<ClipSpan> {
        let title = self.title.as_ref()?;
        let clip = title.clips.get(self.clip_idx)?;
        let still = match clip.still_mode {
            StillMode::None => None,
            StillMode::Timed => Some(clip.still_time as u32),
            StillMode::Infinite => Some(0),
        };
        Some(ClipSpan {
            clip_id: clip.clip_id.clone(),
            still,
            title_start: clip.start_offset(),
            title_end: clip.end_offset(),
            file_start: clip.start_pkt as u64 * bdnav_formats::SOURCE_PACKET_SIZE,
            file_end: clip.end_pkt as u64 * bdnav_formats::SOURCE_PACKET_SIZE,
            last: self.clip_idx + 1 >= title.clips.len(),
        })
    }

    fn post_end_of_title(&mut self) {
        if !self.end_posted {
            info!("[Session] End of title");
            self.end_posted = true;
            self.post(EventType::EndOfTitle, 0);
        }
    }

    /// Make the unit at `start` of the clip file current, decrypting it.
    fn load_unit(&mut self, clip_id: &str, start: u64, len: usize) -> Result<UnitStatus> {
        if let Some(unit) = &self.unit {
            if unit.clip_id == clip_id && unit.start == start {
                return Ok(UnitStatus::Clear);
            }
        }
        self.unit = None;

        let reopen = self.stream.as_ref().map_or(true, |s| s.clip_id != clip_id);
        if reopen {
            let path = meta::stream_path(clip_id);
            debug!("[Session] Opening {}", path);
            let file = self.disc.open_file(&path)?;
            self.stream = Some(OpenStream {
                clip_id: clip_id.to_string(),
                file,
            });
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(SessionError::InvalidState("stream not open".into()));
        };

        let mut data = vec![0u8; len];
        let n = read_full(stream.file.as_mut(), start, &mut data)?;
        data.truncate(n);

        let status = self.pipe.process_unit(&mut data);
        if matches!(status, UnitStatus::Clear | UnitStatus::Decrypted) {
            self.unit = Some(CachedUnit {
                clip_id: clip_id.to_string(),
                start,
                data,
            });
        }
        Ok(status)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.require_title()?;
        match self.state {
            SessionState::Still => return Ok(0),
            SessionState::TitleSelected => self.state = SessionState::Playing,
            _ => {}
        }

        let mut done = 0;
        while done < buf.len() {
            let Some(span) = self.current_span() else {
                self.post_end_of_title();
                break;
            };

            if self.pos >= span.title_end {
                if let Some(seconds) = span.still {
                    if self.still_done != Some(self.clip_idx) {
                        info!(
                            "[Session] Still at end of play item {} ({}s)",
                            self.clip_idx, seconds
                        );
                        self.post(EventType::StillTime, seconds);
                        self.state = SessionState::Still;
                        break;
                    }
                }
                if span.last {
                    self.pos = span.title_end;
                    self.post_end_of_title();
                    break;
                }
                self.enter_clip(self.clip_idx + 1);
                continue;
            }

            let file_off = span.file_start + (self.pos - span.title_start);
            if file_off >= span.file_end {
                // Padding up to the next unit boundary carries no data.
                self.pos = span.title_end;
                self.raw_pos = self.pos;
                continue;
            }
            let unit_start = file_off - file_off % UNIT;
            let unit_len = (span.file_end - unit_start).min(UNIT) as usize;
            let unit_title_start = span.title_start + (unit_start - span.file_start);

            match self.load_unit(&span.clip_id, unit_start, unit_len) {
                Ok(UnitStatus::Clear) | Ok(UnitStatus::Decrypted) => {
                    let skip = (file_off - unit_start) as usize;
                    let available = self
                        .unit
                        .as_ref()
                        .map_or(0, |u| u.data.len().saturating_sub(skip));
                    let n = available.min(buf.len() - done);
                    if n == 0 {
                        warn!(
                            "[Session] Clip {} ends before its declared packet count",
                            span.clip_id
                        );
                        self.pos = span.title_end;
                        continue;
                    }
                    if let Some(unit) = &self.unit {
                        buf[done..done + n].copy_from_slice(&unit.data[skip..skip + n]);
                    }
                    done += n;
                    self.pos += n as u64;
                    self.raw_pos = self.pos;
                    self.update_points();
                }
                Ok(UnitStatus::Failed) => {
                    warn!(
                        "[Session] Skipping undecryptable unit at byte {}",
                        unit_title_start
                    );
                    self.post(EventType::ReadError, 0);
                    self.pos = unit_title_start + unit_len as u64;
                    self.raw_pos = self.pos;
                    self.update_points();
                    if done == 0 {
                        return Err(SessionError::UnitDecryptFailed {
                            unit: unit_title_start,
                        });
                    }
                    break;
                }
                Ok(UnitStatus::Encrypted) => {
                    warn!("[Session] Encrypted unit at byte {} and no engine", unit_title_start);
                    self.post(EventType::Encrypted, ErrorKind::Aacs as u32);
                    if done == 0 {
                        return Err(SessionError::Encrypted);
                    }
                    break;
                }
                Err(e) => {
                    warn!("[Session] Read of clip {} failed: {}", span.clip_id, e);
                    if done == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(done)
    }

    fn read_skip_still(&mut self) -> Result<()> {
        self.require_title()?;
        if self.state == SessionState::Still {
            debug!("[Session] Leaving still of play item {}", self.clip_idx);
            self.still_done = Some(self.clip_idx);
            self.state = SessionState::Playing;
        }
        Ok(())
    }

    // Control

    fn set_rate(&mut self, rate: u32) -> Result<()> {
        self.require_title()?;
        let op = match rate {
            RATE_PAUSED => UserOperation::PauseOn,
            RATE_NORMAL => UserOperation::PauseOff,
            other => {
                return Err(SessionError::InvalidSelection(format!("unsupported rate {}", other)))
            }
        };
        self.check_uo(op)?;
        self.rate = rate;
        Ok(())
    }

    fn select_stream(&mut self, kind: StreamKind, number: u32, enable: bool) -> Result<()> {
        let count = {
            let title = self.require_title()?;
            let clip = title.clips.get(self.clip_idx).ok_or_else(|| {
                SessionError::InvalidState("title has no play items".into())
            })?;
            match kind {
                StreamKind::Audio => clip.audio_streams.len(),
                StreamKind::PgTextst => clip.pg_streams.len(),
                StreamKind::Ig => clip.ig_streams.len(),
                StreamKind::SecondaryAudio => clip.sec_audio_streams.len(),
                StreamKind::SecondaryVideo => clip.sec_video_streams.len(),
            }
        };
        self.check_uo(kind.operation())?;
        if number == 0 || number as usize > count {
            return Err(SessionError::InvalidSelection(format!(
                "{:?} stream {} out of range (have {})",
                kind, number, count
            )));
        }
        self.post(kind.stream_event(), number);
        if let Some(event) = kind.enable_event() {
            self.post(event, enable as u32);
        }
        Ok(())
    }

    fn set_program_mask(&mut self, mask: UoMask) {
        if self.uo.set_program(mask) {
            self.post_uo_mask();
        }
    }

    // Navigation

    fn play_title(&mut self, title: u32) -> Result<()> {
        let valid = match title {
            TITLE_TOP_MENU => self.index.top_menu.is_some(),
            TITLE_FIRST_PLAY => self.index.first_play.is_some(),
            n => self
                .index
                .titles
                .get(n as usize - 1)
                .is_some_and(|t| t.accessible()),
        };
        if !valid {
            return Err(SessionError::InvalidSelection(format!(
                "title {} is not playable",
                title
            )));
        }
        info!("[Session] Playing index title {}", title);
        self.index_title = Some(title);
        self.post(EventType::Title, title);
        Ok(())
    }

    /// Host request to start an index title, gated by the UO mask.
    fn start_title(&mut self, title: u32) -> Result<()> {
        self.require_open()?;
        let op = match title {
            TITLE_FIRST_PLAY => UserOperation::PlayFirstPlay,
            TITLE_TOP_MENU => UserOperation::MenuCall,
            _ => UserOperation::TitleSearch,
        };
        self.check_uo(op)?;
        self.play_title(title)?;
        let requests = match self.engine.as_deref_mut() {
            Some(engine) => engine.title_started(title),
            None => Vec::new(),
        };
        for request in requests {
            self.apply_logged(request);
        }
        Ok(())
    }

    fn apply_request(&mut self, request: NavRequest) -> Result<()> {
        self.require_open()?;
        match request {
            NavRequest::PlayTitle(title) => self.play_title(title),
            NavRequest::PlayPlaylist {
                playlist,
                play_item,
                mark,
            } => {
                self.select_playlist(playlist, None)?;
                match mark {
                    Some(mark) => self.seek_mark(mark as usize).map(|_| ()),
                    None if play_item > 0 => self.seek_playitem(play_item as usize).map(|_| ()),
                    None => Ok(()),
                }
            }
            NavRequest::SelectStream {
                kind,
                number,
                enable,
            } => self.select_stream(kind, number, enable),
            NavRequest::SetUoMask(mask) => {
                self.set_program_mask(mask);
                Ok(())
            }
            NavRequest::Stop => {
                self.stop();
                Ok(())
            }
            NavRequest::Popup(visible) => {
                self.popup_visible = visible;
                self.post(EventType::Popup, visible as u32);
                Ok(())
            }
            NavRequest::Menu(shown) => {
                self.post(EventType::Menu, shown as u32);
                if shown {
                    self.state = SessionState::MenuActive;
                } else if self.state == SessionState::MenuActive {
                    self.state = if self.title.is_some() {
                        SessionState::Playing
                    } else {
                        SessionState::Opened
                    };
                }
                Ok(())
            }
            NavRequest::Still(on) => {
                self.post(EventType::Still, on as u32);
                if on && self.title.is_some() {
                    self.state = SessionState::Still;
                } else if !on && self.state == SessionState::Still {
                    self.still_done = Some(self.clip_idx);
                    self.state = SessionState::Playing;
                }
                Ok(())
            }
        }
    }

    fn apply_logged(&mut self, request: NavRequest) {
        debug!("[Session] Applying {:?}", request);
        if let Err(e) = self.apply_request(request) {
            warn!("[Session] Navigation request failed: {}", e);
            self.post(EventType::Error, ErrorKind::Hdmv as u32);
        }
    }

    fn apply_requests(&mut self, handle: &NavigationHandle) {
        let requests = handle.drain();
        if self.state == SessionState::Closed {
            if !requests.is_empty() {
                debug!("[Session] Dropping {} requests for closed session", requests.len());
            }
            return;
        }
        for request in requests {
            self.apply_logged(request);
        }
    }

    fn forward_input(
        &mut self,
        op: Option<UserOperation>,
        call: impl FnOnce(&mut dyn NavigationEngine) -> Vec<NavRequest>,
    ) -> Result<()> {
        self.require_open()?;
        if let Some(op) = op {
            self.check_uo(op)?;
        }
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or(SessionError::NoNavigationEngine)?;
        let requests = call(engine);
        for request in requests {
            self.apply_logged(request);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.title = None;
        self.titles = None;
        self.stream = None;
        self.unit = None;
        self.engine = None;
        self.events.clear();
        self.pipe = UnitPipe::new(DecryptCapability::Absent);
        self.state = SessionState::Closed;
    }
}

/// An opened disc.
pub struct Bluray {
    session: Mutex<Session>,
    nav: NavigationHandle,
}

impl Bluray {
    /// Open a disc: parse its index and resolve decryption.
    pub fn open(
        disc: Arc<dyn DiscAccess>,
        config: &SessionConfig,
        registry: &PluginRegistry,
    ) -> Result<Bluray> {
        let index = meta::load_index(disc.as_ref())?;

        let aacs_detected = disc.exists(meta::AACS_UNIT_KEY_PATH);
        let capability = if aacs_detected {
            let device = disc.root_path().unwrap_or_else(|| Path::new(""));
            registry.resolve(device, config.decrypt.keyfile.as_deref())
        } else {
            debug!("[Session] No AACS directory, decryption not needed");
            DecryptCapability::Absent
        };

        let info = DiscInfo::new(&index, aacs_detected, &capability);
        info!(
            "[Session] Opened disc: {} titles ({} HDMV, {} BD-J), AACS detected={} handled={}",
            info.num_titles,
            info.num_hdmv_titles,
            info.num_bdj_titles,
            info.aacs_detected,
            info.aacs_handled
        );
        if let Some(code) = capability.error_code() {
            warn!("[Session] Decryption unavailable: {}", code);
        }

        let session = Session {
            state: SessionState::Opened,
            disc,
            config: config.clone(),
            index,
            info,
            pipe: UnitPipe::new(capability),
            titles: None,
            title: None,
            title_idx: None,
            index_title: None,
            uo: UoMaskTable::default(),
            events: EventQueue::new(config.event_capacity),
            pos: 0,
            raw_pos: 0,
            clip_idx: 0,
            next_mark: 0,
            next_chapter: 0,
            end_posted: false,
            still_done: None,
            popup_visible: false,
            rate: RATE_NORMAL,
            stream: None,
            unit: None,
            engine: None,
        };

        Ok(Bluray {
            session: Mutex::new(session),
            nav: NavigationHandle::new(),
        })
    }

    /// Open a BDMV folder, resolving decryption from `config`.
    pub fn open_dir(root: impl AsRef<Path>, config: &SessionConfig) -> Result<Bluray> {
        let disc = Arc::new(DirectoryDisc::new(root.as_ref()));
        Self::open(disc, config, &config.decrypt.registry())
    }

    /// Release the title, the decryption context and pending events.
    pub fn close(&self) {
        let mut s = self.session.lock();
        if s.state != SessionState::Closed {
            info!("[Session] Closing");
        }
        s.close();
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    pub fn disc_info(&self) -> DiscInfo {
        self.session.lock().info.clone()
    }

    pub fn index(&self) -> DiscIndex {
        self.session.lock().index.clone()
    }

    /// Effective UO mask.
    pub fn uo_mask(&self) -> UoMask {
        self.session.lock().uo.combined()
    }

    pub fn set_navigation_engine(&self, engine: Box<dyn NavigationEngine>) {
        info!("[Session] Navigation engine {} attached", engine.name());
        self.session.lock().engine = Some(engine);
    }

    /// Handle for posting navigation requests from other threads.
    pub fn navigation_handle(&self) -> NavigationHandle {
        self.nav.clone()
    }

    // Titles

    /// Scan playlists into the title list; returns the number of titles.
    pub fn get_titles(&self, flags: u8, min_title_length: u32) -> Result<usize> {
        self.session.lock().get_titles(flags, min_title_length)
    }

    pub fn title_list(&self) -> Option<TitleList> {
        self.session.lock().titles.clone()
    }

    /// Index of the longest title of the list.
    pub fn get_main_title(&self) -> Option<usize> {
        self.session.lock().titles.as_ref()?.main_title
    }

    pub fn get_title_info(&self, idx: usize, angle: u8) -> Result<TitleInfo> {
        let mut s = self.session.lock();
        s.require_open()?;
        let playlist = s.title_playlist(idx)?;
        s.load_title(playlist, angle)
    }

    pub fn get_playlist_info(&self, playlist: u32, angle: u8) -> Result<TitleInfo> {
        let s = self.session.lock();
        s.require_open()?;
        s.load_title(playlist, angle)
    }

    pub fn select_title(&self, idx: usize) -> Result<()> {
        self.session.lock().select_title(idx)
    }

    pub fn select_playlist(&self, playlist: u32) -> Result<()> {
        self.session.lock().select_playlist(playlist, None)
    }

    /// Switch angle (0-based).
    pub fn select_angle(&self, angle: u8) -> Result<()> {
        self.session.lock().select_angle(angle)
    }

    /// Select a stream by 1-based number.
    pub fn select_stream(&self, kind: StreamKind, number: u32, enable: bool) -> Result<()> {
        self.session.lock().select_stream(kind, number, enable)
    }

    // Queries

    pub fn get_current_title(&self) -> Option<usize> {
        self.session.lock().title_idx
    }

    /// Title number last started through the index.
    pub fn get_current_index_title(&self) -> Option<u32> {
        self.session.lock().index_title
    }

    /// Current chapter, 0-based.
    pub fn get_current_chapter(&self) -> Option<usize> {
        self.session.lock().current_chapter()
    }

    pub fn get_current_angle(&self) -> Option<u8> {
        self.session.lock().title.as_ref().map(|t| t.angle)
    }

    pub fn get_title_size(&self) -> Option<u64> {
        self.session.lock().title.as_ref().map(|t| t.size())
    }

    pub fn tell(&self) -> u64 {
        self.session.lock().pos
    }

    /// Current time in 90 kHz ticks.
    pub fn tell_time(&self) -> u64 {
        self.session.lock().tell_time()
    }

    pub fn position(&self) -> PlaybackPosition {
        self.session.lock().position()
    }

    /// Byte offset of a chapter (0-based).
    pub fn chapter_pos(&self, chapter: usize) -> Result<u64> {
        self.session.lock().chapter_pos(chapter)
    }

    pub fn rate(&self) -> u32 {
        self.session.lock().rate
    }

    // Navigation

    /// Start playback from the disc's first play object.
    pub fn play(&self) -> Result<()> {
        self.with_requests(|s| s.start_title(TITLE_FIRST_PLAY))
    }

    /// Start index title `title`: 1..N, [`TITLE_TOP_MENU`] or [`TITLE_FIRST_PLAY`].
    pub fn play_title(&self, title: u32) -> Result<()> {
        self.with_requests(|s| s.start_title(title))
    }

    // Seeking

    fn with_requests<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut s = self.session.lock();
        s.apply_requests(&self.nav);
        let result = f(&mut s);
        s.apply_requests(&self.nav);
        result
    }

    /// Seek to a byte offset; returns the offset reads continue from.
    pub fn seek(&self, pos: u64) -> Result<u64> {
        self.with_requests(|s| s.seek_to(pos))
    }

    /// Seek to a time in 90 kHz ticks.
    pub fn seek_time(&self, tick: u64) -> Result<u64> {
        self.with_requests(|s| s.seek_time(tick))
    }

    pub fn seek_chapter(&self, chapter: usize) -> Result<u64> {
        self.with_requests(|s| s.seek_chapter(chapter))
    }

    pub fn seek_mark(&self, mark: usize) -> Result<u64> {
        self.with_requests(|s| s.seek_mark(mark))
    }

    pub fn seek_playitem(&self, item: usize) -> Result<u64> {
        self.with_requests(|s| s.seek_playitem(item))
    }

    // Reading

    /// Read title data; 0 at the end of the title or during a still.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_requests(|s| s.read(buf))
    }

    /// Read and return the next event; pending events are returned before data.
    pub fn read_ext(&self, buf: &mut [u8]) -> Result<(usize, Option<Event>)> {
        self.with_requests(|s| {
            if let Some(event) = s.events.pop() {
                return Ok((0, Some(event)));
            }
            let n = s.read(buf)?;
            Ok((n, s.events.pop()))
        })
    }

    /// Continue after a still.
    pub fn read_skip_still(&self) -> Result<()> {
        self.session.lock().read_skip_still()
    }

    pub fn get_event(&self) -> Option<Event> {
        self.session.lock().events.pop()
    }

    // Control

    /// Set the playback rate: [`RATE_PAUSED`] or [`RATE_NORMAL`].
    pub fn set_rate(&self, rate: u32) -> Result<()> {
        self.session.lock().set_rate(rate)
    }

    pub fn user_input(&self, pts: i64, key: u32) -> Result<()> {
        let mut s = self.session.lock();
        let op = key_operation(key, s.popup_visible);
        s.forward_input(op, |engine| engine.user_input(pts, key))
    }

    pub fn mouse_select(&self, pts: i64, x: u16, y: u16) -> Result<()> {
        self.session
            .lock()
            .forward_input(Some(UserOperation::Select), |engine| {
                engine.mouse_select(pts, x, y)
            })
    }

    pub fn menu_call(&self, pts: i64) -> Result<()> {
        self.session
            .lock()
            .forward_input(Some(UserOperation::MenuCall), |engine| engine.menu_call(pts))
    }
}

impl std::fmt::Debug for Bluray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.session.lock();
        f.debug_struct("Bluray")
            .field("state", &s.state)
            .field("playlist", &s.title.as_ref().map(|t| t.playlist))
            .field("pos", &s.pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::keys;
    use crate::testdisc::{self, ClipSpec, TestDisc, BAD_UNIT_MARK, UNIT_BYTES, UNIT_TIME};
    use crate::title::{TITLES_ALL, TITLES_FILTER_DUP_TITLE};
    use bdnav_decrypt::{DecryptEngine, DecryptError, DecryptPlugin};

    /// Clears the copy-permission bits; refuses units marked bad.
    struct ClearEngine;

    impl DecryptEngine for ClearEngine {
        fn name(&self) -> &str {
            "clear"
        }

        fn decrypt_unit(&mut self, unit: &mut [u8]) -> bool {
            if unit[1] == BAD_UNIT_MARK {
                return false;
            }
            for packet in unit.chunks_mut(192) {
                packet[0] &= 0x3F;
            }
            true
        }
    }

    struct ClearPlugin;

    impl DecryptPlugin for ClearPlugin {
        fn name(&self) -> &str {
            "clear"
        }

        fn open(&self, _: &Path, _: Option<&Path>) -> std::result::Result<Box<dyn DecryptEngine>, DecryptError> {
            Ok(Box::new(ClearEngine))
        }
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::empty();
        registry.register(Box::new(ClearPlugin));
        registry
    }

    fn open(disc: TestDisc) -> Bluray {
        Bluray::open(Arc::new(disc.disc), &SessionConfig::default(), &PluginRegistry::empty()).unwrap()
    }

    fn open_protected(mut disc: TestDisc, registry: &PluginRegistry) -> Bluray {
        disc.disc.insert(meta::AACS_UNIT_KEY_PATH, vec![0u8; 16]);
        Bluray::open(Arc::new(disc.disc), &SessionConfig::default(), registry).unwrap()
    }

    fn drain(bd: &Bluray) -> Vec<Event> {
        std::iter::from_fn(|| bd.get_event()).collect()
    }

    fn count(events: &[Event], event: EventType) -> usize {
        events.iter().filter(|e| e.event == event).count()
    }

    fn params(events: &[Event], event: EventType) -> Vec<u32> {
        events.iter().filter(|e| e.event == event).map(|e| e.param).collect()
    }

    #[test]
    fn test_open_reports_disc_info() {
        let bd = open(testdisc::standard());
        assert_eq!(bd.state(), SessionState::Opened);
        let info = bd.disc_info();
        assert!(info.bluray_detected);
        assert_eq!(info.num_titles, 3);
        assert!(!info.aacs_detected);
        assert!(bd.read(&mut [0u8; 16]).is_err());
    }

    #[test]
    fn test_open_without_index_fails() {
        let mut disc = testdisc::standard();
        disc.disc.remove(meta::INDEX_PATH);
        let result = Bluray::open(Arc::new(disc.disc), &SessionConfig::default(), &PluginRegistry::empty());
        assert!(matches!(result, Err(SessionError::Io(_))));
    }

    #[test]
    fn test_reselect_at_start_posts_nothing() {
        let bd = open(testdisc::standard());
        assert_eq!(bd.get_titles(TITLES_FILTER_DUP_TITLE, 0).unwrap(), 5);
        bd.select_title(0).unwrap();
        let events = drain(&bd);
        assert_eq!(params(&events, EventType::Title), vec![1]);
        assert_eq!(params(&events, EventType::Playlist), vec![1]);

        bd.select_title(0).unwrap();
        assert!(drain(&bd).is_empty());
        assert_eq!(bd.state(), SessionState::TitleSelected);
        assert_eq!(bd.get_current_title(), Some(0));

        // Once playback has moved, reselecting rewinds and reports again.
        bd.read(&mut [0u8; 192]).unwrap();
        drain(&bd);
        bd.select_title(0).unwrap();
        assert_eq!(params(&drain(&bd), EventType::Title), vec![1]);
        assert_eq!(bd.tell(), 0);
    }

    #[test]
    fn test_failed_selection_keeps_state() {
        let mut disc = testdisc::standard();
        disc.disc.insert(&meta::playlist_path(50), b"MPLS0200 broken".to_vec());
        let bd = open(disc);
        bd.select_playlist(1).unwrap();
        bd.seek_chapter(1).unwrap();
        drain(&bd);

        assert!(matches!(bd.select_playlist(50), Err(SessionError::Format(_))));
        assert!(matches!(bd.select_playlist(99), Err(SessionError::Io(_))));
        assert_eq!(bd.position().playlist, 1);
        assert_eq!(bd.tell(), 32 * 192);
        assert!(drain(&bd).is_empty());
    }

    #[test]
    fn test_duplicate_titles_filtered() {
        let mut disc = TestDisc::new();
        disc.add_clip("00001", &ClipSpec::plain(64));
        disc.add_clip("00002", &ClipSpec::plain(96));
        let a = disc.simple_playlist(&["00001"]);
        disc.add_playlist(1, &a);
        disc.add_playlist(2, &a);
        disc.add_playlist(3, &disc.simple_playlist(&["00002"]));

        let bd = open(disc);
        assert_eq!(bd.get_titles(TITLES_ALL, 0).unwrap(), 3);
        assert_eq!(bd.get_titles(TITLES_FILTER_DUP_TITLE, 0).unwrap(), 2);
        assert_eq!(bd.get_main_title(), Some(1));
        assert_eq!(bd.get_title_info(1, 0).unwrap().playlist, 3);
        assert!(matches!(bd.select_title(2), Err(SessionError::InvalidSelection(_))));
    }

    #[test]
    fn test_seek_aligned_after_short_clip() {
        let mut disc = TestDisc::new();
        disc.add_clip("00001", &ClipSpec::plain(40));
        disc.add_clip("00002", &ClipSpec::plain(96));
        disc.add_playlist(1, &disc.simple_playlist(&["00001", "00002"]));
        let bd = open_protected(disc, &registry());
        bd.select_playlist(1).unwrap();

        // The 40-packet clip is padded to two units in the title.
        let size = bd.get_title_size().unwrap();
        assert_eq!(size, (64 + 96) * 192);
        for target in [7680, 10000, 14000, 20000, 25000] {
            let aligned = bd.seek(target).unwrap();
            assert_eq!(aligned % UNIT_BYTES as u64, 0, "seek to {}", target);
            assert!(aligned <= target);
        }
        assert_eq!(bd.seek_chapter(1).unwrap(), 64 * 192);

        bd.seek(0).unwrap();
        let mut buf = vec![0u8; 64 * 1024];
        let mut data = Vec::new();
        loop {
            let n = bd.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        assert_eq!(data.len(), (40 + 96) * 192);
        assert_eq!(data[40 * 192 + 5], testdisc::packet_byte(0, 5));
        assert_eq!(data[41 * 192 + 5], testdisc::packet_byte(1, 5));
        assert_eq!(bd.tell(), size);
    }

    #[test]
    fn test_read_past_end() {
        let bd = open(testdisc::standard());
        bd.select_playlist(1).unwrap();
        let size = bd.get_title_size().unwrap();
        assert_eq!(size, 160 * 192);

        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = bd.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        assert_eq!(total, size);
        assert_eq!(bd.read(&mut buf).unwrap(), 0);
        assert_eq!(bd.tell(), size);

        let events = drain(&bd);
        assert_eq!(count(&events, EventType::EndOfTitle), 1);
        assert_eq!(params(&events, EventType::PlayItem), vec![1]);
        assert_eq!(params(&events, EventType::Chapter), vec![1, 2, 3]);
        assert_eq!(params(&events, EventType::PlayMark), vec![0, 1, 2]);
    }

    #[test]
    fn test_read_returns_clip_data() {
        let bd = open(testdisc::standard());
        bd.select_playlist(1).unwrap();
        bd.seek_playitem(1).unwrap();

        let mut buf = vec![0u8; 192 * 2];
        assert_eq!(bd.read(&mut buf).unwrap(), buf.len());
        for i in 0..192 {
            assert_eq!(buf[i], testdisc::packet_byte(0, i));
            assert_eq!(buf[192 + i], testdisc::packet_byte(1, i));
        }
        assert_eq!(bd.position().clip, 1);
    }

    #[test]
    fn test_seek_alignment_when_decrypting() {
        let bd = open_protected(testdisc::standard(), &registry());
        assert!(bd.disc_info().aacs_handled);
        bd.select_playlist(1).unwrap();

        for target in [1u64, 6143, 6144, 10_000, 20_000, 30_000] {
            let aligned = bd.seek(target).unwrap();
            assert!(aligned <= target);
            assert_eq!(aligned % UNIT_BYTES as u64, 0);
            let pos = bd.position();
            assert_eq!(pos.raw, target);
            assert_eq!(pos.aligned, aligned);
        }
    }

    #[test]
    fn test_seek_unaligned_without_decryption() {
        let bd = open(testdisc::standard());
        bd.select_playlist(1).unwrap();
        assert_eq!(bd.seek(10_000).unwrap(), 10_000);
        assert_eq!(bd.seek(u64::MAX).unwrap(), 160 * 192);
    }

    #[test]
    fn test_seek_mark_and_chapter() {
        let bd = open_protected(testdisc::standard(), &registry());
        bd.select_playlist(1).unwrap();
        drain(&bd);

        assert_eq!(bd.seek_mark(1).unwrap(), 32 * 192);
        let events = drain(&bd);
        assert_eq!(params(&events, EventType::Seek), vec![UNIT_TIME]);
        assert_eq!(bd.get_current_chapter(), Some(1));
        assert_eq!(bd.tell_time(), 2 * UNIT_TIME as u64);

        assert_eq!(bd.seek_chapter(2).unwrap(), 96 * 192);
        assert_eq!(params(&drain(&bd), EventType::PlayItem), vec![1]);
        assert_eq!(bd.chapter_pos(2).unwrap(), 96 * 192);
        assert!(matches!(bd.seek_mark(9), Err(SessionError::InvalidSelection(_))));
    }

    #[test]
    fn test_seek_time() {
        let bd = open(testdisc::standard());
        bd.select_playlist(1).unwrap();
        let target = 2 * (3 * UNIT_TIME as u64 + UNIT_TIME as u64 + 100);
        let offset = bd.seek_time(target).unwrap();
        assert_eq!(offset, (96 + 32) * 192);
        assert_eq!(bd.position().clip, 1);
        assert!(bd.seek_time(u64::MAX).is_err());
    }

    #[test]
    fn test_corrupt_unit_skipped() {
        let mut disc = TestDisc::new();
        disc.add_clip("00001", &ClipSpec::plain(96).encrypted().with_bad_unit(0));
        disc.add_playlist(1, &disc.simple_playlist(&["00001"]));
        let bd = open_protected(disc, &registry());
        bd.select_playlist(1).unwrap();
        drain(&bd);

        let mut buf = vec![0u8; UNIT_BYTES];
        assert!(matches!(
            bd.read(&mut buf),
            Err(SessionError::UnitDecryptFailed { unit: 0 })
        ));
        assert_eq!(bd.read(&mut buf).unwrap(), UNIT_BYTES);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[3], 32);
        assert_eq!(bd.read(&mut buf).unwrap(), UNIT_BYTES);
        assert_eq!(bd.read(&mut buf).unwrap(), 0);

        let events = drain(&bd);
        assert_eq!(count(&events, EventType::ReadError), 1);
        assert_eq!(count(&events, EventType::EndOfTitle), 1);
    }

    #[test]
    fn test_encrypted_without_engine() {
        let mut disc = TestDisc::new();
        disc.add_clip("00001", &ClipSpec::plain(64).encrypted());
        disc.add_playlist(1, &disc.simple_playlist(&["00001"]));
        let bd = open_protected(disc, &PluginRegistry::empty());
        assert!(bd.disc_info().aacs_detected);
        assert!(!bd.disc_info().aacs_handled);
        bd.select_playlist(1).unwrap();
        drain(&bd);

        let mut buf = vec![0u8; UNIT_BYTES];
        assert!(matches!(bd.read(&mut buf), Err(SessionError::Encrypted)));
        assert_eq!(params(&drain(&bd), EventType::Encrypted), vec![ErrorKind::Aacs as u32]);
        assert_eq!(bd.tell(), 0);
    }

    #[test]
    fn test_uo_gating() {
        let mut disc = testdisc::standard();
        let mut playlist = disc.simple_playlist(&["00001"]);
        playlist.app_info.uo_mask = UoMask::EMPTY.with(UserOperation::PauseOn, true);
        disc.add_playlist(10, &playlist);
        let bd = open(disc);

        assert!(matches!(bd.set_rate(RATE_PAUSED), Err(SessionError::InvalidState(_))));
        bd.select_playlist(10).unwrap();
        assert!(matches!(
            bd.set_rate(RATE_PAUSED),
            Err(SessionError::Disallowed(UserOperation::PauseOn))
        ));
        bd.set_rate(RATE_NORMAL).unwrap();

        bd.select_stream(StreamKind::Audio, 2, true).unwrap();
        bd.select_stream(StreamKind::PgTextst, 1, false).unwrap();
        assert!(matches!(
            bd.select_stream(StreamKind::Audio, 3, true),
            Err(SessionError::InvalidSelection(_))
        ));
        let events = drain(&bd);
        assert_eq!(params(&events, EventType::AudioStream), vec![2]);
        assert_eq!(params(&events, EventType::PgTextst), vec![0]);

        let mask = UoMask::EMPTY.with(UserOperation::PrimaryAudioChange, true);
        bd.navigation_handle().post(NavRequest::SetUoMask(mask));
        bd.seek(0).unwrap();
        assert!(!bd.uo_mask().is_allowed(UserOperation::PrimaryAudioChange));
        assert!(matches!(
            bd.select_stream(StreamKind::Audio, 1, true),
            Err(SessionError::Disallowed(UserOperation::PrimaryAudioChange))
        ));
        assert_eq!(count(&drain(&bd), EventType::UoMaskChanged), 1);

        bd.select_playlist(10).unwrap();
        bd.select_stream(StreamKind::Audio, 1, true).unwrap();
    }

    #[test]
    fn test_still_mode() {
        let bd = open(testdisc::standard());
        bd.select_playlist(7).unwrap();
        let mut buf = vec![0u8; 64 * 1024];

        assert_eq!(bd.read(&mut buf).unwrap(), 64 * 192);
        assert_eq!(bd.state(), SessionState::Still);
        assert_eq!(bd.read(&mut buf).unwrap(), 0);
        assert_eq!(params(&drain(&bd), EventType::StillTime), vec![5]);

        bd.read_skip_still().unwrap();
        assert_eq!(bd.read(&mut buf).unwrap(), 96 * 192);
        let events = drain(&bd);
        assert_eq!(params(&events, EventType::PlayItem), vec![1]);
        assert_eq!(count(&events, EventType::EndOfTitle), 1);
    }

    #[test]
    fn test_seek_leaves_still() {
        let bd = open(testdisc::standard());
        bd.select_playlist(7).unwrap();
        let mut buf = vec![0u8; 64 * 1024];
        bd.read(&mut buf).unwrap();
        assert_eq!(bd.state(), SessionState::Still);
        bd.seek(0).unwrap();
        assert_eq!(bd.state(), SessionState::Playing);
        assert_eq!(bd.read(&mut buf).unwrap(), 64 * 192);
    }

    #[test]
    fn test_angle_change() {
        let mut disc = testdisc::standard();
        disc.add_clip("00003", &ClipSpec::plain(128));
        let bd = open(disc);
        bd.select_playlist(3).unwrap();
        let mut buf = vec![0u8; UNIT_BYTES];
        bd.read(&mut buf).unwrap();
        drain(&bd);

        assert!(matches!(bd.select_angle(2), Err(SessionError::InvalidSelection(_))));
        bd.select_angle(1).unwrap();
        assert_eq!(bd.get_current_angle(), Some(1));
        assert_eq!(bd.tell(), 32 * 192);
        let events = drain(&bd);
        assert_eq!(params(&events, EventType::Angle), vec![2]);
        assert_eq!(params(&events, EventType::Seek), vec![UNIT_TIME]);
        assert_eq!(bd.get_title_size(), Some(128 * 192));
    }

    #[test]
    fn test_seamless_angle_keeps_position() {
        let bd = open(testdisc::standard());
        bd.select_playlist(3).unwrap();
        bd.seek(1000).unwrap();
        drain(&bd);

        bd.select_angle(1).unwrap();
        assert_eq!(bd.tell(), 1000);
        let events = drain(&bd);
        assert_eq!(params(&events, EventType::Angle), vec![2]);
        assert_eq!(count(&events, EventType::Seek), 0);
    }

    struct ScriptedEngine;

    impl NavigationEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn user_input(&mut self, _pts: i64, key: u32) -> Vec<NavRequest> {
            match key {
                keys::ENTER => vec![NavRequest::PlayPlaylist {
                    playlist: 1,
                    play_item: 1,
                    mark: None,
                }],
                keys::POPUP => vec![NavRequest::Popup(true), NavRequest::Menu(true)],
                _ => Vec::new(),
            }
        }

        fn mouse_select(&mut self, _pts: i64, _x: u16, _y: u16) -> Vec<NavRequest> {
            vec![NavRequest::Stop]
        }

        fn menu_call(&mut self, _pts: i64) -> Vec<NavRequest> {
            vec![NavRequest::PlayTitle(TITLE_TOP_MENU)]
        }

        fn title_started(&mut self, title: u32) -> Vec<NavRequest> {
            match title {
                TITLE_FIRST_PLAY => vec![NavRequest::PlayPlaylist {
                    playlist: 1,
                    play_item: 0,
                    mark: None,
                }],
                _ => Vec::new(),
            }
        }
    }

    #[test]
    fn test_play_first_play_runs_engine() {
        let bd = open(testdisc::standard());
        bd.set_navigation_engine(Box::new(ScriptedEngine));
        bd.play().unwrap();
        assert_eq!(bd.get_current_index_title(), Some(TITLE_FIRST_PLAY));
        assert_eq!(bd.position().playlist, 1);

        let events = drain(&bd);
        assert_eq!(params(&events, EventType::Title), vec![TITLE_FIRST_PLAY]);
        assert_eq!(params(&events, EventType::Playlist), vec![1]);
    }

    #[test]
    fn test_play_title_gated_by_title_search() {
        let mut disc = testdisc::standard();
        let mut playlist = disc.simple_playlist(&["00001"]);
        playlist.app_info.uo_mask = UoMask::EMPTY.with(UserOperation::TitleSearch, true);
        disc.add_playlist(12, &playlist);
        let bd = open(disc);

        bd.play_title(1).unwrap();
        assert_eq!(bd.get_current_index_title(), Some(1));
        assert_eq!(params(&drain(&bd), EventType::Title), vec![1]);
        // Title 3 is prohibited in the index.
        assert!(matches!(bd.play_title(3), Err(SessionError::InvalidSelection(_))));

        bd.select_playlist(12).unwrap();
        drain(&bd);
        assert!(matches!(
            bd.play_title(2),
            Err(SessionError::Disallowed(UserOperation::TitleSearch))
        ));
        assert_eq!(count(&drain(&bd), EventType::Title), 0);
        assert_eq!(bd.get_current_index_title(), Some(1));

        bd.play().unwrap();
        assert_eq!(params(&drain(&bd), EventType::Title), vec![TITLE_FIRST_PLAY]);
    }

    #[test]
    fn test_input_requires_engine() {
        let bd = open(testdisc::standard());
        assert!(matches!(
            bd.user_input(0, keys::ENTER),
            Err(SessionError::NoNavigationEngine)
        ));
    }

    #[test]
    fn test_navigation_engine_requests() {
        let bd = open(testdisc::standard());
        bd.set_navigation_engine(Box::new(ScriptedEngine));

        bd.user_input(0, keys::ENTER).unwrap();
        assert_eq!(bd.position().playlist, 1);
        assert_eq!(bd.tell(), 96 * 192);

        bd.user_input(0, keys::POPUP).unwrap();
        assert_eq!(bd.state(), SessionState::MenuActive);

        bd.menu_call(0).unwrap();
        assert_eq!(bd.get_current_index_title(), Some(TITLE_TOP_MENU));

        bd.mouse_select(0, 10, 10).unwrap();
        assert_eq!(bd.state(), SessionState::Opened);
        assert_eq!(bd.get_title_size(), None);

        let events = drain(&bd);
        assert_eq!(params(&events, EventType::Popup), vec![1]);
        assert_eq!(count(&events, EventType::PlaylistStop), 1);
    }

    #[test]
    fn test_popup_key_gated_by_mask() {
        let mut disc = testdisc::standard();
        let mut playlist = disc.simple_playlist(&["00001"]);
        playlist.app_info.uo_mask = UoMask::EMPTY.with(UserOperation::PopupOff, true);
        disc.add_playlist(11, &playlist);
        let bd = open(disc);
        bd.set_navigation_engine(Box::new(ScriptedEngine));
        bd.select_playlist(11).unwrap();

        bd.user_input(0, keys::POPUP).unwrap();
        assert!(matches!(
            bd.user_input(0, keys::POPUP),
            Err(SessionError::Disallowed(UserOperation::PopupOff))
        ));
    }

    #[test]
    fn test_handle_requests_applied_on_read() {
        let bd = open(testdisc::standard());
        bd.select_playlist(1).unwrap();
        drain(&bd);

        let handle = bd.navigation_handle();
        let worker = std::thread::spawn(move || {
            handle.post(NavRequest::PlayTitle(1));
            handle.post(NavRequest::PlayTitle(3));
        });
        worker.join().unwrap();
        assert_eq!(bd.navigation_handle().pending(), 2);

        bd.read(&mut [0u8; 192]).unwrap();
        let events = drain(&bd);
        assert_eq!(params(&events, EventType::Title), vec![1]);
        assert_eq!(params(&events, EventType::Error), vec![ErrorKind::Hdmv as u32]);
        assert_eq!(bd.navigation_handle().pending(), 0);
    }

    #[test]
    fn test_read_ext_returns_pending_events_first() {
        let bd = open(testdisc::standard());
        bd.select_playlist(6).unwrap();
        let mut buf = vec![0u8; 64 * 1024];

        let (n, event) = bd.read_ext(&mut buf).unwrap();
        assert_eq!(n, 0);
        assert_eq!(event.map(|e| e.event), Some(EventType::Playlist));

        let (n, event) = bd.read_ext(&mut buf).unwrap();
        assert_eq!(n, 64 * 192);
        assert!(event.is_some());
    }

    #[test]
    fn test_close_releases_session() {
        let bd = open(testdisc::standard());
        bd.select_playlist(1).unwrap();
        bd.close();
        assert_eq!(bd.state(), SessionState::Closed);
        assert!(matches!(bd.select_playlist(1), Err(SessionError::InvalidState(_))));
        assert!(bd.get_event().is_none());
    }
}
