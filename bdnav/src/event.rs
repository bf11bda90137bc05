//! Playback events and the bounded per-session event queue.

use std::collections::VecDeque;
use std::fmt;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

/// Default queue capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Event types with their stable numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventType {
    None = 0,
    /// Fatal error; param is an [`ErrorKind`] value.
    Error = 1,
    /// Read failure of one unit.
    ReadError = 2,
    /// Protected content without a working engine; param is [`ErrorKind::Aacs`].
    Encrypted = 3,
    /// Current angle, 1..N.
    Angle = 4,
    /// Current title, 0 = top menu, 0xFFFF = first play.
    Title = 5,
    /// Current playlist id.
    Playlist = 6,
    /// Current play item, 0-based.
    PlayItem = 7,
    /// Current chapter, 1..N.
    Chapter = 8,
    /// Playlist mark reached, 0-based.
    PlayMark = 9,
    EndOfTitle = 10,
    AudioStream = 11,
    IgStream = 12,
    PgTextstStream = 13,
    PipPgTextstStream = 14,
    SecondaryAudioStream = 15,
    SecondaryVideoStream = 16,
    /// Subtitles on (1) or off (0).
    PgTextst = 17,
    PipPgTextst = 18,
    SecondaryAudio = 19,
    SecondaryVideo = 20,
    SecondaryVideoSize = 21,
    PlaylistStop = 22,
    Discontinuity = 23,
    /// Seek completed; param is the new 45 kHz position.
    Seek = 24,
    /// Still on (1) or off (0).
    Still = 25,
    /// Still for param seconds, 0 = infinite.
    StillTime = 26,
    SoundEffect = 27,
    Idle = 28,
    /// Popup menu available (1) or not (0).
    Popup = 29,
    /// Interactive menu visible (1) or hidden (0).
    Menu = 30,
    StereoscopicStatus = 31,
    KeyInterestTable = 32,
    /// Permitted user operations changed; param is the low 32 bits of the mask.
    UoMaskChanged = 33,
}

impl From<u32> for EventType {
    fn from(value: u32) -> Self {
        match value {
            1 => EventType::Error,
            2 => EventType::ReadError,
            3 => EventType::Encrypted,
            4 => EventType::Angle,
            5 => EventType::Title,
            6 => EventType::Playlist,
            7 => EventType::PlayItem,
            8 => EventType::Chapter,
            9 => EventType::PlayMark,
            10 => EventType::EndOfTitle,
            11 => EventType::AudioStream,
            12 => EventType::IgStream,
            13 => EventType::PgTextstStream,
            14 => EventType::PipPgTextstStream,
            15 => EventType::SecondaryAudioStream,
            16 => EventType::SecondaryVideoStream,
            17 => EventType::PgTextst,
            18 => EventType::PipPgTextst,
            19 => EventType::SecondaryAudio,
            20 => EventType::SecondaryVideo,
            21 => EventType::SecondaryVideoSize,
            22 => EventType::PlaylistStop,
            23 => EventType::Discontinuity,
            24 => EventType::Seek,
            25 => EventType::Still,
            26 => EventType::StillTime,
            27 => EventType::SoundEffect,
            28 => EventType::Idle,
            29 => EventType::Popup,
            30 => EventType::Menu,
            31 => EventType::StereoscopicStatus,
            32 => EventType::KeyInterestTable,
            33 => EventType::UoMaskChanged,
            _ => EventType::None,
        }
    }
}

impl From<EventType> for u32 {
    fn from(value: EventType) -> Self {
        value as u32
    }
}

/// Coarse grouping of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Error,
    Position,
    StreamSelection,
    Control,
    Status,
}

impl EventType {
    pub fn category(self) -> EventCategory {
        use EventType::*;
        match self {
            Error | ReadError | Encrypted => EventCategory::Error,
            Angle | Title | Playlist | PlayItem | Chapter | PlayMark | EndOfTitle => {
                EventCategory::Position
            }
            AudioStream | IgStream | PgTextstStream | PipPgTextstStream | SecondaryAudioStream
            | SecondaryVideoStream | PgTextst | PipPgTextst | SecondaryAudio | SecondaryVideo
            | SecondaryVideoSize => EventCategory::StreamSelection,
            PlaylistStop | Discontinuity | Seek | Still | StillTime | SoundEffect | Idle => {
                EventCategory::Control
            }
            None | Popup | Menu | StereoscopicStatus | KeyInterestTable | UoMaskChanged => {
                EventCategory::Status
            }
        }
    }

    /// Status events describe current state: a newer one replaces a pending one.
    pub fn is_status(self) -> bool {
        use EventType::*;
        !matches!(
            self,
            None | Error
                | ReadError
                | Encrypted
                | PlayItem
                | Chapter
                | PlayMark
                | EndOfTitle
                | Seek
                | StillTime
                | Discontinuity
                | PlaylistStop
                | SoundEffect
        )
    }
}

/// Error kinds carried by [`EventType::Error`] and [`EventType::Encrypted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorKind {
    /// Navigation program failure.
    Hdmv = 1,
    /// Managed runtime failure.
    Bdj = 2,
    /// Stream protection.
    Aacs = 3,
    /// Additional stream protection.
    BdPlus = 4,
}

/// One event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event: EventType,
    pub param: u32,
}

impl Event {
    pub fn new(event: EventType, param: u32) -> Self {
        Event { event, param }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.event, self.param)
    }
}

/// Bounded FIFO of pending events.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue an event.
    ///
    /// A status event replaces a pending event of the same type in place.
    /// When full, the oldest event of the same type is dropped, else the
    /// oldest point event, else the oldest event.
    pub fn push(&mut self, event: Event) {
        if event.event == EventType::None {
            return;
        }

        if event.event.is_status() {
            if let Some(pending) = self.events.iter_mut().find(|e| e.event == event.event) {
                pending.param = event.param;
                trace!("[Events] Coalesced {}", event);
                return;
            }
        }

        if self.events.len() >= self.capacity {
            let victim = self
                .events
                .iter()
                .position(|e| e.event == event.event)
                .or_else(|| self.events.iter().position(|e| !e.event.is_status()))
                .unwrap_or(0);
            if let Some(dropped) = self.events.remove(victim) {
                warn!("[Events] Queue full, dropping {}", dropped);
            }
        }

        trace!("[Events] Queued {}", event);
        self.events.push_back(event);
    }

    /// Oldest pending event.
    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn peek(&self) -> Option<&Event> {
        self.events.front()
    }

    /// Discard pending point events, keeping status events.
    pub fn clear_points(&mut self) {
        self.events.retain(|e| e.event.is_status());
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}
