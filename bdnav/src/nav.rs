//! Navigation engine contract and the requests it sends to a session.
//!
//! The engine that runs disc programs lives outside this crate. It is handed
//! user input after the UO gate and answers with [`NavRequest`]s. Requests
//! from other threads go through a [`NavigationHandle`] and are applied by
//! the session between reads.

use std::collections::VecDeque;
use std::sync::Arc;

use bdnav_formats::{UoMask, UserOperation};
use parking_lot::Mutex;

use crate::event::EventType;

/// Remote control key codes.
pub mod keys {
    pub const KEY_0: u32 = 0;
    pub const KEY_9: u32 = 9;
    pub const ROOT_MENU: u32 = 10;
    pub const POPUP: u32 = 11;
    pub const UP: u32 = 12;
    pub const DOWN: u32 = 13;
    pub const LEFT: u32 = 14;
    pub const RIGHT: u32 = 15;
    pub const ENTER: u32 = 16;
    /// Activate the button under the pointer.
    pub const MOUSE_ACTIVATE: u32 = 17;
    pub const RED: u32 = 403;
    pub const GREEN: u32 = 404;
    pub const YELLOW: u32 = 405;
    pub const BLUE: u32 = 406;
}

/// User operation gating a key press, `None` when the key is never masked.
pub fn key_operation(key: u32, popup_visible: bool) -> Option<UserOperation> {
    match key {
        keys::KEY_0..=keys::KEY_9 => Some(UserOperation::Select),
        keys::ROOT_MENU => Some(UserOperation::MenuCall),
        keys::POPUP if popup_visible => Some(UserOperation::PopupOff),
        keys::POPUP => Some(UserOperation::PopupOn),
        keys::UP => Some(UserOperation::MoveUp),
        keys::DOWN => Some(UserOperation::MoveDown),
        keys::LEFT => Some(UserOperation::MoveLeft),
        keys::RIGHT => Some(UserOperation::MoveRight),
        keys::ENTER | keys::MOUSE_ACTIVATE => Some(UserOperation::Activate),
        _ => None,
    }
}

/// Selectable stream families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    /// Presentation graphics and text subtitles.
    PgTextst,
    Ig,
    SecondaryAudio,
    SecondaryVideo,
}

impl StreamKind {
    /// Operation that must be permitted to change the stream.
    pub fn operation(self) -> UserOperation {
        match self {
            StreamKind::Audio => UserOperation::PrimaryAudioChange,
            StreamKind::PgTextst | StreamKind::Ig => UserOperation::PgChange,
            StreamKind::SecondaryAudio => UserOperation::SecondaryAudioChange,
            StreamKind::SecondaryVideo => UserOperation::SecondaryVideoChange,
        }
    }

    /// Event carrying the selected stream number.
    pub fn stream_event(self) -> EventType {
        match self {
            StreamKind::Audio => EventType::AudioStream,
            StreamKind::PgTextst => EventType::PgTextstStream,
            StreamKind::Ig => EventType::IgStream,
            StreamKind::SecondaryAudio => EventType::SecondaryAudioStream,
            StreamKind::SecondaryVideo => EventType::SecondaryVideoStream,
        }
    }

    /// Event carrying the enable flag, for kinds that can be switched off.
    pub fn enable_event(self) -> Option<EventType> {
        match self {
            StreamKind::PgTextst => Some(EventType::PgTextst),
            StreamKind::SecondaryAudio => Some(EventType::SecondaryAudio),
            StreamKind::SecondaryVideo => Some(EventType::SecondaryVideo),
            StreamKind::Audio | StreamKind::Ig => None,
        }
    }
}

/// Request from the navigation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavRequest {
    /// Start an index title: 0 = top menu, 0xFFFF = first play, else 1..N.
    PlayTitle(u32),
    /// Select a playlist and jump into it.
    PlayPlaylist {
        playlist: u32,
        play_item: u32,
        mark: Option<u32>,
    },
    SelectStream {
        kind: StreamKind,
        /// 1-based stream number.
        number: u32,
        enable: bool,
    },
    /// Replace the program's UO mask.
    SetUoMask(UoMask),
    /// Stop playlist playback.
    Stop,
    /// Popup menu became available or went away.
    Popup(bool),
    /// Interactive menu shown or hidden.
    Menu(bool),
    /// Enter or leave a program-controlled still.
    Still(bool),
}

/// Disc program interpreter driven by the session.
pub trait NavigationEngine: Send {
    fn name(&self) -> &str;

    /// Key press that passed the UO gate.
    fn user_input(&mut self, pts: i64, key: u32) -> Vec<NavRequest>;

    /// Pointer selection at `(x, y)` that passed the UO gate.
    fn mouse_select(&mut self, pts: i64, x: u16, y: u16) -> Vec<NavRequest>;

    /// Menu call that passed the UO gate.
    fn menu_call(&mut self, pts: i64) -> Vec<NavRequest>;

    /// The host started index title `title`; the engine runs its object.
    fn title_started(&mut self, _title: u32) -> Vec<NavRequest> {
        Vec::new()
    }
}

/// Cloneable sender of navigation requests into one session.
#[derive(Clone, Default)]
pub struct NavigationHandle {
    requests: Arc<Mutex<VecDeque<NavRequest>>>,
}

impl NavigationHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a request. It is applied on the next read or seek.
    pub fn post(&self, request: NavRequest) {
        self.requests.lock().push_back(request);
    }

    pub fn pending(&self) -> usize {
        self.requests.lock().len()
    }

    /// Take every queued request in posting order.
    pub(crate) fn drain(&self) -> Vec<NavRequest> {
        self.requests.lock().drain(..).collect()
    }
}

impl std::fmt::Debug for NavigationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationHandle")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_operation() {
        assert_eq!(key_operation(keys::ROOT_MENU, false), Some(UserOperation::MenuCall));
        assert_eq!(key_operation(keys::POPUP, false), Some(UserOperation::PopupOn));
        assert_eq!(key_operation(keys::POPUP, true), Some(UserOperation::PopupOff));
        assert_eq!(key_operation(keys::LEFT, false), Some(UserOperation::MoveLeft));
        assert_eq!(key_operation(5, false), Some(UserOperation::Select));
        assert_eq!(key_operation(keys::ENTER, false), Some(UserOperation::Activate));
        assert_eq!(key_operation(keys::RED, false), None);
    }

    #[test]
    fn test_stream_kind_events() {
        assert_eq!(StreamKind::Audio.operation(), UserOperation::PrimaryAudioChange);
        assert_eq!(StreamKind::PgTextst.operation(), UserOperation::PgChange);
        assert_eq!(StreamKind::Audio.enable_event(), None);
        assert_eq!(StreamKind::PgTextst.stream_event(), EventType::PgTextstStream);
        assert_eq!(StreamKind::PgTextst.enable_event(), Some(EventType::PgTextst));
    }

    #[test]
    fn test_handle_is_shared_between_clones() {
        let handle = NavigationHandle::new();
        let other = handle.clone();
        let worker = std::thread::spawn(move || {
            other.post(NavRequest::Stop);
            other.post(NavRequest::Popup(true));
        });
        worker.join().unwrap();

        assert_eq!(handle.pending(), 2);
        assert_eq!(handle.drain(), vec![NavRequest::Stop, NavRequest::Popup(true)]);
        assert_eq!(handle.pending(), 0);
    }
}
