//! User-operation mask bit layout.
//!
//! A UO mask is a 64-bit set in which bit `i` refers to the user operation
//! with wire index `i`; a set bit means the operation is disallowed. On disc
//! the mask is stored most-significant-bit first, so wire index 0 is the very
//! first bit of the field. Bits 22 and 32 are reserved; bits 34..64 are
//! unused. Unknown bits are carried through unchanged.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// User operations that a disc may prohibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UserOperation {
    MenuCall = 0,
    TitleSearch = 1,
    ChapterSearch = 2,
    TimeSearch = 3,
    SkipToNextPoint = 4,
    SkipToPrevPoint = 5,
    PlayFirstPlay = 6,
    Stop = 7,
    PauseOn = 8,
    PauseOff = 9,
    StillOff = 10,
    ForwardPlay = 11,
    BackwardPlay = 12,
    Resume = 13,
    MoveUp = 14,
    MoveDown = 15,
    MoveLeft = 16,
    MoveRight = 17,
    Select = 18,
    Activate = 19,
    SelectAndActivate = 20,
    PrimaryAudioChange = 21,
    AngleChange = 23,
    PopupOn = 24,
    PopupOff = 25,
    PgEnableDisable = 26,
    PgChange = 27,
    SecondaryVideoEnableDisable = 28,
    SecondaryVideoChange = 29,
    SecondaryAudioEnableDisable = 30,
    SecondaryAudioChange = 31,
    PipPgChange = 33,
}

/// Wire indices that carry no operation.
pub const RESERVED_UO_BITS: [u8; 2] = [22, 32];

impl UserOperation {
    /// Every defined operation in wire order.
    pub const ALL: [UserOperation; 32] = [
        UserOperation::MenuCall,
        UserOperation::TitleSearch,
        UserOperation::ChapterSearch,
        UserOperation::TimeSearch,
        UserOperation::SkipToNextPoint,
        UserOperation::SkipToPrevPoint,
        UserOperation::PlayFirstPlay,
        UserOperation::Stop,
        UserOperation::PauseOn,
        UserOperation::PauseOff,
        UserOperation::StillOff,
        UserOperation::ForwardPlay,
        UserOperation::BackwardPlay,
        UserOperation::Resume,
        UserOperation::MoveUp,
        UserOperation::MoveDown,
        UserOperation::MoveLeft,
        UserOperation::MoveRight,
        UserOperation::Select,
        UserOperation::Activate,
        UserOperation::SelectAndActivate,
        UserOperation::PrimaryAudioChange,
        UserOperation::AngleChange,
        UserOperation::PopupOn,
        UserOperation::PopupOff,
        UserOperation::PgEnableDisable,
        UserOperation::PgChange,
        UserOperation::SecondaryVideoEnableDisable,
        UserOperation::SecondaryVideoChange,
        UserOperation::SecondaryAudioEnableDisable,
        UserOperation::SecondaryAudioChange,
        UserOperation::PipPgChange,
    ];

    /// Wire index of this operation.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Look up an operation by wire index. Reserved and unused indices yield `None`.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.index() == index)
    }

    pub fn name(self) -> &'static str {
        match self {
            UserOperation::MenuCall => "menu_call",
            UserOperation::TitleSearch => "title_search",
            UserOperation::ChapterSearch => "chapter_search",
            UserOperation::TimeSearch => "time_search",
            UserOperation::SkipToNextPoint => "skip_to_next_point",
            UserOperation::SkipToPrevPoint => "skip_to_prev_point",
            UserOperation::PlayFirstPlay => "play_firstplay",
            UserOperation::Stop => "stop",
            UserOperation::PauseOn => "pause_on",
            UserOperation::PauseOff => "pause_off",
            UserOperation::StillOff => "still_off",
            UserOperation::ForwardPlay => "forward",
            UserOperation::BackwardPlay => "backward",
            UserOperation::Resume => "resume",
            UserOperation::MoveUp => "move_up",
            UserOperation::MoveDown => "move_down",
            UserOperation::MoveLeft => "move_left",
            UserOperation::MoveRight => "move_right",
            UserOperation::Select => "select",
            UserOperation::Activate => "activate",
            UserOperation::SelectAndActivate => "select_and_activate",
            UserOperation::PrimaryAudioChange => "primary_audio_change",
            UserOperation::AngleChange => "angle_change",
            UserOperation::PopupOn => "popup_on",
            UserOperation::PopupOff => "popup_off",
            UserOperation::PgEnableDisable => "pg_enable_disable",
            UserOperation::PgChange => "pg_change",
            UserOperation::SecondaryVideoEnableDisable => "secondary_video_enable_disable",
            UserOperation::SecondaryVideoChange => "secondary_video_change",
            UserOperation::SecondaryAudioEnableDisable => "secondary_audio_enable_disable",
            UserOperation::SecondaryAudioChange => "secondary_audio_change",
            UserOperation::PipPgChange => "pip_pg_change",
        }
    }
}

impl fmt::Display for UserOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 64-bit set of disallowed user operations.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UoMask(u64);

impl UoMask {
    /// Nothing prohibited.
    pub const EMPTY: UoMask = UoMask(0);

    /// Build from a bitset where bit `i` is wire index `i`.
    pub const fn from_bits(bits: u64) -> Self {
        UoMask(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Convert the 64-bit field as read big-endian from disc.
    pub const fn from_wire(raw: u64) -> Self {
        UoMask(raw.reverse_bits())
    }

    /// The 64-bit field as it is written to disc.
    pub const fn to_wire(self) -> u64 {
        self.0.reverse_bits()
    }

    pub fn is_set(self, op: UserOperation) -> bool {
        self.0 & (1u64 << op.index()) != 0
    }

    pub fn is_allowed(self, op: UserOperation) -> bool {
        !self.is_set(op)
    }

    /// Return a copy with `op` prohibited (`true`) or permitted (`false`).
    pub fn with(self, op: UserOperation, prohibited: bool) -> Self {
        let bit = 1u64 << op.index();
        if prohibited {
            UoMask(self.0 | bit)
        } else {
            UoMask(self.0 & !bit)
        }
    }

    /// Union of two masks; an operation is disallowed if either source disallows it.
    pub const fn combine(self, other: UoMask) -> Self {
        UoMask(self.0 | other.0)
    }

    /// Value carried by a UO-mask-changed event.
    pub fn event_param(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Prohibited operations, in wire order.
    pub fn prohibited(self) -> impl Iterator<Item = UserOperation> {
        UserOperation::ALL
            .into_iter()
            .filter(move |op| self.is_set(*op))
    }
}

impl BitOr for UoMask {
    type Output = UoMask;

    fn bitor(self, rhs: UoMask) -> UoMask {
        self.combine(rhs)
    }
}

impl BitOrAssign for UoMask {
    fn bitor_assign(&mut self, rhs: UoMask) {
        *self = self.combine(rhs);
    }
}

impl fmt::Debug for UoMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UoMask({:#018x})", self.0)
    }
}
