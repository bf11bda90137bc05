//! Permitted-user-operation table.
//!
//! The effective mask is the union of the disc baseline (playlist mask plus
//! the current play item's mask) and the mask set by the navigation program.

use bdnav_formats::{UoMask, UserOperation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UoMaskTable {
    playlist: UoMask,
    play_item: UoMask,
    program: UoMask,
}

impl UoMaskTable {
    /// Disc baseline: playlist mask combined with the play item mask.
    pub fn disc(&self) -> UoMask {
        self.playlist.combine(self.play_item)
    }

    pub fn program(&self) -> UoMask {
        self.program
    }

    pub fn combined(&self) -> UoMask {
        self.disc().combine(self.program)
    }

    pub fn is_allowed(&self, op: UserOperation) -> bool {
        self.combined().is_allowed(op)
    }

    fn update(&mut self, f: impl FnOnce(&mut Self)) -> bool {
        let before = self.combined();
        f(self);
        before != self.combined()
    }

    /// Install the masks of a newly selected playlist and drop the program mask.
    /// Returns true when the effective mask changed.
    pub fn select_playlist(&mut self, playlist: UoMask, play_item: UoMask) -> bool {
        self.update(|t| {
            t.playlist = playlist;
            t.play_item = play_item;
            t.program = UoMask::EMPTY;
        })
    }

    pub fn set_play_item(&mut self, mask: UoMask) -> bool {
        self.update(|t| t.play_item = mask)
    }

    pub fn set_program(&mut self, mask: UoMask) -> bool {
        self.update(|t| t.program = mask)
    }

    pub fn reset(&mut self) -> bool {
        self.update(|t| *t = UoMaskTable::default())
    }
}
