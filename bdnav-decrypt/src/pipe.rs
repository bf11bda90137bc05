//! Aligned-unit decryption pipe.
//!
//! Reads from a protected stream must be served in whole aligned units.
//! `UnitPipe` owns the session's decryption capability and processes
//! one unit at a time, reporting failures per unit without aborting.

use log::{debug, error, warn};

use crate::engine::{is_unit_encrypted, DecryptCapability, ALIGNED_UNIT_SIZE};

/// Outcome of processing one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// Unit carries no copy protection.
    Clear,
    /// Unit was decrypted in place.
    Decrypted,
    /// The engine failed on this unit; its contents are unusable.
    Failed,
    /// Unit is protected but no engine is available.
    Encrypted,
}

pub struct UnitPipe {
    capability: DecryptCapability,
    units_decrypted: u64,
    units_failed: u64,
}

impl UnitPipe {
    pub fn new(capability: DecryptCapability) -> Self {
        Self {
            capability,
            units_decrypted: 0,
            units_failed: 0,
        }
    }

    /// True when an engine is available and reads must be unit aligned.
    pub fn is_active(&self) -> bool {
        self.capability.is_present()
    }

    /// Decrypt one aligned unit in place if it is protected.
    pub fn process_unit(&mut self, unit: &mut [u8]) -> UnitStatus {
        if !is_unit_encrypted(unit) {
            return UnitStatus::Clear;
        }
        if unit.len() != ALIGNED_UNIT_SIZE {
            warn!(
                "[Decrypt] Protected unit of {} bytes is not a whole aligned unit",
                unit.len()
            );
            return UnitStatus::Failed;
        }

        match &mut self.capability {
            DecryptCapability::Present(engine) => {
                if engine.decrypt_unit(unit) {
                    self.units_decrypted += 1;
                    UnitStatus::Decrypted
                } else {
                    self.units_failed += 1;
                    error!("[Decrypt] Unit decryption failed");
                    UnitStatus::Failed
                }
            }
            DecryptCapability::Absent | DecryptCapability::Failed(_) => UnitStatus::Encrypted,
        }
    }

}

impl Drop for UnitPipe {
    fn drop(&mut self) {
        if self.units_decrypted > 0 || self.units_failed > 0 {
            debug!(
                "[Decrypt] Pipe closed: {} units decrypted, {} failed",
                self.units_decrypted, self.units_failed
            );
        }
    }
}
