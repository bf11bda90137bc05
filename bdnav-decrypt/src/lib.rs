//! Decryption adapter for protected Blu-ray streams.
//!
//! Clip files are made of aligned units of 6144 bytes (32 source packets).
//! A unit is protected when the copy-permission bits of its first byte are
//! set. This crate resolves an engine for a disc through a
//! [`PluginRegistry`], and a [`UnitPipe`] decrypts them unit by unit.
//!
//! The built-in [`LibraryPlugin`] binds a shared AACS library at runtime.

pub mod engine;
pub mod error;
pub mod library;
pub mod pipe;
pub mod registry;

pub use engine::{is_unit_encrypted, DecryptCapability, DecryptEngine, DecryptPlugin, ALIGNED_UNIT_SIZE};
pub use error::{AacsErrorCode, DecryptError};
pub use library::{LibraryPlugin, DEFAULT_LIBRARY_NAMES};
pub use pipe::{UnitPipe, UnitStatus};
pub use registry::PluginRegistry;
