//! Blu-ray navigation core.
//!
//! Builds a navigable title model from the metadata of a BDMV disc and
//! drives a playback session over it: position tracking, permitted user
//! operations, aligned and decrypted reads, and an event stream for the
//! host.
//!
//! ```no_run
//! use bdnav::{Bluray, SessionConfig, TITLES_RELEVANT};
//!
//! let bd = Bluray::open_dir("/media/disc", &SessionConfig::default())?;
//! bd.get_titles(TITLES_RELEVANT, 60)?;
//! if let Some(main) = bd.get_main_title() {
//!     bd.select_title(main)?;
//!     let mut buf = vec![0u8; 6144 * 10];
//!     while bd.read(&mut buf)? > 0 {
//!         while let Some(event) = bd.get_event() {
//!             println!("{}", event);
//!         }
//!     }
//! }
//! # Ok::<(), bdnav::SessionError>(())
//! ```

pub mod config;
pub mod disc;
pub mod error;
pub mod event;
pub mod info;
pub mod meta;
pub mod nav;
pub mod session;
pub mod title;
pub mod uo;

#[cfg(test)]
mod testdisc;

pub use bdnav_decrypt as decrypt;
pub use bdnav_formats as formats;

pub use config::{DecryptConfig, SessionConfig};
pub use disc::{BlockDisc, DirectoryDisc, DiscAccess, DiscFile, FileExtent, MemoryDisc, ReadBlocks};
pub use error::{Result, SessionError};
pub use event::{ErrorKind, Event, EventCategory, EventQueue, EventType, DEFAULT_EVENT_CAPACITY};
pub use info::DiscInfo;
pub use nav::{keys, NavRequest, NavigationEngine, NavigationHandle, StreamKind};
pub use session::{
    Bluray, PlaybackPosition, SessionState, RATE_NORMAL, RATE_PAUSED, TITLE_FIRST_PLAY,
    TITLE_TOP_MENU,
};
pub use title::{
    build_title, scan_titles, Chapter, Clip, Mark, StreamInfo, TitleInfo, TitleList, TitleSummary,
    TITLES_ALL, TITLES_FILTER_DUP_CLIP, TITLES_FILTER_DUP_TITLE, TITLES_RELEVANT,
};
pub use uo::UoMaskTable;
