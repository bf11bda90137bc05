//! Subcommand handlers.

mod disc;
mod dump;
#[cfg(test)]
mod fixture;

pub(crate) use disc::{cmd_info, cmd_titles};
pub(crate) use dump::{cmd_dump, DumpOptions};

use bdnav::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CommandError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No title {0} (the disc has {1})")]
    NoSuchTitle(usize, usize),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Render a 90 kHz tick count as `h:mm:ss.mmm`.
pub(crate) fn format_ticks(ticks: u64) -> String {
    let ms = ticks / 90;
    format!(
        "{}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        ms / 60_000 % 60,
        ms / 1000 % 60,
        ms % 1000
    )
}
