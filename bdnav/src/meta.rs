//! Loading of metadata files from a disc, with `BDMV/BACKUP` fallback.

use std::sync::Arc;

use bdnav_formats::{parse_clip_info, parse_index, parse_playlist, ClipInfo, DiscIndex, FormatError, Playlist};
use log::{debug, warn};

use crate::disc::DiscAccess;
use crate::error::{Result, SessionError};

pub const INDEX_PATH: &str = "BDMV/index.bdmv";
pub const PLAYLIST_DIR: &str = "BDMV/PLAYLIST";
pub const CLIPINF_DIR: &str = "BDMV/CLIPINF";
pub const STREAM_DIR: &str = "BDMV/STREAM";
pub const AACS_UNIT_KEY_PATH: &str = "AACS/Unit_Key_RO.inf";

pub fn playlist_path(playlist: u32) -> String {
    format!("{}/{:05}.mpls", PLAYLIST_DIR, playlist)
}

pub fn clip_info_path(clip_id: &str) -> String {
    format!("{}/{}.clpi", CLIPINF_DIR, clip_id)
}

pub fn stream_path(clip_id: &str) -> String {
    format!("{}/{}.m2ts", STREAM_DIR, clip_id)
}

fn backup_path(path: &str) -> Option<String> {
    path.strip_prefix("BDMV/").map(|rest| format!("BDMV/BACKUP/{}", rest))
}

/// Read and parse `path`, retrying the backup copy when the primary file is
/// missing or corrupt. The primary error is reported if both fail.
fn load<T>(
    disc: &dyn DiscAccess,
    path: &str,
    parse: fn(&[u8]) -> std::result::Result<T, FormatError>,
) -> Result<T> {
    let primary = disc
        .read_file(path)
        .map_err(SessionError::from)
        .and_then(|data| parse(&data).map_err(SessionError::from));

    let err = match primary {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let Some(backup) = backup_path(path) else {
        return Err(err);
    };
    if !disc.exists(&backup) {
        return Err(err);
    }

    warn!("[Meta] {} unusable ({}), trying {}", path, err, backup);
    match disc.read_file(&backup) {
        Ok(data) => match parse(&data) {
            Ok(value) => {
                debug!("[Meta] Loaded {}", backup);
                Ok(value)
            }
            Err(_) => Err(err),
        },
        Err(_) => Err(err),
    }
}

pub fn load_index(disc: &dyn DiscAccess) -> Result<DiscIndex> {
    load(disc, INDEX_PATH, parse_index)
}

pub fn load_playlist(disc: &dyn DiscAccess, playlist: u32) -> Result<Playlist> {
    load(disc, &playlist_path(playlist), parse_playlist)
}

pub fn load_clip_info(disc: &dyn DiscAccess, clip_id: &str) -> Result<Arc<ClipInfo>> {
    load(disc, &clip_info_path(clip_id), parse_clip_info).map(Arc::new)
}

/// Playlist id of a `NNNNN.mpls` file name.
pub fn playlist_id(file_name: &str) -> Option<u32> {
    let (stem, ext) = file_name.split_once('.')?;
    if !ext.eq_ignore_ascii_case("mpls") || stem.len() != 5 {
        return None;
    }
    if !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
