//! Small BDMV folder written to a temporary directory.

use std::fs;
use std::path::Path;

use bdnav::formats::{
    encode_clip_info, encode_index, encode_playlist, ClipAttributes, ClipInfo, DiscIndex,
    EntryPoint, EpMapStream, IndexObject, IndexTitle, PlayItem, Playlist, PlaylistMark,
};
use bdnav::meta;

/// 45 kHz time of one 32-packet unit.
pub const UNIT_TIME: u32 = 45_056;
pub const PACKETS: u32 = 64;
pub const PACKET_SIZE: usize = 192;

fn write(root: &Path, path: &str, data: &[u8]) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, data).unwrap();
}

pub fn stream_bytes() -> Vec<u8> {
    (0..PACKETS as usize * PACKET_SIZE)
        .map(|i| if i % PACKET_SIZE == 4 { 0x47 } else { (i / PACKET_SIZE) as u8 })
        .collect()
}

/// One clip of two units; playlists 00001 and its duplicate 00002, each with
/// chapters at the start of both units.
pub fn write_disc(root: &Path) {
    let index = DiscIndex {
        first_play: Some(IndexObject::hdmv(0, false)),
        top_menu: None,
        titles: vec![IndexTitle {
            object: IndexObject::hdmv(1, false),
            access_type: 0,
        }],
        ..Default::default()
    };
    write(root, meta::INDEX_PATH, &encode_index(&index));

    let clip = ClipInfo {
        clip: ClipAttributes {
            clip_stream_type: 1,
            application_type: 1,
            num_source_packets: PACKETS,
            ..Default::default()
        },
        ep_map: vec![EpMapStream {
            pid: 0x1011,
            ep_stream_type: 1,
            entries: vec![EntryPoint::new(0, 0), EntryPoint::new(UNIT_TIME, 32)],
        }],
        ..Default::default()
    };
    write(root, &meta::clip_info_path("00001"), &encode_clip_info(&clip));
    write(root, &meta::stream_path("00001"), &stream_bytes());

    let playlist = Playlist {
        play_items: vec![PlayItem::new("00001", 0, 2 * UNIT_TIME)],
        marks: vec![PlaylistMark::entry(0, 0), PlaylistMark::entry(0, UNIT_TIME)],
        ..Default::default()
    };
    write(root, &meta::playlist_path(1), &encode_playlist(&playlist));
    write(root, &meta::playlist_path(2), &encode_playlist(&playlist));
}
