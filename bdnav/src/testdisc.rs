//! In-memory discs for unit tests.

use std::collections::HashMap;

use bdnav_formats::{
    coding_type, encode_clip_info, encode_index, encode_playlist, ClipAttributes, ClipInfo,
    ClipRef, DiscIndex, EntryPoint, EpMapStream, IndexObject, IndexTitle, PlayItem, Playlist,
    PlaylistMark, Program, ProgramStream, StillMode, StreamAttributes, StreamEntry, StreamSource,
    SOURCE_PACKET_SIZE,
};

use crate::disc::MemoryDisc;
use crate::meta;

/// Clip time (45 kHz) covered by one 32-packet unit.
pub const UNIT_TIME: u32 = 45_056;
pub const UNIT_BYTES: usize = 6144;

pub const VIDEO_PID: u16 = 0x1011;
pub const AUDIO_PIDS: [u16; 2] = [0x1100, 0x1101];
pub const PG_PID: u16 = 0x1200;

/// Marker placed in byte 1 of a unit that test engines refuse to decrypt.
pub const BAD_UNIT_MARK: u8 = 0xEE;

#[derive(Debug, Clone)]
pub struct ClipSpec {
    pub packets: u32,
    pub programs: bool,
    pub encrypted: bool,
    pub bad_units: Vec<u32>,
}

impl ClipSpec {
    pub fn plain(packets: u32) -> Self {
        ClipSpec {
            packets,
            programs: true,
            encrypted: false,
            bad_units: Vec::new(),
        }
    }

    pub fn without_programs(mut self) -> Self {
        self.programs = false;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn with_bad_unit(mut self, unit: u32) -> Self {
        self.bad_units.push(unit);
        self
    }

    pub fn units(&self) -> u32 {
        self.packets.div_ceil(32)
    }

    pub fn duration(&self) -> u32 {
        self.units() * UNIT_TIME
    }
}

fn attrs(coding: u8, lang: &str) -> StreamAttributes {
    StreamAttributes {
        coding_type: coding,
        lang: lang.to_string(),
        ..Default::default()
    }
}

pub fn audio_entry(pid: u16) -> StreamEntry {
    StreamEntry {
        source: StreamSource::PlayItem { pid },
        attributes: attrs(coding_type::AC3, if pid == AUDIO_PIDS[0] { "eng" } else { "jpn" }),
    }
}

fn clip_info(spec: &ClipSpec) -> ClipInfo {
    let programs = if spec.programs {
        vec![Program {
            program_map_pid: 0x0100,
            streams: vec![
                ProgramStream { pid: VIDEO_PID, attributes: attrs(coding_type::H264, "") },
                ProgramStream { pid: AUDIO_PIDS[0], attributes: attrs(coding_type::AC3, "eng") },
                ProgramStream { pid: AUDIO_PIDS[1], attributes: attrs(coding_type::AC3, "jpn") },
                ProgramStream { pid: PG_PID, attributes: attrs(coding_type::PG, "eng") },
            ],
            ..Default::default()
        }]
    } else {
        Vec::new()
    };
    let entries = (0..spec.units())
        .map(|k| EntryPoint::new(k * UNIT_TIME, k * 32))
        .collect();
    ClipInfo {
        clip: ClipAttributes {
            clip_stream_type: 1,
            application_type: 1,
            ts_recording_rate: 6_000_000,
            num_source_packets: spec.packets,
            ..Default::default()
        },
        programs,
        ep_map: vec![EpMapStream {
            pid: VIDEO_PID,
            ep_stream_type: 1,
            entries,
        }],
        ..Default::default()
    }
}

/// Byte `i` of packet `k` of a generated stream file.
pub fn packet_byte(k: u32, i: usize) -> u8 {
    match i {
        0 => 0,
        1..=3 => (k >> (8 * (3 - i))) as u8,
        4 => 0x47,
        _ => k as u8,
    }
}

fn stream_file(spec: &ClipSpec) -> Vec<u8> {
    let mut data = Vec::with_capacity(spec.packets as usize * SOURCE_PACKET_SIZE as usize);
    for k in 0..spec.packets {
        for i in 0..SOURCE_PACKET_SIZE as usize {
            data.push(packet_byte(k, i));
        }
        if spec.encrypted {
            let start = k as usize * SOURCE_PACKET_SIZE as usize;
            data[start] |= 0xC0;
        }
    }
    for &unit in &spec.bad_units {
        let idx = unit as usize * UNIT_BYTES + 1;
        if idx < data.len() {
            data[idx] = BAD_UNIT_MARK;
        }
    }
    data
}

pub struct TestDisc {
    pub disc: MemoryDisc,
    clips: HashMap<String, ClipSpec>,
}

impl TestDisc {
    /// Disc with an index of two HDMV titles and no playlists.
    pub fn new() -> Self {
        let mut disc = TestDisc {
            disc: MemoryDisc::new(),
            clips: HashMap::new(),
        };
        disc.set_index(&DiscIndex {
            first_play: Some(IndexObject::hdmv(0, false)),
            top_menu: Some(IndexObject::hdmv(1, true)),
            titles: vec![
                IndexTitle { object: IndexObject::hdmv(2, false), access_type: 0 },
                IndexTitle { object: IndexObject::bdj("00003", false), access_type: 0 },
                IndexTitle {
                    object: IndexObject::hdmv(4, false),
                    access_type: bdnav_formats::index::ACCESS_PROHIBITED,
                },
            ],
            ..Default::default()
        });
        disc
    }

    pub fn set_index(&mut self, index: &DiscIndex) {
        self.disc.insert(meta::INDEX_PATH, encode_index(index));
    }

    pub fn add_clip(&mut self, clip_id: &str, spec: &ClipSpec) {
        self.disc
            .insert(&meta::clip_info_path(clip_id), encode_clip_info(&clip_info(spec)));
        self.disc
            .insert(&meta::stream_path(clip_id), stream_file(spec));
        self.clips.insert(clip_id.to_string(), spec.clone());
    }

    pub fn add_playlist(&mut self, id: u32, playlist: &Playlist) {
        self.disc
            .insert(&meta::playlist_path(id), encode_playlist(playlist));
    }

    /// Play item covering the whole clip with the standard stream table.
    pub fn play_item(&self, clip_id: &str) -> PlayItem {
        let spec = &self.clips[clip_id];
        let mut item = PlayItem::new(clip_id, 0, spec.duration());
        if spec.programs {
            item.stn.video.push(StreamEntry {
                source: StreamSource::PlayItem { pid: VIDEO_PID },
                attributes: attrs(coding_type::H264, ""),
            });
            item.stn.audio.extend(AUDIO_PIDS.iter().map(|&pid| audio_entry(pid)));
            item.stn.pg.push(StreamEntry {
                source: StreamSource::PlayItem { pid: PG_PID },
                attributes: attrs(coding_type::PG, "eng"),
            });
        }
        item
    }

    /// Playlist of whole clips with one chapter per play item.
    pub fn simple_playlist(&self, clip_ids: &[&str]) -> Playlist {
        Playlist {
            play_items: clip_ids.iter().map(|id| self.play_item(id)).collect(),
            marks: (0..clip_ids.len())
                .map(|i| PlaylistMark::entry(i as u16, 0))
                .collect(),
            ..Default::default()
        }
    }
}

/// Clips and playlists shared by the title and session tests.
///
/// | playlist | content                                         |
/// |----------|-------------------------------------------------|
/// | 00001    | 00001 + 00002, chapters at 0, 1 unit, clip 2    |
/// | 00002    | copy of 00001                                   |
/// | 00003    | 00001 with angle 2 on 00003, no marks           |
/// | 00004    | 00002 three times                               |
/// | 00006    | first unit of 00002                             |
/// | 00007    | 00002 with a 5 second still, then 00001         |
pub fn standard() -> TestDisc {
    let mut disc = TestDisc::new();
    disc.add_clip("00001", &ClipSpec::plain(96));
    disc.add_clip("00002", &ClipSpec::plain(64));
    disc.add_clip("00003", &ClipSpec::plain(96));

    let mut main = disc.simple_playlist(&["00001", "00002"]);
    main.marks = vec![
        PlaylistMark::entry(0, 0),
        PlaylistMark::entry(0, UNIT_TIME),
        PlaylistMark::entry(1, 0),
    ];
    disc.add_playlist(1, &main);
    disc.add_playlist(2, &main);

    let mut angles = disc.simple_playlist(&["00001"]);
    angles.play_items[0].clips.push(ClipRef::new("00003"));
    angles.marks.clear();
    disc.add_playlist(3, &angles);

    disc.add_playlist(4, &disc.simple_playlist(&["00002", "00002", "00002"]));

    let mut short = disc.simple_playlist(&["00002"]);
    short.play_items[0].out_time = UNIT_TIME;
    disc.add_playlist(6, &short);

    let mut still = disc.simple_playlist(&["00002", "00001"]);
    still.play_items[0].still_mode = StillMode::Timed;
    still.play_items[0].still_time = 5;
    disc.add_playlist(7, &still);

    disc
}
