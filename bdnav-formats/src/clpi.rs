//! `*.clpi` clip information parsing.
//!
//! Layout:
//! ```text
//! 0   "HDMV" + version
//! 8   u32 SequenceInfo start address
//! 12  u32 ProgramInfo start address
//! 16  u32 CPI start address
//! 20  u32 ClipMark start address
//! 24  u32 extension data start address
//! 40  ClipInfo
//! ```
//! The CPI block holds the EP map: per stream PID a coarse table and a fine
//! table which together give the source packet number of each entry point.

use bytes::{BufMut, Bytes, BytesMut};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::bits::BitReader;
use crate::error::{FileKind, FormatError};
use crate::header::{check_address, read_header, Version, HEADER_END};
use crate::stream::{read_attributes, write_attributes, AttrLayout, StreamAttributes};

/// Size of one source packet (4-byte arrival timestamp + 188-byte TS packet).
pub const SOURCE_PACKET_SIZE: u64 = 192;

/// CPI type of an EP map.
const CPI_TYPE_EP_MAP: u8 = 1;

/// ClipInfo block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipAttributes {
    /// Clip stream type (1 = AV clip).
    pub clip_stream_type: u8,
    /// Application type (1 = movie, 2 = time-based slideshow, ...).
    pub application_type: u8,
    pub is_atc_delta: bool,
    /// Transport stream recording rate in bytes per second.
    pub ts_recording_rate: u32,
    /// Number of source packets in the clip file.
    pub num_source_packets: u32,
}

/// System time clock sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StcSequence {
    pub pcr_pid: u16,
    pub spn_stc_start: u32,
    /// 45 kHz.
    pub presentation_start_time: u32,
    /// 45 kHz.
    pub presentation_end_time: u32,
}

/// Arrival time clock sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtcSequence {
    pub spn_atc_start: u32,
    pub offset_stc_id: u8,
    pub stc_sequences: Vec<StcSequence>,
}

/// Elementary stream declared by a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStream {
    pub pid: u16,
    pub attributes: StreamAttributes,
}

/// Program sequence of the clip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub spn_program_sequence_start: u32,
    pub program_map_pid: u16,
    pub num_groups: u8,
    pub streams: Vec<ProgramStream>,
}

/// Flattened EP map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Presentation time in 45 kHz ticks.
    pub pts: u32,
    /// Source packet number.
    pub spn: u32,
    pub angle_change_point: bool,
    pub i_end_position_offset: u8,
}

impl EntryPoint {
    pub fn new(pts: u32, spn: u32) -> Self {
        EntryPoint {
            pts,
            spn,
            angle_change_point: false,
            i_end_position_offset: 0,
        }
    }
}

/// EP map of one stream PID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpMapStream {
    pub pid: u16,
    pub ep_stream_type: u8,
    /// Entry points ordered by time.
    pub entries: Vec<EntryPoint>,
}

/// Decoded clip information file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipInfo {
    pub version: Version,
    pub clip: ClipAttributes,
    pub sequences: Vec<AtcSequence>,
    pub programs: Vec<Program>,
    pub ep_map: Vec<EpMapStream>,
}

impl ClipInfo {
    /// True when any program declares `pid`.
    pub fn has_pid(&self, pid: u16) -> bool {
        self.programs
            .iter()
            .flat_map(|p| p.streams.iter())
            .any(|s| s.pid == pid)
    }

    fn entry_points(&self) -> &[EntryPoint] {
        self.ep_map
            .first()
            .map(|s| s.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Translate a clip time (45 kHz) into a source packet number.
    ///
    /// With `before` set the entry at or before `pts` is used, 0 when `pts`
    /// precedes the first entry. Otherwise the first entry after `pts` is used,
    /// or the packet count when there is none.
    pub fn lookup_spn(&self, pts: u32, before: bool) -> u32 {
        let entries = self.entry_points();
        let after = entries.partition_point(|e| e.pts <= pts);
        if before {
            match after {
                0 => 0,
                n => entries[n - 1].spn,
            }
        } else {
            entries
                .get(after)
                .map(|e| e.spn)
                .unwrap_or(self.clip.num_source_packets)
                .min(self.clip.num_source_packets)
        }
    }

    /// Clip time (45 kHz) of the last entry point at or before `spn`.
    pub fn lookup_pts(&self, spn: u32) -> Option<u32> {
        self.entry_points()
            .iter()
            .take_while(|e| e.spn <= spn)
            .last()
            .map(|e| e.pts)
    }
}

fn read_clip_attributes(r: &mut BitReader<'_>) -> Result<ClipAttributes, FormatError> {
    let end = r.block(32)?;
    r.skip(16)?;
    let clip_stream_type = r.read_u8()?;
    let application_type = r.read_u8()?;
    r.skip(31)?;
    let is_atc_delta = r.read_bool()?;
    let ts_recording_rate = r.read_u32()?;
    let num_source_packets = r.read_u32()?;
    r.end_block(end)?;

    Ok(ClipAttributes {
        clip_stream_type,
        application_type,
        is_atc_delta,
        ts_recording_rate,
        num_source_packets,
    })
}

fn read_sequence_info(r: &mut BitReader<'_>) -> Result<Vec<AtcSequence>, FormatError> {
    let end = r.block(32)?;
    r.skip(8)?;
    let num_atc = r.read_u8()?;
    let mut sequences = Vec::with_capacity(num_atc as usize);
    for _ in 0..num_atc {
        let spn_atc_start = r.read_u32()?;
        let num_stc = r.read_u8()?;
        let offset_stc_id = r.read_u8()?;
        let mut stc_sequences = Vec::with_capacity(num_stc as usize);
        for _ in 0..num_stc {
            stc_sequences.push(StcSequence {
                pcr_pid: r.read_u16()?,
                spn_stc_start: r.read_u32()?,
                presentation_start_time: r.read_u32()?,
                presentation_end_time: r.read_u32()?,
            });
        }
        sequences.push(AtcSequence {
            spn_atc_start,
            offset_stc_id,
            stc_sequences,
        });
    }
    r.end_block(end)?;
    Ok(sequences)
}

fn read_program_info(r: &mut BitReader<'_>) -> Result<Vec<Program>, FormatError> {
    let end = r.block(32)?;
    r.skip(8)?;
    let num_prog = r.read_u8()?;
    let mut programs = Vec::with_capacity(num_prog as usize);
    for _ in 0..num_prog {
        let spn_program_sequence_start = r.read_u32()?;
        let program_map_pid = r.read_u16()?;
        let num_streams = r.read_u8()?;
        let num_groups = r.read_u8()?;
        let mut streams = Vec::with_capacity(num_streams as usize);
        for _ in 0..num_streams {
            let pid = r.read_u16()?;
            let attributes = read_attributes(r, AttrLayout::ClipInfo)?;
            streams.push(ProgramStream { pid, attributes });
        }
        programs.push(Program {
            spn_program_sequence_start,
            program_map_pid,
            num_groups,
            streams,
        });
    }
    r.end_block(end)?;
    Ok(programs)
}

struct EpStreamHeader {
    pid: u16,
    ep_stream_type: u8,
    num_coarse: usize,
    num_fine: usize,
    start: usize,
}

struct CoarseEntry {
    ref_ep_fine_id: usize,
    pts_ep: u32,
    spn_ep: u32,
}

fn read_ep_map_stream(
    r: &mut BitReader<'_>,
    header: &EpStreamHeader,
) -> Result<Vec<EntryPoint>, FormatError> {
    r.seek_byte(header.start)?;
    let fine_start = r.read_u32()? as usize;

    let mut coarse = Vec::with_capacity(header.num_coarse);
    for _ in 0..header.num_coarse {
        coarse.push(CoarseEntry {
            ref_ep_fine_id: r.read(18)? as usize,
            pts_ep: r.read(14)?,
            spn_ep: r.read_u32()?,
        });
    }

    if header.num_fine > 0 && coarse.first().map(|c| c.ref_ep_fine_id) != Some(0) {
        return Err(r.corrupt("EP map fine entries without coarse entry"));
    }
    for pair in coarse.windows(2) {
        if pair[1].ref_ep_fine_id < pair[0].ref_ep_fine_id {
            return Err(r.corrupt("EP map coarse entries out of order"));
        }
    }
    if coarse.iter().any(|c| c.ref_ep_fine_id >= header.num_fine.max(1)) {
        return Err(r.corrupt("EP map coarse entry references missing fine entry"));
    }

    r.seek_byte(header.start + fine_start)?;
    let mut entries = Vec::with_capacity(header.num_fine);
    let mut current = 0usize;
    for fine_id in 0..header.num_fine {
        while current + 1 < coarse.len() && coarse[current + 1].ref_ep_fine_id <= fine_id {
            current += 1;
        }
        let angle_change_point = r.read_bool()?;
        let i_end_position_offset = r.read(3)? as u8;
        let pts_ep = r.read(11)?;
        let spn_ep = r.read(17)?;

        let c = &coarse[current];
        let pts = (((c.pts_ep & !1) as u64) << 18) + ((pts_ep as u64) << 8);
        let spn = (c.spn_ep & !0x1FFFF) + spn_ep;
        entries.push(EntryPoint {
            pts: pts as u32,
            spn,
            angle_change_point,
            i_end_position_offset,
        });
    }

    entries.sort_by_key(|e| e.pts);
    Ok(entries)
}

fn read_cpi(r: &mut BitReader<'_>) -> Result<Vec<EpMapStream>, FormatError> {
    let len = r.read_u32()? as usize;
    if len == 0 {
        return Ok(Vec::new());
    }
    if r.byte_pos() + len > r.len() {
        return Err(r.corrupt("CPI length exceeds file size"));
    }
    r.skip(12)?;
    let cpi_type = r.read(4)? as u8;
    if cpi_type != CPI_TYPE_EP_MAP {
        debug!("[Clpi] Ignoring CPI of type {}", cpi_type);
        return Ok(Vec::new());
    }

    let ep_map_pos = r.byte_pos();
    r.skip(8)?;
    let num_stream_pid = r.read_u8()?;
    let mut headers = Vec::with_capacity(num_stream_pid as usize);
    for _ in 0..num_stream_pid {
        let pid = r.read_u16()?;
        r.skip(10)?;
        let ep_stream_type = r.read(4)? as u8;
        let num_coarse = r.read_u16()? as usize;
        let num_fine = r.read(18)? as usize;
        let start = ep_map_pos + r.read_u32()? as usize;
        if start >= r.len() {
            return Err(r.corrupt("EP map stream address out of range"));
        }
        headers.push(EpStreamHeader {
            pid,
            ep_stream_type,
            num_coarse,
            num_fine,
            start,
        });
    }

    let mut streams = Vec::with_capacity(headers.len());
    for h in &headers {
        streams.push(EpMapStream {
            pid: h.pid,
            ep_stream_type: h.ep_stream_type,
            entries: read_ep_map_stream(r, h)?,
        });
    }
    Ok(streams)
}

/// Parse a complete `*.clpi` image.
pub fn parse_clip_info(data: &[u8]) -> Result<ClipInfo, FormatError> {
    let kind = FileKind::ClipInfo;
    let mut r = BitReader::new(data, kind);
    let version = read_header(&mut r, kind)?;

    let sequence_pos = r.read_u32()?;
    let program_pos = r.read_u32()?;
    let cpi_pos = r.read_u32()?;
    let mark_pos = r.read_u32()?;
    let ext_pos = r.read_u32()?;
    let sequence_pos = check_address(&r, kind, sequence_pos, false)?.unwrap_or(HEADER_END);
    let program_pos = check_address(&r, kind, program_pos, false)?.unwrap_or(HEADER_END);
    let cpi_pos = check_address(&r, kind, cpi_pos, true)?;
    check_address(&r, kind, mark_pos, true)?;
    check_address(&r, kind, ext_pos, true)?;

    r.seek_byte(HEADER_END)?;
    let clip = read_clip_attributes(&mut r)?;

    r.seek_byte(sequence_pos)?;
    let sequences = read_sequence_info(&mut r)?;

    r.seek_byte(program_pos)?;
    let programs = read_program_info(&mut r)?;

    let ep_map = match cpi_pos {
        Some(pos) => {
            r.seek_byte(pos)?;
            read_cpi(&mut r)?
        }
        None => Vec::new(),
    };

    for stream in &ep_map {
        if stream.entries.iter().any(|e| e.spn > clip.num_source_packets) {
            return Err(kind.corrupt("EP map entry beyond clip end", cpi_pos.unwrap_or(0)));
        }
    }

    debug!(
        "[Clpi] Parsed clip info: packets={}, programs={}, ep_streams={}",
        clip.num_source_packets,
        programs.len(),
        ep_map.len()
    );

    Ok(ClipInfo {
        version,
        clip,
        sequences,
        programs,
        ep_map,
    })
}

fn put_ep_map_stream(entries: &[EntryPoint]) -> (usize, usize, BytesMut) {
    let mut coarse: Vec<(usize, u32, u32)> = Vec::new();
    let mut fine = BytesMut::new();

    for (id, e) in entries.iter().enumerate() {
        let pts90 = e.pts as u64 * 2;
        let coarse_pts = ((pts90 >> 19) & 0x3FFF) as u32;
        let fine_pts = ((pts90 >> 9) & 0x7FF) as u32;
        let new_coarse = match coarse.last() {
            Some(&(_, pts, spn)) => pts != coarse_pts || (spn & !0x1FFFF) != (e.spn & !0x1FFFF),
            None => true,
        };
        if new_coarse {
            coarse.push((id, coarse_pts, e.spn));
        }
        fine.put_u32(
            (e.angle_change_point as u32) << 31
                | (e.i_end_position_offset as u32 & 0x07) << 28
                | fine_pts << 17
                | (e.spn & 0x1FFFF),
        );
    }

    let mut body = BytesMut::new();
    body.put_u32(4 + 8 * coarse.len() as u32);
    for &(id, pts, spn) in &coarse {
        body.put_u32((id as u32) << 14 | pts);
        body.put_u32(spn);
    }
    body.put_slice(&fine);
    (coarse.len(), entries.len(), body)
}

/// Encode a [`ClipInfo`] into its on-disc representation.
///
/// Entry point times are stored with 256-tick (45 kHz) precision, so only
/// times that are multiples of 256 survive a parse of the output unchanged.
pub fn encode_clip_info(info: &ClipInfo) -> Bytes {
    let c = &info.clip;
    let mut clip_body = BytesMut::new();
    clip_body.put_u16(0);
    clip_body.put_u8(c.clip_stream_type);
    clip_body.put_u8(c.application_type);
    clip_body.put_u32(c.is_atc_delta as u32);
    clip_body.put_u32(c.ts_recording_rate);
    clip_body.put_u32(c.num_source_packets);
    clip_body.put_bytes(0, 128);
    clip_body.put_u16(0);

    let mut seq_body = BytesMut::new();
    seq_body.put_u8(0);
    seq_body.put_u8(info.sequences.len() as u8);
    for atc in &info.sequences {
        seq_body.put_u32(atc.spn_atc_start);
        seq_body.put_u8(atc.stc_sequences.len() as u8);
        seq_body.put_u8(atc.offset_stc_id);
        for stc in &atc.stc_sequences {
            seq_body.put_u16(stc.pcr_pid);
            seq_body.put_u32(stc.spn_stc_start);
            seq_body.put_u32(stc.presentation_start_time);
            seq_body.put_u32(stc.presentation_end_time);
        }
    }

    let mut prog_body = BytesMut::new();
    prog_body.put_u8(0);
    prog_body.put_u8(info.programs.len() as u8);
    for prog in &info.programs {
        prog_body.put_u32(prog.spn_program_sequence_start);
        prog_body.put_u16(prog.program_map_pid);
        prog_body.put_u8(prog.streams.len() as u8);
        prog_body.put_u8(prog.num_groups);
        for stream in &prog.streams {
            prog_body.put_u16(stream.pid);
            write_attributes(&mut prog_body, &stream.attributes, AttrLayout::ClipInfo);
        }
    }

    // EP map offsets are relative to the byte after the CPI type field.
    let mut ep_map = BytesMut::new();
    ep_map.put_u8(0);
    ep_map.put_u8(info.ep_map.len() as u8);
    let encoded: Vec<_> = info
        .ep_map
        .iter()
        .map(|s| put_ep_map_stream(&s.entries))
        .collect();
    let mut stream_start = 2 + 12 * info.ep_map.len();
    for (stream, (num_coarse, num_fine, body)) in info.ep_map.iter().zip(&encoded) {
        ep_map.put_u16(stream.pid);
        ep_map.put_uint(
            (stream.ep_stream_type as u64 & 0x0F) << 34
                | (*num_coarse as u64) << 18
                | (*num_fine as u64 & 0x3FFFF),
            6,
        );
        ep_map.put_u32(stream_start as u32);
        stream_start += body.len();
    }
    for (_, _, body) in &encoded {
        ep_map.put_slice(body);
    }

    let mut cpi_body = BytesMut::new();
    if !info.ep_map.is_empty() {
        cpi_body.put_u16(CPI_TYPE_EP_MAP as u16);
        cpi_body.put_slice(&ep_map);
    }

    let sequence_pos = HEADER_END + 4 + clip_body.len();
    let program_pos = sequence_pos + 4 + seq_body.len();
    let cpi_pos = program_pos + 4 + prog_body.len();
    let mark_pos = cpi_pos + 4 + cpi_body.len();

    let mut buf = BytesMut::new();
    buf.put_slice(FileKind::ClipInfo.magic());
    buf.put_slice(info.version.as_bytes());
    buf.put_u32(sequence_pos as u32);
    buf.put_u32(program_pos as u32);
    buf.put_u32(cpi_pos as u32);
    buf.put_u32(mark_pos as u32);
    buf.put_u32(0);
    buf.put_bytes(0, HEADER_END - 28);
    for body in [&clip_body, &seq_body, &prog_body, &cpi_body] {
        buf.put_u32(body.len() as u32);
        buf.put_slice(body);
    }
    buf.put_u32(0);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::coding_type;

    fn sample_clip() -> ClipInfo {
        ClipInfo {
            version: Version::V0200,
            clip: ClipAttributes {
                clip_stream_type: 1,
                application_type: 1,
                is_atc_delta: false,
                ts_recording_rate: 6_000_000,
                num_source_packets: 0x30000,
            },
            sequences: vec![AtcSequence {
                spn_atc_start: 0,
                offset_stc_id: 0,
                stc_sequences: vec![StcSequence {
                    pcr_pid: 0x1001,
                    spn_stc_start: 0,
                    presentation_start_time: 0,
                    presentation_end_time: 0x0100_0000,
                }],
            }],
            programs: vec![Program {
                spn_program_sequence_start: 0,
                program_map_pid: 0x0100,
                num_groups: 0,
                streams: vec![
                    ProgramStream {
                        pid: 0x1011,
                        attributes: StreamAttributes {
                            coding_type: coding_type::H264,
                            format: 6,
                            rate: 1,
                            aspect: 3,
                            ..Default::default()
                        },
                    },
                    ProgramStream {
                        pid: 0x1100,
                        attributes: StreamAttributes {
                            coding_type: coding_type::DTSHD_MASTER,
                            format: 6,
                            rate: 1,
                            lang: "eng".into(),
                            ..Default::default()
                        },
                    },
                ],
            }],
            ep_map: vec![EpMapStream {
                pid: 0x1011,
                ep_stream_type: 1,
                entries: vec![
                    EntryPoint::new(0, 0),
                    EntryPoint::new(256 * 100, 1000),
                    // Crosses into a new coarse entry both in time and packet number.
                    EntryPoint::new(256 * 5000, 0x20010),
                    EntryPoint {
                        pts: 256 * 5001,
                        spn: 0x20100,
                        angle_change_point: true,
                        i_end_position_offset: 3,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_parse_encoded_clip_info() {
        let clip = sample_clip();
        let parsed = parse_clip_info(&encode_clip_info(&clip)).unwrap();
        assert_eq!(parsed, clip);
        assert!(parsed.has_pid(0x1100));
        assert!(!parsed.has_pid(0x1200));
    }

    #[test]
    fn test_lookup_spn() {
        let clip = sample_clip();
        assert_eq!(clip.lookup_spn(0, true), 0);
        assert_eq!(clip.lookup_spn(256 * 100 + 10, true), 1000);
        assert_eq!(clip.lookup_spn(256 * 6000, true), 0x20100);

        assert_eq!(clip.lookup_spn(256 * 100, false), 0x20010);
        assert_eq!(clip.lookup_spn(256 * 6000, false), 0x30000);
    }

    #[test]
    fn test_lookup_pts() {
        let clip = sample_clip();
        assert_eq!(clip.lookup_pts(999), Some(0));
        assert_eq!(clip.lookup_pts(1000), Some(256 * 100));
        assert_eq!(clip.lookup_pts(0x30000), Some(256 * 5001));
    }

    #[test]
    fn test_clip_without_streams_is_valid() {
        let clip = ClipInfo::default();
        let parsed = parse_clip_info(&encode_clip_info(&clip)).unwrap();
        assert!(parsed.programs.is_empty());
        assert!(parsed.ep_map.is_empty());
        assert_eq!(parsed.lookup_spn(1234, true), 0);
        assert_eq!(parsed.lookup_pts(0), None);
    }

    #[test]
    fn test_entry_beyond_clip_rejected() {
        let mut clip = sample_clip();
        clip.clip.num_source_packets = 0x20000;
        assert!(matches!(
            parse_clip_info(&encode_clip_info(&clip)),
            Err(FormatError::CorruptClipInfo {
                reason: "EP map entry beyond clip end",
                ..
            })
        ));
    }

    #[test]
    fn test_truncated_clip_info_rejected() {
        let data = encode_clip_info(&sample_clip());
        for cut in [30, 100, data.len() - 8] {
            assert!(
                matches!(parse_clip_info(&data[..cut]), Err(FormatError::CorruptClipInfo { .. })),
                "cut at {}",
                cut
            );
        }
    }
}
