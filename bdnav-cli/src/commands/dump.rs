//! `dump`: stream a title through the playback session.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use bdnav::decrypt::ALIGNED_UNIT_SIZE;
use bdnav::{Bluray, Event, EventType, SessionError, SessionState};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{info, warn};

use super::{format_ticks, CommandError};

const READ_UNITS: usize = 32;

#[derive(Debug, Clone, Copy)]
pub(crate) struct DumpOptions {
    /// 1-based.
    pub title: usize,
    /// 1-based.
    pub angle: Option<u8>,
    /// 1-based.
    pub chapter: Option<usize>,
    pub flags: u8,
    pub min_length: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DumpStats {
    pub bytes: u64,
    pub skipped_units: u64,
    pub events: u64,
}

pub(crate) fn cmd_dump(bd: &Bluray, options: DumpOptions, output: &Path) -> Result<(), CommandError> {
    let stats = if output == Path::new("-") {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        dump_title(bd, &options, &mut lock, true)?
    } else {
        let mut file = BufWriter::new(File::create(output)?);
        let stats = dump_title(bd, &options, &mut file, true)?;
        file.flush()?;
        stats
    };
    info!(
        "Wrote {} bytes to {} ({} units skipped, {} events)",
        stats.bytes,
        output.display(),
        stats.skipped_units,
        stats.events
    );
    Ok(())
}

fn select(bd: &Bluray, options: &DumpOptions) -> Result<(), CommandError> {
    let count = bd.get_titles(options.flags, options.min_length)?;
    if options.title == 0 || options.title > count {
        return Err(CommandError::NoSuchTitle(options.title, count));
    }
    bd.select_title(options.title - 1)?;

    if let Some(angle) = options.angle {
        let angle = angle
            .checked_sub(1)
            .ok_or_else(|| CommandError::InvalidArgument("angles are numbered from 1".into()))?;
        bd.select_angle(angle)?;
    }
    if let Some(chapter) = options.chapter {
        let chapter = chapter
            .checked_sub(1)
            .ok_or_else(|| CommandError::InvalidArgument("chapters are numbered from 1".into()))?;
        bd.seek_chapter(chapter)?;
    }
    Ok(())
}

fn report(event: &Event, bd: &Bluray) {
    match event.event {
        EventType::Error | EventType::ReadError | EventType::Encrypted => {
            warn!("Event {} at byte {}", event, bd.tell())
        }
        EventType::Seek => eprintln!("event: {} ({})", event, format_ticks(event.param as u64 * 2)),
        _ => eprintln!("event: {}", event),
    }
}

/// Read the selected title to the end, writing it to `out`.
pub(crate) fn dump_title(
    bd: &Bluray,
    options: &DumpOptions,
    out: &mut dyn Write,
    progress: bool,
) -> Result<DumpStats, CommandError> {
    select(bd, options)?;

    let size = bd.get_title_size().unwrap_or(0);
    let bar = if progress {
        ProgressBar::with_draw_target(Some(size), ProgressDrawTarget::stderr())
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_position(bd.tell());

    let mut stats = DumpStats::default();
    let mut buf = vec![0u8; ALIGNED_UNIT_SIZE * READ_UNITS];
    loop {
        let n = match bd.read(&mut buf) {
            Ok(n) => n,
            // The session has already moved past the unit.
            Err(SessionError::UnitDecryptFailed { unit }) => {
                warn!("Skipping unit at byte {}", unit);
                stats.skipped_units += 1;
                continue;
            }
            Err(e) => {
                bar.abandon();
                return Err(e.into());
            }
        };
        out.write_all(&buf[..n])?;
        stats.bytes += n as u64;
        bar.set_position(bd.tell());

        while let Some(event) = bd.get_event() {
            stats.events += 1;
            bar.suspend(|| report(&event, bd));
        }

        if n == 0 {
            if bd.state() != SessionState::Still {
                break;
            }
            bd.read_skip_still()?;
        }
    }
    bar.finish_and_clear();
    Ok(stats)
}
