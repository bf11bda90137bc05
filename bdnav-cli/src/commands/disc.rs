//! `info` and `titles`.

use std::io::{self, Write};

use bdnav::formats::{DiscIndex, IndexObject, IndexTitle};
use bdnav::{Bluray, DiscInfo, TitleList};
use log::info;
use serde::Serialize;

use super::{format_ticks, CommandError};
use crate::context::OutputFormat;

#[derive(Serialize)]
struct InfoReport<'a> {
    disc: &'a DiscInfo,
    index: &'a DiscIndex,
}

pub(crate) fn cmd_info(bd: &Bluray, format: OutputFormat) -> Result<(), CommandError> {
    let stdout = io::stdout();
    write_info(&mut stdout.lock(), &bd.disc_info(), &bd.index(), format)
}

pub(crate) fn cmd_titles(
    bd: &Bluray,
    flags: u8,
    min_length: u32,
    format: OutputFormat,
) -> Result<(), CommandError> {
    let count = bd.get_titles(flags, min_length)?;
    info!("Found {} titles (flags 0x{:02x}, min length {}s)", count, flags, min_length);
    let titles = bd.title_list().unwrap_or_default();
    let stdout = io::stdout();
    write_titles(&mut stdout.lock(), &titles, format)
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn describe_object(object: &IndexObject) -> String {
    match &object.bdjo_name {
        Some(name) => format!("{:?} {}", object.object_type, name),
        None => format!("{:?} #{}", object.object_type, object.id_ref),
    }
}

fn describe_title(title: &IndexTitle) -> String {
    let mut s = describe_object(&title.object);
    if !title.accessible() {
        s.push_str(" (prohibited)");
    }
    if title.hidden() {
        s.push_str(" (hidden)");
    }
    s
}

pub(crate) fn write_info(
    out: &mut dyn Write,
    disc: &DiscInfo,
    index: &DiscIndex,
    format: OutputFormat,
) -> Result<(), CommandError> {
    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(&mut *out, &InfoReport { disc, index })?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "Disc Information:")?;
    writeln!(out, "  Blu-ray detected:   {}", yes_no(disc.bluray_detected))?;
    writeln!(out, "  First play:         {}", yes_no(disc.first_play_supported))?;
    writeln!(out, "  Top menu:           {}", yes_no(disc.top_menu_supported))?;
    writeln!(out, "  BD-J detected:      {}", yes_no(disc.bdj_detected))?;
    writeln!(
        out,
        "  Titles:             {} ({} HDMV, {} BD-J, {} unsupported)",
        disc.num_titles, disc.num_hdmv_titles, disc.num_bdj_titles, disc.num_unsupported_titles
    )?;
    writeln!(out, "  AACS detected:      {}", yes_no(disc.aacs_detected))?;
    writeln!(out, "  Decryption library: {}", yes_no(disc.libaacs_detected))?;
    writeln!(out, "  AACS handled:       {}", yes_no(disc.aacs_handled))?;
    if let Some(code) = disc.aacs_error() {
        writeln!(out, "  AACS error:         {}", code)?;
    }
    writeln!(out, "  3D content:         {}", yes_no(disc.content_exist_3d))?;
    writeln!(out)?;

    writeln!(out, "{:<8} {}", "Title", "Object")?;
    writeln!(out, "{}", "-".repeat(40))?;
    if let Some(object) = &index.first_play {
        writeln!(out, "{:<8} {}", "first", describe_object(object))?;
    }
    if let Some(object) = &index.top_menu {
        writeln!(out, "{:<8} {}", "menu", describe_object(object))?;
    }
    for (i, title) in index.titles.iter().enumerate() {
        writeln!(out, "{:<8} {}", i + 1, describe_title(title))?;
    }
    Ok(())
}

pub(crate) fn write_titles(
    out: &mut dyn Write,
    titles: &TitleList,
    format: OutputFormat,
) -> Result<(), CommandError> {
    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(&mut *out, titles)?;
        writeln!(out)?;
        return Ok(());
    }

    if titles.is_empty() {
        writeln!(out, "No titles found.")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<6} {:<9} {:<13} {:>5} {:>8} {:>6}",
        "Title", "Playlist", "Duration", "Clips", "Chapters", "Angles"
    )?;
    writeln!(out, "{}", "-".repeat(52))?;
    for (i, t) in titles.titles.iter().enumerate() {
        let main = if titles.main_title == Some(i) { " *" } else { "" };
        writeln!(
            out,
            "{:<6} {:<9} {:<13} {:>5} {:>8} {:>6}{}",
            i + 1,
            format!("{:05}", t.playlist),
            format_ticks(t.duration),
            t.clip_count,
            t.chapter_count,
            t.angle_count,
            main
        )?;
    }
    writeln!(out, "\nTotal: {} titles", titles.len())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixture;
    use bdnav::{SessionConfig, TITLES_ALL, TITLES_RELEVANT};

    fn open(dir: &tempfile::TempDir) -> Bluray {
        fixture::write_disc(dir.path());
        Bluray::open_dir(dir.path(), &SessionConfig::default()).unwrap()
    }

    fn render_titles(bd: &Bluray, flags: u8, format: OutputFormat) -> String {
        bd.get_titles(flags, 0).unwrap();
        let mut out = Vec::new();
        write_titles(&mut out, &bd.title_list().unwrap(), format).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_titles_table_filters_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let bd = open(&dir);
        let text = render_titles(&bd, TITLES_RELEVANT, OutputFormat::Table);
        assert!(text.contains("00001"));
        assert!(!text.contains("00002"));
        assert!(text.contains("0:00:02.002"));
        assert!(text.contains("Total: 1 titles"));
    }

    #[test]
    fn test_titles_all_keeps_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let bd = open(&dir);
        let text = render_titles(&bd, TITLES_ALL, OutputFormat::Table);
        assert!(text.contains("00002"));
        assert!(text.contains("Total: 2 titles"));
    }

    #[test]
    fn test_titles_json() {
        let dir = tempfile::tempdir().unwrap();
        let bd = open(&dir);
        let text = render_titles(&bd, TITLES_RELEVANT, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["titles"][0]["playlist"], 1);
        assert_eq!(value["titles"][0]["chapter_count"], 2);
        assert_eq!(value["main_title"], 0);
    }

    #[test]
    fn test_info_table() {
        let dir = tempfile::tempdir().unwrap();
        let bd = open(&dir);
        let mut out = Vec::new();
        write_info(&mut out, &bd.disc_info(), &bd.index(), OutputFormat::Table).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Top menu:           no"));
        assert!(text.contains("AACS detected:      no"));
        assert!(text.contains("first    Hdmv #0"));
        assert!(text.contains("1        Hdmv #1"));
    }

    #[test]
    fn test_info_json() {
        let dir = tempfile::tempdir().unwrap();
        let bd = open(&dir);
        let mut out = Vec::new();
        write_info(&mut out, &bd.disc_info(), &bd.index(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["disc"]["num_titles"], 1);
        assert_eq!(value["disc"]["aacs_handled"], false);
        assert!(value["index"]["titles"].is_array());
    }
}
