use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{DEFAULT_LOG_DIR, DEFAULT_RETENTION_DAYS};

#[derive(Debug, Parser)]
#[clap(name = "bdnav-cli")]
#[clap(about = "Inspect Blu-ray disc structures and dump titles through a playback session.", long_about = None)]
#[clap(version)]
pub(crate) struct Cli {
    /// Root of the disc: the directory holding `BDMV/`.
    #[clap(value_name = "DISC_DIR")]
    pub disc: PathBuf,

    /// Configuration file path.{n}
    /// Defaults to `bdnav.toml` in the working directory when present.
    #[clap(short = 'f', long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Directory where log files are stored.
    #[clap(long, default_value = DEFAULT_LOG_DIR, global = true)]
    pub log_dir: PathBuf,

    /// Number of days to keep log files.
    #[clap(long, default_value_t = DEFAULT_RETENTION_DAYS, global = true)]
    pub log_retention_days: u64,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Show disc information and the index table.
    Info {
        #[clap(value_enum, long, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List playable titles.{n}
    /// Duplicate playlists are filtered out unless `--all` is given.
    Titles {
        /// Keep every playlist, including duplicates.
        #[clap(short, long)]
        all: bool,

        /// Skip titles shorter than this many seconds.
        #[clap(short = 'm', long, value_name = "seconds")]
        min_length: Option<u32>,

        #[clap(value_enum, long, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Read a title through the playback session and write its stream.{n}
    /// Events raised while reading are printed to stderr.
    Dump {
        /// Title number, 1-based, as printed by `titles`.
        #[clap(short, long, required = true)]
        title: usize,

        /// Angle, 1-based.
        #[clap(short, long)]
        angle: Option<u8>,

        /// Start at this chapter, 1-based.
        #[clap(short, long)]
        chapter: Option<usize>,

        /// Keep every playlist when numbering titles.
        #[clap(long)]
        all: bool,

        /// The location of the output.{n}
        /// If '-' is specified, the stream is written to stdout.
        #[clap(short, long, value_name = "FILE", required = true)]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dump() {
        let cli = Cli::try_parse_from([
            "bdnav-cli", "/media/bd", "dump", "-t", "2", "--angle", "2", "-c", "3", "-o", "out.m2ts",
        ])
        .unwrap();
        assert_eq!(cli.disc, PathBuf::from("/media/bd"));
        match cli.command {
            Commands::Dump { title, angle, chapter, all, output } => {
                assert_eq!(title, 2);
                assert_eq!(angle, Some(2));
                assert_eq!(chapter, Some(3));
                assert!(!all);
                assert_eq!(output, PathBuf::from("out.m2ts"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_titles_defaults() {
        let cli = Cli::try_parse_from(["bdnav-cli", "/media/bd", "titles", "--all"]).unwrap();
        assert_eq!(cli.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(cli.log_retention_days, DEFAULT_RETENTION_DAYS);
        match cli.command {
            Commands::Titles { all, min_length, format } => {
                assert!(all);
                assert_eq!(min_length, None);
                assert_eq!(format, OutputFormat::Table);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_dump_requires_output() {
        assert!(Cli::try_parse_from(["bdnav-cli", "/media/bd", "dump", "-t", "1"]).is_err());
    }
}
