//! bdnav-cli: inspect a Blu-ray disc folder and dump titles through a
//! playback session.

use std::process::ExitCode;

use bdnav::{Bluray, TITLES_ALL};
use clap::Parser;
use log::{debug, error};

mod commands;
mod config;
mod context;
mod logging;

use commands::DumpOptions;
use config::ConfigFile;
use context::{Cli, Commands};

fn main() -> ExitCode {
    let args = Cli::parse();

    // Config file: explicit path > auto-detect > default
    let file_config = match ConfigFile::locate(args.config.as_deref()) {
        Some(path) => match ConfigFile::load(&path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ConfigFile::default(),
    };

    let log_dir = file_config.log_dir(&args.log_dir);
    let retention_days = file_config.retention_days(args.log_retention_days);
    if let Err(e) = logging::init_logging(
        &log_dir,
        retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    ) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let session_config = file_config.session_config();
    debug!("Session config: {:?}", session_config);

    let bd = match Bluray::open_dir(&args.disc, &session_config) {
        Ok(bd) => bd,
        Err(e) => {
            error!("Failed to open {}: {}", args.disc.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let title_flags = |all: bool| if all { TITLES_ALL } else { session_config.title_flags };

    let result = match args.command {
        Commands::Info { format } => commands::cmd_info(&bd, format),
        Commands::Titles {
            all,
            min_length,
            format,
        } => commands::cmd_titles(
            &bd,
            title_flags(all),
            min_length.unwrap_or(session_config.min_title_length),
            format,
        ),
        Commands::Dump {
            title,
            angle,
            chapter,
            all,
            output,
        } => {
            let options = DumpOptions {
                title,
                angle,
                chapter,
                flags: title_flags(all),
                min_length: session_config.min_title_length,
            };
            commands::cmd_dump(&bd, options, &output)
        }
    };

    bd.close();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
