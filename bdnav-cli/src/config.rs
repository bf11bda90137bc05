//! Configuration file (`bdnav.toml`).

use std::path::{Path, PathBuf};

use bdnav::{DecryptConfig, SessionConfig};
use serde::Deserialize;
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "bdnav.toml";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub decrypt: DecryptConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct SessionSection {
    pub event_capacity: Option<usize>,
    pub min_title_length: Option<u32>,
    /// Skip the duplicate filters when listing titles.
    pub all_titles: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

impl ConfigFile {
    pub fn parse(path: &Path, contents: &str) -> Result<ConfigFile, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    /// Explicit path, else `bdnav.toml` in the working directory when present.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit.map(Path::to_path_buf).or_else(|| {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            default_path.exists().then_some(default_path)
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            decrypt: self.decrypt.clone(),
            ..SessionConfig::default()
        };
        if let Some(capacity) = self.session.event_capacity {
            config.event_capacity = capacity;
        }
        if let Some(min) = self.session.min_title_length {
            config.min_title_length = min;
        }
        if self.session.all_titles == Some(true) {
            config.title_flags = bdnav::TITLES_ALL;
        }
        config
    }

    /// Command line wins when it differs from the built-in default.
    pub fn log_dir(&self, arg: &Path) -> PathBuf {
        if arg != Path::new(DEFAULT_LOG_DIR) {
            return arg.to_path_buf();
        }
        PathBuf::from(self.logging.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR))
    }

    pub fn retention_days(&self, arg: u64) -> u64 {
        if arg != DEFAULT_RETENTION_DAYS {
            return arg;
        }
        self.logging.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS)
    }
}
