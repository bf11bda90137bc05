//! Session configuration.

use std::path::PathBuf;

use bdnav_decrypt::PluginRegistry;
use serde::Deserialize;

use crate::event::DEFAULT_EVENT_CAPACITY;
use crate::title::TITLES_RELEVANT;

/// Settings applied when a session is opened.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum pending events.
    pub event_capacity: usize,
    /// Default title list filters.
    pub title_flags: u8,
    /// Titles shorter than this many seconds are left out of the title list.
    pub min_title_length: u32,
    pub decrypt: DecryptConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            title_flags: TITLES_RELEVANT,
            min_title_length: 0,
            decrypt: DecryptConfig::default(),
        }
    }
}

/// `[decrypt]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DecryptConfig {
    pub enabled: bool,
    /// Shared library names tried in order; empty uses the built-in list.
    pub library_names: Vec<String>,
    /// Key database handed to the engine.
    pub keyfile: Option<PathBuf>,
}

impl Default for DecryptConfig {
    fn default() -> Self {
        DecryptConfig {
            enabled: true,
            library_names: Vec::new(),
            keyfile: None,
        }
    }
}

impl DecryptConfig {
    /// Plugin registry described by this section.
    pub fn registry(&self) -> PluginRegistry {
        if !self.enabled {
            PluginRegistry::empty()
        } else if self.library_names.is_empty() {
            PluginRegistry::default()
        } else {
            PluginRegistry::with_library_names(self.library_names.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.event_capacity, 32);
        assert_eq!(config.title_flags, TITLES_RELEVANT);
        assert!(config.decrypt.enabled);
        assert_eq!(config.decrypt.registry().len(), 1);
    }

    #[test]
    fn test_disabled_decrypt_has_no_plugins() {
        let config = DecryptConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(config.registry().is_empty());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SessionConfig = toml::from_str(
            r#"
            min_title_length = 120

            [decrypt]
            library_names = ["libaacs.so.0"]
            "#,
        )
        .unwrap();
        assert_eq!(config.min_title_length, 120);
        assert_eq!(config.event_capacity, 32);
        assert!(config.decrypt.enabled);
        assert_eq!(config.decrypt.library_names, vec!["libaacs.so.0".to_string()]);
    }
}
