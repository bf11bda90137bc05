//! Registry of decryption plugins.

use std::path::Path;

use log::{debug, info, warn};

use crate::engine::{DecryptCapability, DecryptPlugin};
use crate::error::DecryptError;
use crate::library::LibraryPlugin;

/// Ordered list of plugins tried when a disc is opened.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn DecryptPlugin>>,
}

impl Default for PluginRegistry {
    /// Registry holding the shared-library plugin with its default names.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(LibraryPlugin::default()));
        registry
    }
}

impl PluginRegistry {
    /// Registry without any plugin; every disc resolves to `Absent`.
    pub fn empty() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Registry holding the shared-library plugin with explicit names.
    pub fn with_library_names(names: Vec<String>) -> Self {
        let mut registry = Self::empty();
        if names.is_empty() {
            registry.register(Box::new(LibraryPlugin::default()));
        } else {
            registry.register(Box::new(LibraryPlugin::new(names)));
        }
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn DecryptPlugin>) {
        debug!("[Decrypt] Registered plugin {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Try every plugin in order until one opens the disc.
    ///
    /// A plugin whose library is missing is skipped. If a plugin was found
    /// but failed to open the disc, its error code is kept as the result.
    pub fn resolve(&self, device: &Path, keyfile: Option<&Path>) -> DecryptCapability {
        let mut failure = None;

        for plugin in &self.plugins {
            match plugin.open(device, keyfile) {
                Ok(engine) => {
                    info!("[Decrypt] Using plugin {}", plugin.name());
                    return DecryptCapability::Present(engine);
                }
                Err(DecryptError::LibraryNotFound(tried)) => {
                    debug!("[Decrypt] Plugin {} unavailable: {}", plugin.name(), tried);
                }
                Err(DecryptError::OpenFailed { code }) => {
                    warn!("[Decrypt] Plugin {} failed: {}", plugin.name(), code);
                    failure.get_or_insert(code);
                }
                Err(e @ DecryptError::MissingSymbol(_)) => {
                    warn!("[Decrypt] Plugin {} unusable: {}", plugin.name(), e);
                }
            }
        }

        match failure {
            Some(code) => DecryptCapability::Failed(code),
            None => DecryptCapability::Absent,
        }
    }
}
