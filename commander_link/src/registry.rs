//! Link registry.
//!
//! Provides a `LinkRegistry` struct for registering link factories by name
//! and opening links from them. Constructed by the composition root and
//! consulted once when the transport starts.

use std::collections::HashMap;

use tracing::info;

use crate::link::{Link, LinkError, LinkFactory, LinkSettings};
use crate::links::register_builtin_links;

/// Registry of available link drivers.
pub struct LinkRegistry {
    factories: HashMap<&'static str, LinkFactory>,
}

impl LinkRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in `serial` and `memory` links.
    pub fn with_builtin() -> Result<Self, LinkError> {
        let mut registry = Self::new();
        register_builtin_links(&mut registry)?;
        Ok(registry)
    }

    /// Register a link factory under `name`.
    ///
    /// # Errors
    /// Returns `LinkError::DuplicateLink` if the name is taken; the existing
    /// factory stays in place.
    pub fn register(&mut self, name: &'static str, factory: LinkFactory) -> Result<(), LinkError> {
        if self.factories.contains_key(name) {
            return Err(LinkError::DuplicateLink(name.to_string()));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Get a link factory by name.
    pub fn get_factory(&self, name: &str) -> Option<LinkFactory> {
        self.factories.get(name).copied()
    }

    /// Open a link by name.
    ///
    /// # Errors
    /// Returns `LinkError::UnknownLink` if no link with the given name is registered,
    /// or whatever the factory reports when the device cannot be opened.
    pub fn open(&self, name: &str, settings: &LinkSettings) -> Result<Box<dyn Link>, LinkError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| LinkError::UnknownLink(name.to_string()))?;
        let link = factory(settings)?;
        info!("Opened '{}' link on {}", link.name(), settings.device);
        Ok(link)
    }

    /// List all registered link names, sorted.
    pub fn list_links(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
