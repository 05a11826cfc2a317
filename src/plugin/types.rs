//! Plugin type definitions
//!
//! This module defines the plugin contract and the data structures that
//! travel with it: metadata, the on-disk manifest and lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::core::error::Result;
use crate::feature::Feature;
use super::registry::PluginRegistry;

/// Unique identifier for a plugin instance (its name)
pub type PluginId = String;

/// Base plugin trait that all plugins must implement
///
/// Registration and initialization are separate phases: every plugin is
/// registered before any of them is initialized, so `initialize` may look up
/// sibling plugins through the registry.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// Get plugin metadata
    fn metadata(&self) -> &PluginMetadata;

    /// Initialize the plugin
    ///
    /// Called once per process after all plugins are registered. May register
    /// slot content. Implementations must tolerate being called twice.
    async fn initialize(&self, registry: &PluginRegistry) -> Result<()>;

    /// Release held resources
    ///
    /// Called once at teardown, in registration order.
    async fn shutdown(&self) -> Result<()>;

    /// Features contributed to the catalog
    fn features(&self) -> Vec<Feature> {
        Vec::new()
    }

    /// Get a reference to self as Any for downcasting
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Plugin metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name (unique identifier)
    pub name: String,

    /// Plugin version (semantic versioning)
    pub version: String,

    pub author: String,

    #[serde(default)]
    pub description: String,
}

impl PluginMetadata {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            author: author.into(),
            description: description.into(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Contents of a plugin directory's `plugin.json`
///
/// ```json
/// {
///   "name": "html-export",
///   "version": "1.0.0",
///   "author": "DocNexus",
///   "entry_point": "html_export",
///   "min_core_version": "1.0.0"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub author: String,
    #[serde(default)]
    pub description: String,

    /// Key into the loader's factory table
    pub entry_point: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum core system version required
    #[serde(default)]
    pub min_core_version: Option<String>,
}

impl PluginManifest {
    /// Metadata for the plugin instance built from this manifest
    pub fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(&self.name, &self.version, &self.author, &self.description)
    }
}

/// Plugin state enumeration
///
/// Tracks the current state of a plugin in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Registered but not yet initialized
    Registered,

    /// Initialized and ready to use
    Active,

    /// `initialize` failed
    Failed,

    /// `shutdown` has run
    Shutdown,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginState::Registered => f.pad("registered"),
            PluginState::Active => f.pad("active"),
            PluginState::Failed => f.pad("failed"),
            PluginState::Shutdown => f.pad("shutdown"),
        }
    }
}

/// Listing entry for a registered plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub state: PluginState,
}

/// Outcome of a lifecycle pass over all plugins
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleReport {
    /// Plugins whose hook succeeded, in call order
    pub succeeded: Vec<String>,
    /// `(plugin, error message)` for each failing hook
    pub failed: Vec<(String, String)>,
}

impl LifecycleReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
