//! Plugin system module
//!
//! This module provides the plugin system implementation including:
//! - The plugin contract every plugin implements
//! - Plugin registry owning instances, lifecycle and UI slots
//! - Loader discovering `plugin.json` manifests and calling plugin factories
//! - Plugins bundled with the binary

pub mod bundled;
pub mod loader;
pub mod registry;
pub mod types;

pub use loader::{search_dirs, LoadReport, PluginFactory, PluginLoader, MANIFEST_FILE};
pub use registry::{PluginRegistry, Slot};
pub use types::{
    LifecycleReport, Plugin, PluginId, PluginInfo, PluginManifest, PluginMetadata, PluginState,
};
