//! Plugin registry implementation
//!
//! The registry owns every loaded plugin instance for the lifetime of the
//! process, drives their lifecycle hooks and collects the content plugins
//! inject into UI slots. It is an explicitly constructed context object,
//! shared as `Arc<PluginRegistry>` with whoever needs it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};
use crate::core::error::{NexusError, Result};
use super::types::{LifecycleReport, Plugin, PluginInfo, PluginState};

/// Named UI injection points the page templates read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    HeaderRight,
    MainTop,
    FooterRight,
    ExportMenu,
    SidebarBottom,
    ContentStart,
    ContentEnd,
}

impl Slot {
    pub const ALL: [Slot; 7] = [
        Slot::HeaderRight,
        Slot::MainTop,
        Slot::FooterRight,
        Slot::ExportMenu,
        Slot::SidebarBottom,
        Slot::ContentStart,
        Slot::ContentEnd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::HeaderRight => "header-right",
            Slot::MainTop => "main-top",
            Slot::FooterRight => "footer-right",
            Slot::ExportMenu => "export-menu",
            Slot::SidebarBottom => "sidebar-bottom",
            Slot::ContentStart => "content-start",
            Slot::ContentEnd => "content-end",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self> {
        Slot::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| NexusError::ValidationError(format!("Unknown slot: {}", s)))
    }
}

/// Registered plugin with its lifecycle state
#[derive(Clone)]
struct PluginEntry {
    instance: Arc<dyn Plugin>,
    state: PluginState,
}

impl PluginEntry {
    fn name(&self) -> &str {
        &self.instance.metadata().name
    }

    fn info(&self) -> PluginInfo {
        let metadata = self.instance.metadata();
        PluginInfo {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            author: metadata.author.clone(),
            description: metadata.description.clone(),
            state: self.state,
        }
    }
}

/// Slot content with the plugin that contributed it, if any
#[derive(Debug, Clone)]
struct SlotFragment {
    owner: Option<String>,
    content: String,
}

/// Plugin registry
///
/// Plugins are kept in registration order, which is also the order of
/// lifecycle calls and of feature collection.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<PluginEntry>>,
    slots: RwLock<HashMap<String, Vec<SlotFragment>>>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read_plugins(&self) -> RwLockReadGuard<'_, Vec<PluginEntry>> {
        self.plugins.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_plugins(&self) -> RwLockWriteGuard<'_, Vec<PluginEntry>> {
        self.plugins.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a plugin under its metadata name
    ///
    /// Does not initialize it. Registering a name that already exists
    /// replaces the previous instance in place, keeping its position, and
    /// returns the replaced instance.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        let name = plugin.metadata().name.clone();
        let entry = PluginEntry {
            instance: plugin,
            state: PluginState::Registered,
        };

        let mut plugins = self.write_plugins();
        match plugins.iter_mut().find(|e| e.name() == name) {
            Some(existing) => {
                warn!(plugin = %name, "Plugin already registered, replacing previous instance");
                let replaced = std::mem::replace(existing, entry);
                Some(replaced.instance)
            }
            None => {
                debug!(plugin = %name, "Plugin registered");
                plugins.push(entry);
                None
            }
        }
    }

    /// Remove a plugin and the slot content it registered under its name
    ///
    /// The feature catalog keeps serving the plugin's features until the
    /// next `FeatureManager::refresh`.
    pub fn unregister(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let entry = {
            let mut plugins = self.write_plugins();
            let index = plugins
                .iter()
                .position(|e| e.name() == name)
                .ok_or_else(|| NexusError::PluginNotFound(name.to_string()))?;
            plugins.remove(index)
        };

        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        for fragments in slots.values_mut() {
            fragments.retain(|f| f.owner.as_deref() != Some(name));
        }
        slots.retain(|_, fragments| !fragments.is_empty());

        info!(plugin = %name, "Plugin unregistered");
        Ok(entry.instance)
    }

    /// Look up a plugin by name
    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.read_plugins()
            .iter()
            .find(|e| e.name() == name)
            .map(|e| Arc::clone(&e.instance))
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.read_plugins()
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.state)
    }

    /// All registered plugins, in registration order
    pub fn list(&self) -> Vec<PluginInfo> {
        self.read_plugins().iter().map(PluginEntry::info).collect()
    }

    pub fn len(&self) -> usize {
        self.read_plugins().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_plugins().is_empty()
    }

    /// Plugins allowed to contribute features: everything that did not fail to initialize
    pub fn feature_providers(&self) -> Vec<Arc<dyn Plugin>> {
        self.read_plugins()
            .iter()
            .filter(|e| e.state != PluginState::Failed)
            .map(|e| Arc::clone(&e.instance))
            .collect()
    }

    fn set_state(&self, instance: &Arc<dyn Plugin>, state: PluginState) {
        let mut plugins = self.write_plugins();
        // The entry may have been replaced while its hook was running
        if let Some(entry) = plugins
            .iter_mut()
            .find(|e| Arc::ptr_eq(&e.instance, instance))
        {
            entry.state = state;
        }
    }

    fn snapshot(&self, filter: impl Fn(PluginState) -> bool) -> Vec<Arc<dyn Plugin>> {
        self.read_plugins()
            .iter()
            .filter(|e| filter(e.state))
            .map(|e| Arc::clone(&e.instance))
            .collect()
    }

    /// Initialize every plugin still in the `Registered` state
    ///
    /// Plugins run in registration order. A failing plugin is logged and
    /// marked `Failed`; the remaining plugins are still initialized. Plugins
    /// that are already `Active` are not initialized again.
    pub async fn initialize_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();

        for plugin in self.snapshot(|state| state == PluginState::Registered) {
            let name = plugin.metadata().name.clone();
            match plugin.initialize(self).await {
                Ok(()) => {
                    self.set_state(&plugin, PluginState::Active);
                    info!(plugin = %name, version = %plugin.metadata().version, "Plugin initialized");
                    report.succeeded.push(name);
                }
                Err(e) => {
                    self.set_state(&plugin, PluginState::Failed);
                    let err = NexusError::PluginLifecycleError {
                        plugin: name.clone(),
                        message: e.to_string(),
                    };
                    error!(plugin = %name, "{}", err);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report
    }

    /// Shut down every plugin that has not been shut down yet
    ///
    /// Same isolation as [`initialize_all`](Self::initialize_all): a failing
    /// `shutdown` is logged and the remaining plugins still get theirs.
    pub async fn shutdown_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();

        for plugin in self.snapshot(|state| state != PluginState::Shutdown) {
            let name = plugin.metadata().name.clone();
            let result = plugin.shutdown().await;
            self.set_state(&plugin, PluginState::Shutdown);
            match result {
                Ok(()) => {
                    debug!(plugin = %name, "Plugin shut down");
                    report.succeeded.push(name);
                }
                Err(e) => {
                    error!(plugin = %name, "Plugin shutdown failed: {}", e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report
    }

    /// Append `content` to a slot
    ///
    /// Content is stored verbatim. Escaping is the template layer's job.
    pub fn register_slot(&self, slot: &str, content: impl Into<String>) {
        self.push_fragment(slot, None, content.into());
    }

    /// Append content to `slot` on behalf of `plugin`
    ///
    /// The content is dropped again when the plugin is unregistered.
    pub fn register_plugin_slot(&self, plugin: &str, slot: &str, content: impl Into<String>) {
        self.push_fragment(slot, Some(plugin.to_string()), content.into());
    }

    fn push_fragment(&self, slot: &str, owner: Option<String>, content: String) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        debug!(slot = %slot, plugin = ?owner, "Slot content registered");
        slots
            .entry(slot.to_string())
            .or_default()
            .push(SlotFragment { owner, content });
    }

    /// Everything registered for `slot`, in append order; empty for unknown slots
    pub fn get_slots(&self, slot: &str) -> Vec<String> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(slot)
            .map(|fragments| fragments.iter().map(|f| f.content.clone()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.read_plugins().iter().map(|e| e.name().to_string()).collect();
        f.debug_struct("PluginRegistry").field("plugins", &names).finish()
    }
}
