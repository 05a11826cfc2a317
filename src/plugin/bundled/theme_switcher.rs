//! Light/dark theme switcher
//!
//! Puts a toggle button into the header and ships the script driving it as
//! a UI extension rendered at the end of the content.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::core::error::Result;
use crate::feature::{Feature, FeatureState};
use crate::plugin::registry::{PluginRegistry, Slot};
use crate::plugin::types::{Plugin, PluginManifest, PluginMetadata};

pub const ENTRY_POINT: &str = "theme_switcher";

const TOGGLE_BUTTON: &str = r#"<button id="theme-toggle" class="theme-toggle" aria-label="Toggle theme">Theme</button>"#;

const TOGGLE_SCRIPT: &str = r#"<script>
(function () {
  var root = document.documentElement;
  var saved = localStorage.getItem("docnexus-theme");
  if (saved) { root.setAttribute("data-theme", saved); }
  var button = document.getElementById("theme-toggle");
  if (!button) { return; }
  button.addEventListener("click", function () {
    var next = root.getAttribute("data-theme") === "dark" ? "light" : "dark";
    root.setAttribute("data-theme", next);
    localStorage.setItem("docnexus-theme", next);
  });
})();
</script>"#;

pub struct ThemeSwitcherPlugin {
    metadata: PluginMetadata,
    initialized: AtomicBool,
}

/// Factory for the `theme_switcher` entry point
pub fn create(manifest: &PluginManifest) -> Result<Arc<dyn Plugin>> {
    Ok(Arc::new(ThemeSwitcherPlugin {
        metadata: manifest.metadata(),
        initialized: AtomicBool::new(false),
    }))
}

#[async_trait::async_trait]
impl Plugin for ThemeSwitcherPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self, registry: &PluginRegistry) -> Result<()> {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            registry.register_plugin_slot(
                &self.metadata.name,
                Slot::HeaderRight.as_str(),
                TOGGLE_BUTTON,
            );
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn features(&self) -> Vec<Feature> {
        vec![Feature::ui_extension(
            "THEME_SWITCHER",
            Slot::ContentEnd.as_str(),
            FeatureState::Standard,
            TOGGLE_SCRIPT,
        )]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
