//! Plugins compiled into the binary
//!
//! Their code ships with the host, but they are still only loaded when a
//! plugin directory carries a manifest pointing at their entry point.

pub mod html_export;
pub mod theme_switcher;

use super::loader::PluginLoader;

/// Add the bundled entry points to a loader's descriptor table
pub fn register_factories(loader: &mut PluginLoader) {
    loader.register_factory(html_export::ENTRY_POINT, html_export::create);
    loader.register_factory(theme_switcher::ENTRY_POINT, theme_switcher::create);
}
