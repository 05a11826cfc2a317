//! Plugin discovery and loading
//!
//! Plugins live in one directory each, described by a `plugin.json`
//! manifest. The manifest's `entry_point` names a factory in the loader's
//! descriptor table; the loader calls that factory and registers the
//! resulting instance. Nothing is loaded implicitly.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use semver::Version;
use tracing::{debug, error, info, warn};
use crate::core::config::PluginsConfig;
use crate::core::error::{NexusError, Result};
use super::registry::PluginRegistry;
use super::types::{Plugin, PluginManifest};

/// Manifest file expected in every plugin directory
pub const MANIFEST_FILE: &str = "plugin.json";

/// Builds a plugin instance from its manifest
pub type PluginFactory = fn(&PluginManifest) -> Result<Arc<dyn Plugin>>;

/// Outcome of a discovery pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Registered plugin names, in load order
    pub loaded: Vec<String>,
    /// Plugins whose manifest has `"enabled": false`
    pub skipped: Vec<String>,
    /// `(plugin directory, error message)` per failed plugin
    pub failed: Vec<(PathBuf, String)>,
}

/// Plugin roots for a configuration: the development tree, then the
/// production directory (`plugins/` next to the executable unless configured)
pub fn search_dirs(config: &PluginsConfig) -> Vec<PathBuf> {
    let mut dirs = vec![config.dev_dir.clone()];

    let prod_dir = config.prod_dir.clone().or_else(|| {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("plugins")))
    });
    if let Some(prod_dir) = prod_dir {
        if !dirs.contains(&prod_dir) {
            dirs.push(prod_dir);
        }
    }

    dirs
}

/// Plugin loader
pub struct PluginLoader {
    roots: Vec<PathBuf>,
    factories: HashMap<String, PluginFactory>,
    core_version: Version,
}

impl PluginLoader {
    /// Create a loader with an empty factory table
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            factories: HashMap::new(),
            core_version: Version::new(
                env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
                env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
                env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
            ),
        }
    }

    /// Create a loader for the configured roots, knowing the bundled plugins
    pub fn from_config(config: &PluginsConfig) -> Self {
        let mut loader = Self::new(search_dirs(config));
        super::bundled::register_factories(&mut loader);
        loader
    }

    /// Override the version `min_core_version` is checked against
    pub fn with_core_version(mut self, version: Version) -> Self {
        self.core_version = version;
        self
    }

    /// Add an entry point to the descriptor table
    pub fn register_factory(&mut self, entry_point: &str, factory: PluginFactory) {
        if self.factories.insert(entry_point.to_string(), factory).is_some() {
            warn!(entry_point = %entry_point, "Plugin factory replaced");
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Scan every root and register the plugins found there
    ///
    /// Roots are scanned in order and plugin directories inside a root in
    /// lexicographic order, which makes the registration order, and with it
    /// the pipeline order, reproducible. Failures are per plugin: they are
    /// logged, recorded in the report and the scan goes on.
    pub async fn discover_and_load(&self, registry: &PluginRegistry) -> LoadReport {
        let mut report = LoadReport::default();

        for root in &self.roots {
            let dirs = match plugin_dirs(root).await {
                Ok(dirs) => dirs,
                Err(e) => {
                    error!(root = %root.display(), "Failed to scan plugin directory: {}", e);
                    continue;
                }
            };
            info!(root = %root.display(), candidates = dirs.len(), "Discovering plugins");

            for dir in dirs {
                match self.load_plugin(&dir).await {
                    Ok(Some(plugin)) => {
                        let name = plugin.metadata().name.clone();
                        registry.register(plugin);
                        info!(plugin = %name, path = %dir.display(), "Plugin loaded");
                        report.loaded.push(name);
                    }
                    Ok(None) => {
                        let name = dir
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        report.skipped.push(name);
                    }
                    Err(e) => {
                        error!(path = %dir.display(), "Failed to load plugin: {}", e);
                        report.failed.push((dir, e.to_string()));
                    }
                }
            }
        }

        report
    }

    /// Build the plugin in `dir`; `None` when its manifest disables it
    async fn load_plugin(&self, dir: &Path) -> Result<Option<Arc<dyn Plugin>>> {
        let manifest = read_manifest(dir).await?;

        if !manifest.enabled {
            debug!(plugin = %manifest.name, "Plugin disabled in manifest, skipping");
            return Ok(None);
        }

        self.check_core_version(&manifest)?;

        let factory = self.factories.get(&manifest.entry_point).ok_or_else(|| {
            NexusError::PluginLoadError(format!(
                "Unknown entry point '{}' for plugin {}",
                manifest.entry_point, manifest.name
            ))
        })?;

        factory(&manifest).map(Some)
    }

    fn check_core_version(&self, manifest: &PluginManifest) -> Result<()> {
        let Some(required) = &manifest.min_core_version else {
            return Ok(());
        };

        let required = Version::parse(required).map_err(|e| {
            NexusError::PluginLoadError(format!(
                "Invalid min_core_version '{}' for plugin {}: {}",
                required, manifest.name, e
            ))
        })?;

        if self.core_version < required {
            return Err(NexusError::PluginLoadError(format!(
                "Plugin {} requires core version {} but this is {}",
                manifest.name, required, self.core_version
            )));
        }

        Ok(())
    }
}

/// Subdirectories of `root` holding a manifest, sorted by name
///
/// A missing root yields nothing.
async fn plugin_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        debug!(root = %root.display(), "Plugin directory does not exist");
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    let mut read_dir = tokio::fs::read_dir(root).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.is_dir() && path.join(MANIFEST_FILE).exists() {
            dirs.push(path);
        }
    }

    dirs.sort();
    Ok(dirs)
}

async fn read_manifest(dir: &Path) -> Result<PluginManifest> {
    let content = tokio::fs::read_to_string(dir.join(MANIFEST_FILE)).await?;
    serde_json::from_str(&content)
        .map_err(|e| NexusError::PluginLoadError(format!("Invalid manifest: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::PluginMetadata;
    use tempfile::TempDir;

    struct StubPlugin {
        metadata: PluginMetadata,
    }

    #[async_trait::async_trait]
    impl Plugin for StubPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn initialize(&self, _registry: &PluginRegistry) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn stub_factory(manifest: &PluginManifest) -> Result<Arc<dyn Plugin>> {
        Ok(Arc::new(StubPlugin {
            metadata: manifest.metadata(),
        }))
    }

    fn failing_factory(manifest: &PluginManifest) -> Result<Arc<dyn Plugin>> {
        Err(NexusError::PluginLoadError(format!("{} cannot start", manifest.name)))
    }

    fn write_plugin(root: &Path, dir: &str, manifest: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(MANIFEST_FILE), manifest).unwrap();
    }

    fn manifest(name: &str, entry_point: &str) -> String {
        serde_json::json!({
            "name": name,
            "version": "1.0.0",
            "author": "Test Author",
            "entry_point": entry_point,
        })
        .to_string()
    }

    fn loader(roots: Vec<PathBuf>) -> PluginLoader {
        let mut loader = PluginLoader::new(roots).with_core_version(Version::new(1, 2, 0));
        loader.register_factory("stub", stub_factory);
        loader.register_factory("failing", failing_factory);
        loader
    }

    #[tokio::test]
    async fn test_lexicographic_order_and_isolation() {
        let root = TempDir::new().unwrap();
        write_plugin(root.path(), "charlie", &manifest("charlie", "stub"));
        write_plugin(root.path(), "alpha", &manifest("alpha", "stub"));
        write_plugin(root.path(), "bravo", "{ not json");
        write_plugin(root.path(), "delta", &manifest("delta", "missing"));
        write_plugin(root.path(), "echo", &manifest("echo", "failing"));
        std::fs::create_dir_all(root.path().join("no-manifest")).unwrap();
        std::fs::write(root.path().join("README.md"), "not a plugin").unwrap();

        let registry = PluginRegistry::new();
        let report = loader(vec![root.path().to_path_buf()])
            .discover_and_load(&registry)
            .await;

        assert_eq!(report.loaded, vec!["alpha", "charlie"]);
        let failed: Vec<String> = report
            .failed
            .iter()
            .map(|(path, _)| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(failed, vec!["bravo", "delta", "echo"]);
        assert!(report.failed[1].1.contains("Unknown entry point"));

        let names: Vec<String> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "charlie"]);
    }

    #[tokio::test]
    async fn test_dev_root_before_prod_root() {
        let dev = TempDir::new().unwrap();
        let prod = TempDir::new().unwrap();
        write_plugin(dev.path(), "zulu", &manifest("zulu", "stub"));
        write_plugin(prod.path(), "alpha", &manifest("alpha", "stub"));

        let registry = PluginRegistry::new();
        let report = loader(vec![dev.path().to_path_buf(), prod.path().to_path_buf()])
            .discover_and_load(&registry)
            .await;

        assert_eq!(report.loaded, vec!["zulu", "alpha"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_not_an_error() {
        let root = TempDir::new().unwrap();
        let registry = PluginRegistry::new();
        let report = loader(vec![root.path().join("does-not-exist")])
            .discover_and_load(&registry)
            .await;

        assert!(report.loaded.is_empty());
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_and_version_gated_plugins() {
        let root = TempDir::new().unwrap();
        write_plugin(
            root.path(),
            "off",
            r#"{"name": "off", "version": "1.0.0", "author": "a", "entry_point": "stub", "enabled": false}"#,
        );
        write_plugin(
            root.path(),
            "future",
            r#"{"name": "future", "version": "1.0.0", "author": "a", "entry_point": "stub", "min_core_version": "9.0.0"}"#,
        );
        write_plugin(
            root.path(),
            "current",
            r#"{"name": "current", "version": "1.0.0", "author": "a", "entry_point": "stub", "min_core_version": "1.1.0"}"#,
        );

        let registry = PluginRegistry::new();
        let report = loader(vec![root.path().to_path_buf()])
            .discover_and_load(&registry)
            .await;

        assert_eq!(report.loaded, vec!["current"]);
        assert_eq!(report.skipped, vec!["off"]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("requires core version 9.0.0"));
        assert!(registry.get_plugin("off").is_none());
    }

    #[test]
    fn test_search_dirs() {
        let config = PluginsConfig {
            dev_dir: PathBuf::from("./plugins_dev"),
            prod_dir: Some(PathBuf::from("/opt/docnexus/plugins")),
            enabled: true,
        };
        assert_eq!(
            search_dirs(&config),
            vec![
                PathBuf::from("./plugins_dev"),
                PathBuf::from("/opt/docnexus/plugins")
            ]
        );

        let config = PluginsConfig {
            prod_dir: None,
            ..config
        };
        let dirs = search_dirs(&config);
        assert_eq!(dirs[0], PathBuf::from("./plugins_dev"));
        assert!(dirs.iter().skip(1).all(|d| d.ends_with("plugins")));
    }
}
