//! Feature manager
//!
//! Facade over the feature catalog: the merged list of built-in and
//! plugin-provided features. The catalog is rebuilt from scratch on every
//! [`FeatureManager::refresh`] and read by every render and export request.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use crate::plugin::PluginRegistry;
use super::builtin::builtin_features;
use super::pipeline::Pipeline;
use super::types::{ExportFn, Feature, FeatureHandler, FeatureInfo, FeatureState, FeatureType};

/// Registry facade that builds pipelines and resolves export handlers
pub struct FeatureManager {
    registry: Arc<PluginRegistry>,
    builtins: Vec<Feature>,
    catalog: RwLock<Vec<Feature>>,
}

impl FeatureManager {
    /// Create a manager with the default built-in features and an initial refresh
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self::with_builtins(registry, builtin_features())
    }

    /// Create a manager with a custom built-in list
    pub fn with_builtins(registry: Arc<PluginRegistry>, builtins: Vec<Feature>) -> Self {
        let manager = Self {
            registry,
            builtins,
            catalog: RwLock::new(Vec::new()),
        };
        manager.refresh();
        manager
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    fn read_catalog(&self) -> RwLockReadGuard<'_, Vec<Feature>> {
        self.catalog.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Rebuild the catalog from the built-ins and every registered plugin
    ///
    /// Built-ins come first, then plugin features in registration order.
    /// A feature whose name is already taken replaces the earlier one at its
    /// position. Plugins that failed to initialize contribute nothing.
    pub fn refresh(&self) {
        let mut catalog: Vec<Feature> = Vec::new();

        for feature in &self.builtins {
            insert_feature(&mut catalog, feature.clone(), "builtin");
        }
        for plugin in self.registry.feature_providers() {
            let source = &plugin.metadata().name;
            for feature in plugin.features() {
                insert_feature(&mut catalog, feature, source);
            }
        }

        warn_on_format_collisions(&catalog);

        let count = catalog.len();
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = catalog;
        info!(features = count, "Feature catalog refreshed");
    }

    /// Pipeline of the enabled algorithm features, in catalog order
    pub fn build_pipeline(&self, enable_experimental: bool) -> Pipeline {
        let catalog = self.read_catalog();
        let pipeline = Pipeline::new(
            catalog
                .iter()
                .filter(|f| f.feature_type() == FeatureType::Algorithm)
                .filter(|f| f.state.is_enabled(enable_experimental))
                .cloned(),
        );
        debug!(
            steps = ?pipeline.step_names(),
            experimental = enable_experimental,
            "Pipeline built"
        );
        pipeline
    }

    /// Export handler for `format`, matched case-insensitively
    ///
    /// When several features declare the same format, the last one in
    /// catalog order wins. `None` means no plugin provides the format.
    pub fn get_export_handler(&self, format: &str) -> Option<ExportFn> {
        let wanted = format.to_lowercase();
        self.read_catalog()
            .iter()
            .rev()
            .filter(|f| f.state != FeatureState::Disabled)
            .find_map(|f| match &f.handler {
                FeatureHandler::Export { format, handler } if *format == wanted => {
                    Some(Arc::clone(handler))
                }
                _ => None,
            })
    }

    /// Snapshot of the catalog for listings
    pub fn features(&self) -> Vec<FeatureInfo> {
        self.read_catalog().iter().map(Feature::info).collect()
    }

    /// Content of the enabled UI extension features targeting `slot`
    pub fn ui_fragments(&self, slot: &str) -> Vec<String> {
        self.read_catalog()
            .iter()
            .filter(|f| f.state != FeatureState::Disabled)
            .filter_map(|f| match &f.handler {
                FeatureHandler::UiExtension { slot: target, content } if target == slot => {
                    Some(content.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Distinct export formats currently available, sorted
    pub fn export_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self
            .read_catalog()
            .iter()
            .filter(|f| f.state != FeatureState::Disabled)
            .filter_map(|f| f.export_format().map(str::to_string))
            .collect();
        formats.sort();
        formats.dedup();
        formats
    }
}

fn insert_feature(catalog: &mut Vec<Feature>, feature: Feature, source: &str) {
    match catalog.iter_mut().find(|f| f.name == feature.name) {
        Some(existing) => {
            warn!(feature = %feature.name, source = %source, "Duplicate feature name, replacing earlier feature");
            *existing = feature;
        }
        None => catalog.push(feature),
    }
}

fn warn_on_format_collisions(catalog: &[Feature]) {
    let mut seen = HashSet::new();
    for feature in catalog.iter().filter(|f| f.state != FeatureState::Disabled) {
        if let Some(format) = feature.export_format() {
            if !seen.insert(format) {
                warn!(
                    format = %format,
                    feature = %feature.name,
                    "Multiple export handlers for format, the last one wins"
                );
            }
        }
    }
}

impl std::fmt::Debug for FeatureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.read_catalog().iter().map(|f| f.name.clone()).collect();
        f.debug_struct("FeatureManager").field("catalog", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Result;
    use crate::feature::smart_convert::{convert_ascii_tables, convert_sip_signaling};
    use crate::feature::standard::normalize_headings;
    use crate::feature::types::{ExportArtifact, ExportRequest};
    use crate::plugin::{Plugin, PluginMetadata};
    use proptest::prelude::*;

    // Plugin that only contributes a fixed feature list
    struct FeaturePlugin {
        metadata: PluginMetadata,
        features: Vec<Feature>,
    }

    impl FeaturePlugin {
        fn new(name: &str, features: Vec<Feature>) -> Arc<dyn Plugin> {
            Arc::new(Self {
                metadata: PluginMetadata::new(name, "1.0.0", "Test Author", ""),
                features,
            })
        }
    }

    #[async_trait::async_trait]
    impl Plugin for FeaturePlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn initialize(&self, _registry: &PluginRegistry) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        fn features(&self) -> Vec<Feature> {
            self.features.clone()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn marker(name: &str, state: FeatureState) -> Feature {
        let mark = format!("[{}]", name);
        Feature::algorithm(name, state, move |text| Ok(format!("{}{}", text, mark)))
    }

    fn exporter(name: &str, format: &str, tag: &'static str) -> Feature {
        Feature::export(name, format, FeatureState::Standard, move |req| {
            Ok(ExportArtifact {
                filename: req.filename.clone(),
                mime_type: tag.to_string(),
                content: Vec::new(),
            })
        })
    }

    fn export_tag(manager: &FeatureManager, format: &str) -> Option<String> {
        let handler = manager.get_export_handler(format)?;
        let request = ExportRequest {
            format: format.to_string(),
            html: String::new(),
            filename: "doc".to_string(),
        };
        Some(handler(&request).unwrap().mime_type)
    }

    fn empty_manager() -> (Arc<PluginRegistry>, FeatureManager) {
        let registry = Arc::new(PluginRegistry::new());
        let manager = FeatureManager::with_builtins(Arc::clone(&registry), Vec::new());
        (registry, manager)
    }

    #[test]
    fn test_default_catalog_is_builtins() {
        let manager = FeatureManager::new(Arc::new(PluginRegistry::new()));
        assert_eq!(manager.features().len(), builtin_features().len());
        assert_eq!(manager.build_pipeline(false).len(), 4);
        assert_eq!(manager.build_pipeline(true).len(), 7);
    }

    #[test]
    fn test_empty_catalog_is_identity() {
        let (_registry, manager) = empty_manager();
        assert_eq!(manager.build_pipeline(true).run("text").unwrap(), "text");
    }

    #[test]
    fn test_experimental_filtering_keeps_order() {
        let registry = Arc::new(PluginRegistry::new());
        let manager = FeatureManager::with_builtins(
            registry,
            vec![
                marker("a", FeatureState::Standard),
                marker("b", FeatureState::Experimental),
                marker("c", FeatureState::Standard),
                marker("d", FeatureState::Disabled),
            ],
        );

        assert_eq!(manager.build_pipeline(false).step_names(), vec!["a", "c"]);
        assert_eq!(manager.build_pipeline(true).step_names(), vec!["a", "b", "c"]);
        assert_eq!(manager.build_pipeline(true).run("").unwrap(), "[a][b][c]");
    }

    #[test]
    fn test_plugin_features_follow_builtins() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(FeaturePlugin::new("p1", vec![marker("p1-pass", FeatureState::Standard)]));
        let manager = FeatureManager::with_builtins(
            Arc::clone(&registry),
            vec![marker("core", FeatureState::Standard)],
        );

        assert_eq!(manager.build_pipeline(false).step_names(), vec!["core", "p1-pass"]);
    }

    #[test]
    fn test_duplicate_name_last_wins_in_place() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(FeaturePlugin::new("p1", vec![marker("shared", FeatureState::Standard)]));
        let manager = FeatureManager::with_builtins(
            Arc::clone(&registry),
            vec![
                Feature::infallible("shared", FeatureState::Standard, |t| t.to_string()),
                marker("tail", FeatureState::Standard),
            ],
        );

        assert_eq!(manager.build_pipeline(false).step_names(), vec!["shared", "tail"]);
        assert_eq!(manager.build_pipeline(false).run("").unwrap(), "[shared][tail]");
    }

    #[test]
    fn test_export_handler_lookup() {
        let (registry, manager) = empty_manager();
        assert!(manager.get_export_handler("pdf").is_none());

        registry.register(FeaturePlugin::new("pdf-a", vec![exporter("pdf-a", "pdf", "a")]));
        manager.refresh();
        assert_eq!(export_tag(&manager, "pdf").as_deref(), Some("a"));
        assert_eq!(export_tag(&manager, "PDF").as_deref(), Some("a"));

        registry.register(FeaturePlugin::new("pdf-b", vec![exporter("pdf-b", "PDF", "b")]));
        manager.refresh();
        assert_eq!(export_tag(&manager, "pdf").as_deref(), Some("b"));
        assert_eq!(manager.export_formats(), vec!["pdf"]);
        assert!(manager.get_export_handler("docx").is_none());
    }

    #[test]
    fn test_disabled_export_handler_ignored() {
        let (registry, manager) = empty_manager();
        let mut disabled = exporter("docx", "docx", "x");
        disabled.state = FeatureState::Disabled;
        registry.register(FeaturePlugin::new("docx", vec![disabled]));
        manager.refresh();

        assert!(manager.get_export_handler("docx").is_none());
        assert!(manager.export_formats().is_empty());
    }

    #[test]
    fn test_unregister_then_refresh_drops_features() {
        let (registry, manager) = empty_manager();
        registry.register(FeaturePlugin::new(
            "pdf",
            vec![exporter("pdf", "pdf", "a"), marker("pdf-pass", FeatureState::Standard)],
        ));
        manager.refresh();
        assert_eq!(manager.features().len(), 2);

        registry.unregister("pdf").unwrap();
        // Stale until refreshed
        assert!(manager.get_export_handler("pdf").is_some());

        manager.refresh();
        assert!(manager.features().is_empty());
        assert!(manager.get_export_handler("pdf").is_none());
    }

    #[tokio::test]
    async fn test_failed_plugin_contributes_nothing() {
        struct Broken {
            metadata: PluginMetadata,
        }

        #[async_trait::async_trait]
        impl Plugin for Broken {
            fn metadata(&self) -> &PluginMetadata {
                &self.metadata
            }
            async fn initialize(&self, _registry: &PluginRegistry) -> Result<()> {
                Err(crate::core::error::NexusError::InitializationError("nope".to_string()))
            }
            async fn shutdown(&self) -> Result<()> {
                Ok(())
            }
            fn features(&self) -> Vec<Feature> {
                vec![marker("broken-pass", FeatureState::Standard)]
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let (registry, manager) = empty_manager();
        registry.register(Arc::new(Broken {
            metadata: PluginMetadata::new("broken", "0.0.1", "Test Author", ""),
        }));
        registry.initialize_all().await;
        manager.refresh();

        assert!(manager.build_pipeline(true).is_empty());
    }

    #[test]
    fn test_ui_fragments_by_slot() {
        let (registry, manager) = empty_manager();
        registry.register(FeaturePlugin::new(
            "theme",
            vec![
                Feature::ui_extension("toggle", "header-right", FeatureState::Standard, "<button/>"),
                Feature::ui_extension("banner", "main-top", FeatureState::Standard, "<div/>"),
            ],
        ));
        manager.refresh();

        assert_eq!(manager.ui_fragments("header-right"), vec!["<button/>"]);
        assert!(manager.ui_fragments("footer-right").is_empty());
    }

    #[test]
    fn test_end_to_end_experimental_toggle() {
        let manager = FeatureManager::with_builtins(
            Arc::new(PluginRegistry::new()),
            vec![
                Feature::infallible("ascii-tables", FeatureState::Standard, convert_ascii_tables),
                Feature::infallible("headings", FeatureState::Standard, normalize_headings),
                Feature::infallible("sip-diagrams", FeatureState::Experimental, convert_sip_signaling),
            ],
        );
        let doc = "# Guide\n\nName    Role\nAlice   Admin\nBob     Viewer\n\n## Call Flow\n\n```\nUA1 -> Proxy: INVITE\nProxy -> UA2: INVITE\nUA2 -> UA1: 200 OK\n```\n";

        let plain = manager.build_pipeline(false).run(doc).unwrap();
        assert!(plain.contains("| Name | Role |\n| --- | --- |\n| Alice | Admin |\n| Bob | Viewer |"));
        assert!(plain.contains("# Guide {#guide}"));
        assert!(plain.contains("## Call Flow {#call-flow}"));
        assert!(plain.contains("```\nUA1 -> Proxy: INVITE\n"));
        assert!(!plain.contains("sequenceDiagram"));

        let experimental = manager.build_pipeline(true).run(doc).unwrap();
        assert!(experimental.contains("| Name | Role |"));
        assert!(experimental.contains("```mermaid\nsequenceDiagram"));
        assert!(experimental.contains("UA1->>Proxy: INVITE"));
    }

    proptest! {
        #[test]
        fn prop_refresh_is_idempotent(
            plugins in proptest::collection::vec(
                proptest::collection::vec(("[a-d]", 0u8..3), 0..4),
                0..4,
            ),
        ) {
            let registry = Arc::new(PluginRegistry::new());
            for (i, features) in plugins.iter().enumerate() {
                let features = features
                    .iter()
                    .map(|(name, state)| {
                        let state = match state {
                            0 => FeatureState::Standard,
                            1 => FeatureState::Experimental,
                            _ => FeatureState::Disabled,
                        };
                        marker(name, state)
                    })
                    .collect();
                registry.register(FeaturePlugin::new(&format!("plugin-{}", i), features));
            }

            let manager = FeatureManager::new(Arc::clone(&registry));
            let first = manager.features();
            let first_steps: Vec<String> = manager
                .build_pipeline(true)
                .step_names()
                .into_iter()
                .map(str::to_string)
                .collect();

            manager.refresh();

            prop_assert_eq!(first, manager.features());
            let second_steps: Vec<String> = manager
                .build_pipeline(true)
                .step_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            prop_assert_eq!(first_steps, second_steps);
        }
    }
}
