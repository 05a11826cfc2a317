//! Document service layer
//!
//! Glue between the request layer (the CLI here) and the feature system:
//! rendering runs the pipeline then converts to HTML, exporting validates the
//! payload and dispatches to the export handler registered for the format.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use crate::core::config::ExportConfig;
use crate::core::error::{ErrorContext, ErrorResponse, NexusError, Result};
use crate::core::render;
use crate::feature::{ExportArtifact, ExportRequest, FeatureManager};

/// Result of an export request
#[derive(Debug)]
pub enum ExportOutcome {
    /// The handler produced a file
    Exported(ExportArtifact),
    /// No plugin provides the format; details say what to install
    HandlerNotFound(ErrorResponse),
}

/// Document rendering and export service
pub struct DocumentService {
    features: Arc<FeatureManager>,
    max_export_size: usize,
}

impl DocumentService {
    pub fn new(features: Arc<FeatureManager>, config: &ExportConfig) -> Self {
        Self::with_limit(features, config.max_html_size)
    }

    /// Create a service with an explicit export payload limit in bytes
    pub fn with_limit(features: Arc<FeatureManager>, max_export_size: usize) -> Self {
        Self {
            features,
            max_export_size,
        }
    }

    pub fn features(&self) -> &Arc<FeatureManager> {
        &self.features
    }

    /// Read a Markdown source file
    pub fn read_source(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document {}", path.display()))
    }

    /// Run the feature pipeline over Markdown source
    pub fn render_markdown(&self, source: &str, enable_experimental: bool) -> Result<String> {
        self.features.build_pipeline(enable_experimental).run(source)
    }

    /// Run the feature pipeline, then convert to HTML
    pub fn render_html(&self, source: &str, enable_experimental: bool) -> Result<String> {
        let markdown = self.render_markdown(source, enable_experimental)?;
        Ok(render::to_html(&markdown))
    }

    /// UI content for a slot: registry slot content followed by UI extension features
    pub fn slot_content(&self, slot: &str) -> Vec<String> {
        let mut content = self.features.registry().get_slots(slot);
        content.extend(self.features.ui_fragments(slot));
        content
    }

    /// Export a rendered document
    ///
    /// A missing handler is reported as [`ExportOutcome::HandlerNotFound`],
    /// not as an error. Payloads over the size limit fail validation; a
    /// handler failure surfaces as [`NexusError::ExportError`].
    pub fn export(&self, request: &ExportRequest) -> Result<ExportOutcome> {
        let size = request.html.len();
        if size > self.max_export_size {
            let mb = |bytes: usize| bytes as f64 / (1024.0 * 1024.0);
            return Err(NexusError::ValidationError(format!(
                "The HTML content is {:.2} MB, exceeding the {:.0} MB limit for exports",
                mb(size),
                mb(self.max_export_size)
            )));
        }

        let format = request.format.to_lowercase();
        let Some(handler) = self.features.get_export_handler(&format) else {
            let available = self.features.export_formats();
            warn!(format = %format, available = ?available, "No export handler for format");
            return Ok(ExportOutcome::HandlerNotFound(ErrorResponse::with_details(
                "HandlerNotFound".to_string(),
                format!("No plugin provides the '{}' export format", format),
                json!({
                    "format": format,
                    "available_formats": available,
                    "suggestion": format!("Install a plugin that provides the '{}' export format", format),
                }),
            )));
        };

        let artifact = handler(request).map_err(|e| match e {
            NexusError::ExportError { .. } => e,
            other => NexusError::ExportError {
                format: format.clone(),
                message: other.to_string(),
            },
        })?;

        info!(
            format = %format,
            filename = %artifact.filename,
            bytes = artifact.content.len(),
            "Document exported"
        );
        Ok(ExportOutcome::Exported(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, FeatureState};
    use crate::plugin::bundled::html_export;
    use crate::plugin::{Plugin, PluginMetadata, PluginRegistry};

    struct ExportPlugin {
        metadata: PluginMetadata,
    }

    #[async_trait::async_trait]
    impl Plugin for ExportPlugin {
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
            vec![
                Feature::export("html", "html", FeatureState::Standard, html_export::export_html),
                Feature::export("broken-pdf", "pdf", FeatureState::Standard, |_| {
                    Err(NexusError::ValidationError("wkhtmltopdf missing".to_string()))
                }),
            ]
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn service(limit: usize) -> DocumentService {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(ExportPlugin {
            metadata: PluginMetadata::new("exports", "1.0.0", "Test Author", ""),
        }));
        let features = Arc::new(FeatureManager::new(registry));
        DocumentService::with_limit(features, limit)
    }

    fn request(format: &str, html: &str) -> ExportRequest {
        ExportRequest {
            format: format.to_string(),
            html: html.to_string(),
            filename: "guide.md".to_string(),
        }
    }

    #[test]
    fn test_render_html() {
        let html = service(1024).render_html("# Guide\n\nHello.\n", false).unwrap();
        assert!(html.contains(r#"<h1 id="guide">Guide</h1>"#));
        assert!(html.contains("generated-toc"));
    }

    #[test]
    fn test_export_dispatches_by_format() {
        match service(1024).export(&request("HTML", "<p>x</p>")).unwrap() {
            ExportOutcome::Exported(artifact) => assert_eq!(artifact.filename, "guide.html"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_format_is_not_found() {
        match service(1024).export(&request("docx", "<p>x</p>")).unwrap() {
            ExportOutcome::HandlerNotFound(response) => {
                assert_eq!(response.error, "HandlerNotFound");
                let details = response.details.unwrap();
                assert_eq!(details["format"], "docx");
                assert_eq!(details["available_formats"], json!(["html", "pdf"]));
                assert!(details["suggestion"].as_str().unwrap().contains("docx"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = service(8).export(&request("html", "<p>too large</p>"));
        assert!(matches!(result, Err(NexusError::ValidationError(_))));
    }

    #[test]
    fn test_handler_failure_is_export_error() {
        match service(1024).export(&request("pdf", "<p>x</p>")) {
            Err(NexusError::ExportError { format, message }) => {
                assert_eq!(format, "pdf");
                assert!(message.contains("wkhtmltopdf"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_slot_content_merges_sources() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register_slot("content-end", "<footer/>");
        let features = Arc::new(FeatureManager::with_builtins(
            Arc::clone(&registry),
            vec![Feature::ui_extension("script", "content-end", FeatureState::Standard, "<script/>")],
        ));
        let service = DocumentService::with_limit(features, 1024);

        assert_eq!(service.slot_content("content-end"), vec!["<footer/>", "<script/>"]);
    }

    #[test]
    fn test_read_source_missing_file() {
        assert!(service(1024).read_source(Path::new("/nonexistent/doc.md")).is_err());
    }
}
