//! Standalone HTML export
//!
//! Wraps the rendered document body into a self-contained HTML file and
//! adds an entry to the export menu.

use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use crate::core::error::Result;
use crate::feature::{ExportArtifact, ExportRequest, Feature, FeatureState};
use crate::plugin::registry::{PluginRegistry, Slot};
use crate::plugin::types::{Plugin, PluginManifest, PluginMetadata};

pub const ENTRY_POINT: &str = "html_export";
pub const FORMAT: &str = "html";
const MIME_TYPE: &str = "text/html; charset=utf-8";

const MENU_ENTRY: &str =
    r#"<button class="export-option" data-format="html" title="Export as HTML">HTML</button>"#;

pub struct HtmlExportPlugin {
    metadata: PluginMetadata,
    initialized: AtomicBool,
}

/// Factory for the `html_export` entry point
pub fn create(manifest: &PluginManifest) -> Result<Arc<dyn Plugin>> {
    Ok(Arc::new(HtmlExportPlugin {
        metadata: manifest.metadata(),
        initialized: AtomicBool::new(false),
    }))
}

fn html_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{}.html", stem)
}

fn escape_title(title: &str) -> String {
    title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Wrap a rendered body into a complete HTML document
pub fn export_html(request: &ExportRequest) -> Result<ExportArtifact> {
    let filename = html_filename(&request.filename);
    let title = Path::new(&filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let document = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<meta name=\"generator\" content=\"DocNexus {}\">\n<meta name=\"exported-at\" content=\"{}\">\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_title(&title),
        env!("CARGO_PKG_VERSION"),
        Utc::now().to_rfc3339(),
        request.html
    );

    debug!(filename = %filename, bytes = document.len(), "HTML export produced");
    Ok(ExportArtifact {
        filename,
        mime_type: MIME_TYPE.to_string(),
        content: document.into_bytes(),
    })
}

#[async_trait::async_trait]
impl Plugin for HtmlExportPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self, registry: &PluginRegistry) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        registry.register_plugin_slot(&self.metadata.name, Slot::ExportMenu.as_str(), MENU_ENTRY);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn features(&self) -> Vec<Feature> {
        vec![Feature::export(
            "HTML_EXPORT",
            FORMAT,
            FeatureState::Standard,
            export_html,
        )]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
