//! Feature type definitions
//!
//! A feature is a named capability contributed either by the host itself
//! (built-ins) or by a plugin. What a feature does is carried by its handler:
//! a text transformation pass, an export handler for one format, or a UI
//! fragment destined for a slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use crate::core::error::Result;

/// Text transformation pass: Markdown source in, Markdown source out
pub type TransformFn = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Export handler: rendered document in, file content out
pub type ExportFn = Arc<dyn Fn(&ExportRequest) -> Result<ExportArtifact> + Send + Sync>;

/// Feature state
///
/// Decides whether a feature takes part in a pipeline:
/// - Standard: always included
/// - Experimental: included only when the caller opts in
/// - Disabled: never included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureState {
    Standard,
    Experimental,
    Disabled,
}

impl FeatureState {
    /// Whether a feature in this state is active for the given experimental toggle
    pub fn is_enabled(self, enable_experimental: bool) -> bool {
        match self {
            FeatureState::Standard => true,
            FeatureState::Experimental => enable_experimental,
            FeatureState::Disabled => false,
        }
    }
}

impl fmt::Display for FeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureState::Standard => f.pad("standard"),
            FeatureState::Experimental => f.pad("experimental"),
            FeatureState::Disabled => f.pad("disabled"),
        }
    }
}

/// Feature type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// Text transformation pass run by the pipeline
    Algorithm,
    /// Content injected into a UI slot
    UiExtension,
    /// Export handler for one output format
    ExportHandler,
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureType::Algorithm => f.pad("algorithm"),
            FeatureType::UiExtension => f.pad("ui_extension"),
            FeatureType::ExportHandler => f.pad("export_handler"),
        }
    }
}

/// The callable part of a feature
#[derive(Clone)]
pub enum FeatureHandler {
    Algorithm(TransformFn),
    Export {
        /// Lowercase format key, e.g. "pdf" or "docx"
        format: String,
        handler: ExportFn,
    },
    UiExtension {
        slot: String,
        content: String,
    },
}

impl fmt::Debug for FeatureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureHandler::Algorithm(_) => f.write_str("Algorithm(..)"),
            FeatureHandler::Export { format, .. } => {
                f.debug_struct("Export").field("format", format).finish_non_exhaustive()
            }
            FeatureHandler::UiExtension { slot, content } => f
                .debug_struct("UiExtension")
                .field("slot", slot)
                .field("content", content)
                .finish(),
        }
    }
}

/// A named unit of pipeline behavior, export capability or UI extension
#[derive(Debug, Clone)]
pub struct Feature {
    pub name: String,
    pub state: FeatureState,
    pub handler: FeatureHandler,
}

impl Feature {
    /// Create a text transformation feature
    pub fn algorithm<F>(name: impl Into<String>, state: FeatureState, handler: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            state,
            handler: FeatureHandler::Algorithm(Arc::new(handler)),
        }
    }

    /// Create a text transformation feature from an infallible pass
    pub fn infallible(name: impl Into<String>, state: FeatureState, pass: fn(&str) -> String) -> Self {
        Self::algorithm(name, state, move |text| Ok(pass(text)))
    }

    /// Create an export handler feature for `format`
    pub fn export<F>(name: impl Into<String>, format: &str, state: FeatureState, handler: F) -> Self
    where
        F: Fn(&ExportRequest) -> Result<ExportArtifact> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            state,
            handler: FeatureHandler::Export {
                format: format.to_lowercase(),
                handler: Arc::new(handler),
            },
        }
    }

    /// Create a UI extension feature that contributes `content` to `slot`
    pub fn ui_extension(
        name: impl Into<String>,
        slot: impl Into<String>,
        state: FeatureState,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            handler: FeatureHandler::UiExtension {
                slot: slot.into(),
                content: content.into(),
            },
        }
    }

    /// The type tag, derived from the handler
    pub fn feature_type(&self) -> FeatureType {
        match self.handler {
            FeatureHandler::Algorithm(_) => FeatureType::Algorithm,
            FeatureHandler::Export { .. } => FeatureType::ExportHandler,
            FeatureHandler::UiExtension { .. } => FeatureType::UiExtension,
        }
    }

    /// Declared export format, for export handlers
    pub fn export_format(&self) -> Option<&str> {
        match &self.handler {
            FeatureHandler::Export { format, .. } => Some(format),
            _ => None,
        }
    }

    /// Summary used for listings
    pub fn info(&self) -> FeatureInfo {
        FeatureInfo {
            name: self.name.clone(),
            state: self.state,
            feature_type: self.feature_type(),
            format: self.export_format().map(str::to_string),
        }
    }
}

/// Serializable description of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub name: String,
    pub state: FeatureState,
    pub feature_type: FeatureType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Export request handed to an export handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Requested format key
    pub format: String,
    /// Complete rendered HTML document body
    pub html: String,
    /// Target file name without directory
    pub filename: String,
}

/// File produced by an export handler
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_filtering() {
        assert!(FeatureState::Standard.is_enabled(false));
        assert!(!FeatureState::Experimental.is_enabled(false));
        assert!(FeatureState::Experimental.is_enabled(true));
        assert!(!FeatureState::Disabled.is_enabled(true));
    }

    #[test]
    fn test_type_follows_handler() {
        let algo = Feature::infallible("upper", FeatureState::Standard, |t| t.to_uppercase());
        assert_eq!(algo.feature_type(), FeatureType::Algorithm);
        assert!(algo.export_format().is_none());

        let export = Feature::export("pdf", "PDF", FeatureState::Standard, |req| {
            Ok(ExportArtifact {
                filename: req.filename.clone(),
                mime_type: "application/pdf".to_string(),
                content: Vec::new(),
            })
        });
        assert_eq!(export.feature_type(), FeatureType::ExportHandler);
        assert_eq!(export.export_format(), Some("pdf"));

        let ui = Feature::ui_extension("badge", "header-right", FeatureState::Standard, "<b>x</b>");
        assert_eq!(ui.feature_type(), FeatureType::UiExtension);
    }

    #[test]
    fn test_info_serialization() {
        let feature = Feature::export("html", "html", FeatureState::Experimental, |req| {
            Ok(ExportArtifact {
                filename: req.filename.clone(),
                mime_type: "text/html".to_string(),
                content: req.html.clone().into_bytes(),
            })
        });
        let json = serde_json::to_value(feature.info()).unwrap();
        assert_eq!(json["state"], "experimental");
        assert_eq!(json["feature_type"], "export_handler");
        assert_eq!(json["format"], "html");
    }
}
