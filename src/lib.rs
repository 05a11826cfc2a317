//! DocNexus Library
//!
//! This library provides the document pipeline of DocNexus: the feature
//! catalog and the passes it runs over Markdown, the plugin system that
//! extends it, and the services that render and export documents.

pub mod core;
pub mod feature;
pub mod plugin;

// Re-export commonly used types
pub use crate::core::{Config, DocumentService, ExportOutcome, NexusError};
pub use feature::{Feature, FeatureManager, FeatureState, Pipeline};
pub use plugin::{Plugin, PluginLoader, PluginRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
