//! Feature pipeline
//!
//! Features are the units the document pipeline is assembled from:
//! - Algorithm features transform Markdown source before HTML conversion
//! - Export handlers turn rendered HTML into a downloadable file
//! - UI extensions contribute fragments to page slots
//!
//! The [`FeatureManager`] merges built-in features with the ones every
//! registered plugin declares, and builds a [`Pipeline`] per render.

pub mod builtin;
pub mod manager;
pub mod pipeline;
pub mod smart_convert;
pub mod standard;
pub mod types;

pub use builtin::builtin_features;
pub use manager::FeatureManager;
pub use pipeline::Pipeline;
pub use types::{
    ExportArtifact, ExportFn, ExportRequest, Feature, FeatureHandler, FeatureInfo, FeatureState,
    FeatureType, TransformFn,
};
