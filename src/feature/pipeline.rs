//! Feature pipeline
//!
//! A pipeline is an ordered chain of algorithm features built for a single
//! render. Passes run strictly in sequence since later passes read the text
//! left behind by earlier ones.

use tracing::{debug, error};
use crate::core::error::{NexusError, Result};
use super::types::{Feature, FeatureHandler, TransformFn};

/// Ordered chain of text transformation passes
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<(String, TransformFn)>,
}

impl Pipeline {
    /// Build a pipeline from features, keeping only algorithm features, in order
    pub fn new(features: impl IntoIterator<Item = Feature>) -> Self {
        let steps = features
            .into_iter()
            .filter_map(|feature| match feature.handler {
                FeatureHandler::Algorithm(handler) => Some((feature.name, handler)),
                _ => None,
            })
            .collect();
        Self { steps }
    }

    /// Names of the passes, in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Thread `text` through every pass in order
    ///
    /// The first failing pass aborts the run and its error is returned,
    /// wrapped so that it names the failing feature. Partially transformed
    /// text is never returned.
    pub fn run(&self, text: &str) -> Result<String> {
        let mut current = text.to_string();
        for (name, handler) in &self.steps {
            current = handler(&current).map_err(|e| {
                error!(feature = %name, "Pipeline step failed: {}", e);
                match e {
                    NexusError::PipelineError { .. } => e,
                    other => NexusError::PipelineError {
                        feature: name.clone(),
                        message: other.to_string(),
                    },
                }
            })?;
            debug!(feature = %name, bytes = current.len(), "Pipeline step applied");
        }
        Ok(current)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}
