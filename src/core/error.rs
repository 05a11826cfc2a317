//! Error type system for DocNexus
//!
//! This module provides the error types shared by the pipeline, the plugin
//! system and the document service:
//! - Hierarchical error classification
//! - Error context and chaining support
//! - Serializable error responses with trace IDs for the request layer

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Main error type for DocNexus
#[derive(Debug, thiserror::Error)]
pub enum NexusError {
    // System-level errors
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Plugin-related errors
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin load failed: {0}")]
    PluginLoadError(String),

    #[error("Plugin lifecycle error in {plugin}: {message}")]
    PluginLifecycleError { plugin: String, message: String },

    // Pipeline errors
    #[error("Pipeline step '{feature}' failed: {message}")]
    PipelineError { feature: String, message: String },

    // Export errors
    #[error("Export to {format} failed: {message}")]
    ExportError { format: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    // I/O errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl NexusError {
    /// Get the error type name for responses
    pub fn error_type(&self) -> &'static str {
        match self {
            NexusError::InitializationError(_) => "InitializationError",
            NexusError::ConfigError(_) => "ConfigError",
            NexusError::PluginNotFound(_) => "PluginNotFound",
            NexusError::PluginLoadError(_) => "PluginLoadError",
            NexusError::PluginLifecycleError { .. } => "PluginLifecycleError",
            NexusError::PipelineError { .. } => "PipelineError",
            NexusError::ExportError { .. } => "ExportError",
            NexusError::ValidationError(_) => "ValidationError",
            NexusError::IoError(_) => "IoError",
            NexusError::SerializationError(_) => "SerializationError",
            NexusError::DeserializationError(_) => "DeserializationError",
        }
    }

    /// Whether the error was caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NexusError::ValidationError(_)
                | NexusError::DeserializationError(_)
                | NexusError::PluginNotFound(_)
        )
    }
}

impl From<serde_json::Error> for NexusError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            NexusError::DeserializationError(err.to_string())
        } else {
            NexusError::SerializationError(err.to_string())
        }
    }
}

/// Error response structure handed to the request layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unique trace ID for this error
    pub trace_id: String,
}

impl ErrorResponse {
    /// Create a new error response with a generated trace ID
    pub fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            details: None,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an error response with additional details
    pub fn with_details(error: String, message: String, details: serde_json::Value) -> Self {
        Self {
            error,
            message,
            details: Some(details),
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an error response from a NexusError
    pub fn from_error(error: &NexusError) -> Self {
        let response = Self::new(error.error_type().to_string(), error.to_string());
        tracing::error!(
            error_type = error.error_type(),
            trace_id = %response.trace_id,
            "Request failed: {}",
            error
        );
        response
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}{} (trace_id: {})",
            self.error,
            self.message,
            self.details.as_ref().map_or("", |_| " with details"),
            self.trace_id
        )
    }
}

/// Result type alias for operations that can fail with NexusError
pub type Result<T> = std::result::Result<T, NexusError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let context_str = context.into();
            NexusError::InitializationError(format!("{}: {}", context_str, e))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context_str = f();
            NexusError::InitializationError(format!("{}: {}", context_str, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        assert_eq!(
            NexusError::PluginNotFound("test".into()).error_type(),
            "PluginNotFound"
        );
        assert_eq!(
            NexusError::PipelineError {
                feature: "STD_TOC".into(),
                message: "boom".into()
            }
            .error_type(),
            "PipelineError"
        );
        assert_eq!(
            NexusError::ValidationError("too large".into()).error_type(),
            "ValidationError"
        );
    }

    #[test]
    fn test_pipeline_error_names_feature() {
        let err = NexusError::PipelineError {
            feature: "SMART_SIP".into(),
            message: "bad block".into(),
        };
        let text = err.to_string();
        assert!(text.contains("SMART_SIP"));
        assert!(text.contains("bad block"));
    }

    #[test]
    fn test_client_errors() {
        assert!(NexusError::ValidationError("x".into()).is_client_error());
        assert!(!NexusError::PluginLoadError("x".into()).is_client_error());
    }

    #[test]
    fn test_json_error_is_deserialization() {
        let err: NexusError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.error_type(), "DeserializationError");
    }

    #[test]
    fn test_error_response_creation() {
        let error = NexusError::PluginNotFound("pdf-export".into());
        let response = ErrorResponse::from_error(&error);

        assert_eq!(response.error, "PluginNotFound");
        assert!(response.message.contains("pdf-export"));
        assert!(!response.trace_id.is_empty());
        assert!(response.details.is_none());
    }

    #[test]
    fn test_error_response_with_details() {
        let details = serde_json::json!({
            "format": "pdf",
            "available_formats": ["html"]
        });

        let response = ErrorResponse::with_details(
            "HandlerNotFound".into(),
            "No export handler".into(),
            details.clone(),
        );

        assert_eq!(response.error, "HandlerNotFound");
        assert_eq!(response.details, Some(details));
        assert!(response.to_string().contains("with details"));
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let contexted = result.context("Failed to read plugin manifest");

        let err = contexted.unwrap_err();
        assert!(err.to_string().contains("Failed to read plugin manifest"));
        assert!(err.to_string().contains("file not found"));
    }
}
