//! Core application module
//!
//! This module provides the core application layer including:
//! - Document rendering and export services
//! - Markdown to HTML conversion
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod config;
pub mod error;
pub mod logging;
pub mod render;
pub mod services;

pub use config::{CliArgs, Command, Config};
pub use error::{ErrorContext, ErrorResponse, NexusError, Result};
pub use logging::Logger;
pub use services::{DocumentService, ExportOutcome};
