//! Configuration management

use clap::{Parser, Subcommand};
use config::builder::DefaultState;
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid plugin configuration: {0}")]
    InvalidPlugin(String),

    #[error("Invalid export configuration: {0}")]
    InvalidExport(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// Largest HTML payload accepted for export (50 MB).
pub const DEFAULT_MAX_EXPORT_HTML_SIZE: i64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub plugins: PluginsConfig,
    pub pipeline: PipelineConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        // 1. Defaults (lowest priority)
        let mut builder = with_defaults(ConfigBuilder::builder())?;

        // 2. Config file, if given
        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // 3. Environment, e.g. DOCNEXUS_PIPELINE__ENABLE_EXPERIMENTAL=true
        builder = builder.add_source(
            Environment::with_prefix("DOCNEXUS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI arguments (highest priority)
        if let Some(plugin_dir) = &cli_args.plugin_dir {
            builder = builder.set_override("plugins.dev_dir", plugin_dir.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }
        if cli_args.experimental {
            builder = builder.set_override("pipeline.enable_experimental", true)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Configuration made of defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigBuilder::builder())?
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.plugins.validate()?;
        self.export.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<DefaultState>,
) -> Result<config::ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder
        .set_default("plugins.dev_dir", "./plugins_dev")?
        .set_default("plugins.enabled", true)?
        .set_default("pipeline.enable_experimental", false)?
        .set_default("export.max_html_size", DEFAULT_MAX_EXPORT_HTML_SIZE)?
        .set_default("export.output_dir", "./exports")?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")?)
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "docnexus")]
#[command(about = "DocNexus document pipeline and plugin host", long_about = None)]
#[command(version)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Development plugin directory
    #[arg(long, value_name = "DIR", global = true)]
    pub plugin_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Include experimental pipeline features
    #[arg(long, global = true)]
    pub experimental: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a Markdown file through the feature pipeline
    Render {
        /// Markdown file to render
        file: PathBuf,

        /// Convert the pipeline output to HTML
        #[arg(long)]
        html: bool,
    },

    /// Render a Markdown file and export it through an export plugin
    Export {
        /// Markdown file to export
        file: PathBuf,

        /// Export format (e.g. html, pdf, docx)
        #[arg(short, long)]
        format: String,

        /// Output path; defaults to <export.output_dir>/<file stem>.<ext>
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List loaded plugins and their slot contributions
    Plugins,

    /// List the feature catalog
    Features,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Plugin root used when running from a source checkout
    pub dev_dir: PathBuf,
    /// Plugin root next to the installed binary; resolved at runtime when unset
    #[serde(default)]
    pub prod_dir: Option<PathBuf>,
    /// Load plugins at all
    pub enabled: bool,
}

impl PluginsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dev_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidPlugin("dev_dir cannot be empty".to_string()));
        }

        if let Some(prod_dir) = &self.prod_dir {
            if prod_dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidPlugin("prod_dir cannot be empty".to_string()));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub enable_experimental: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub max_html_size: usize, // bytes
    pub output_dir: PathBuf,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_html_size == 0 {
            return Err(ConfigError::InvalidExport(
                "max_html_size must be greater than 0".to_string(),
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidExport("output_dir cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "stderr", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::defaults().unwrap();
        assert_eq!(config.plugins.dev_dir, PathBuf::from("./plugins_dev"));
        assert!(config.plugins.prod_dir.is_none());
        assert!(config.plugins.enabled);
        assert!(!config.pipeline.enable_experimental);
        assert_eq!(config.export.max_html_size, 50 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[pipeline]\nenable_experimental = true\n\n[plugins]\nprod_dir = \"/opt/docnexus/plugins\"\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.pipeline.enable_experimental);
        assert_eq!(
            config.plugins.prod_dir,
            Some(PathBuf::from("/opt/docnexus/plugins"))
        );
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_file_written_from_table() {
        let mut export = toml::Table::new();
        export.insert("max_html_size".to_string(), toml::Value::Integer(1024));
        export.insert("output_dir".to_string(), toml::Value::String("./out".to_string()));
        let mut logging = toml::Table::new();
        logging.insert("format".to_string(), toml::Value::String("json".to_string()));
        let mut root = toml::Table::new();
        root.insert("export".to_string(), toml::Value::Table(export));
        root.insert("logging".to_string(), toml::Value::Table(logging));

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", toml::to_string(&root).unwrap()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.export.max_html_size, 1024);
        assert_eq!(config.export.output_dir, PathBuf::from("./out"));
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_environment_overrides_defaults() {
        std::env::set_var("DOCNEXUS_EXPORT__MAX_HTML_SIZE", "2048");
        let args = CliArgs::try_parse_from(["docnexus", "features"]).unwrap();
        let config = Config::load(&args);
        std::env::remove_var("DOCNEXUS_EXPORT__MAX_HTML_SIZE");

        let config = config.unwrap();
        assert_eq!(config.export.max_html_size, 2048);
        assert_eq!(config.export.output_dir, PathBuf::from("./exports"));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/docnexus.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_logging_validation() {
        let mut logging = LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
            output: "file".to_string(),
            log_file: None,
        };
        assert!(logging.validate().is_err());

        logging.log_file = Some(PathBuf::from("./logs/docnexus.log"));
        assert!(logging.validate().is_ok());

        logging.level = "verbose".to_string();
        assert!(logging.validate().is_err());
    }

    #[test]
    fn test_export_validation() {
        let export = ExportConfig {
            max_html_size: 0,
            output_dir: PathBuf::from("./exports"),
        };
        assert!(matches!(export.validate(), Err(ConfigError::InvalidExport(_))));
    }

    #[test]
    fn test_cli_parsing() {
        let args = CliArgs::try_parse_from([
            "docnexus",
            "--experimental",
            "export",
            "guide.md",
            "--format",
            "pdf",
        ])
        .unwrap();
        assert!(args.experimental);
        match args.command {
            Command::Export { file, format, output } => {
                assert_eq!(file, PathBuf::from("guide.md"));
                assert_eq!(format, "pdf");
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
