//! DocNexus command-line host
//!
//! Loads plugins, builds the feature catalog and renders or exports
//! Markdown documents through it.

use clap::Parser;
use docnexus::core::{self, CliArgs, Command, Config, DocumentService, ExportOutcome};
use docnexus::feature::{ExportRequest, FeatureManager};
use docnexus::plugin::{PluginLoader, PluginRegistry, Slot};

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration (CLI args, env vars, config file, defaults)
    let config = match Config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting DocNexus v{}", docnexus::VERSION);

    let registry = Arc::new(PluginRegistry::new());
    if config.plugins.enabled {
        let loader = PluginLoader::from_config(&config.plugins);
        info!(roots = ?loader.roots(), "Plugin configuration");

        let report = loader.discover_and_load(&registry).await;
        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Plugin discovery finished"
        );

        // All plugins are registered before any of them initializes
        let lifecycle = registry.initialize_all().await;
        if !lifecycle.is_clean() {
            warn!(failed = ?lifecycle.failed, "Some plugins failed to initialize");
        }
    } else {
        info!("Plugins disabled by configuration");
    }

    let features = Arc::new(FeatureManager::new(Arc::clone(&registry)));
    let service = DocumentService::new(Arc::clone(&features), &config.export);

    let result = run(&args.command, &config, &service, &registry);

    let shutdown = registry.shutdown_all().await;
    if !shutdown.is_clean() {
        warn!(failed = ?shutdown.failed, "Some plugins failed to shut down");
    }

    result
}

fn run(
    command: &Command,
    config: &Config,
    service: &DocumentService,
    registry: &PluginRegistry,
) -> Result<()> {
    let experimental = config.pipeline.enable_experimental;
    let mut stdout = std::io::stdout().lock();

    match command {
        Command::Render { file, html } => {
            let source = service.read_source(file)?;
            let output = if *html {
                service.render_html(&source, experimental)?
            } else {
                service.render_markdown(&source, experimental)?
            };
            stdout.write_all(output.as_bytes())?;
        }

        Command::Export { file, format, output } => {
            let source = service.read_source(file)?;
            let request = ExportRequest {
                format: format.clone(),
                html: service.render_html(&source, experimental)?,
                filename: file_name(file),
            };

            match service.export(&request)? {
                ExportOutcome::Exported(artifact) => {
                    let path = output
                        .clone()
                        .unwrap_or_else(|| config.export.output_dir.join(&artifact.filename));
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent).with_context(|| {
                            format!("Failed to create output directory {}", parent.display())
                        })?;
                    }
                    std::fs::write(&path, &artifact.content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    writeln!(stdout, "Exported {} ({})", path.display(), artifact.mime_type)?;
                }
                ExportOutcome::HandlerNotFound(response) => {
                    eprintln!("{}", serde_json::to_string_pretty(&response)?);
                    anyhow::bail!(response.message);
                }
            }
        }

        Command::Plugins => {
            let plugins = registry.list();
            if plugins.is_empty() {
                writeln!(stdout, "No plugins loaded")?;
            }
            for plugin in plugins {
                writeln!(
                    stdout,
                    "{:<24} {:<10} {:<12} {}",
                    plugin.name, plugin.version, plugin.state, plugin.author
                )?;
            }
            for slot in Slot::ALL {
                let content = service.slot_content(slot.as_str());
                if !content.is_empty() {
                    writeln!(stdout, "  [{}] {} fragment(s)", slot, content.len())?;
                }
            }
        }

        Command::Features => {
            for feature in service.features().features() {
                writeln!(
                    stdout,
                    "{:<20} {:<14} {:<16} {}",
                    feature.name,
                    feature.state,
                    feature.feature_type,
                    feature.format.unwrap_or_default()
                )?;
            }
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
