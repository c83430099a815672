// src/main.rs

//! The main entry point for the cloud variable server application.

use anyhow::{Context, Result};
use cloudvar::config::Config;
use cloudvar::core::log_sink::LineCappedFile;
use cloudvar::server;
use std::env;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    // Collect command-line arguments to decide the execution mode.
    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("cloudvar version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path. An explicit --config must exist; the
    // default location is optional.
    let explicit_config = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|i| args.get(i + 1).map(|s| s.as_str()));
    let loaded = match explicit_config {
        Some(Some(path)) => Config::from_file(path).map(|cfg| (cfg, path)),
        Some(None) => {
            eprintln!("--config flag requires a value");
            std::process::exit(1);
        }
        None => {
            if !std::path::Path::new(DEFAULT_CONFIG_PATH).exists() {
                eprintln!(
                    "No configuration file at \"{DEFAULT_CONFIG_PATH}\". Starting with defaults."
                );
            }
            Config::from_file_or_default(DEFAULT_CONFIG_PATH).map(|cfg| (cfg, DEFAULT_CONFIG_PATH))
        }
    };
    let (mut config, config_path) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    // Override port if provided as a command-line argument
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    // The banner goes straight to stdout, before any log line.
    if let Some(banner) = &config.banner {
        println!("{banner}");
    }

    init_logging(&config)?;
    info!("cloudvar {} starting with configuration from '{}'.", VERSION, config_path);

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Installs the global subscriber: a compact ANSI console layer plus, when
/// enabled, a line-capped plain-text file layer.
fn init_logging(config: &Config) -> Result<()> {
    // Get the log level from the env var or the config.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    let file_layer = if config.log_to_file {
        let sink = LineCappedFile::open(&config.log_file_path, config.max_log_lines)
            .with_context(|| format!("Failed to open log file '{}'", config.log_file_path))?;
        Some(
            fmt::layer()
                .compact()
                .with_ansi(false)
                .with_writer(Mutex::new(sink)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .with(file_layer)
        .init();
    Ok(())
}
