use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use macropad::{
    config::Config,
    open_store,
    store::{ConfigStore, DocumentKind, DocumentLimits, MemoryStorage, ParsedConfig},
    App, Options,
};

#[derive(Parser, Debug)]
#[command(name = "macropad")]
#[command(about = "Multi-layout macro keypad with BLE/USB output and a web configurator")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.config/macropad/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the keyconfig, macros and system documents
    #[arg(long, value_name = "DIR")]
    storage: Option<PathBuf>,

    /// Start in Config Mode regardless of the retained boot mode
    #[arg(long)]
    config_mode: bool,

    /// Drive the simulated keypad from stdin
    #[arg(long)]
    console: bool,

    /// Print the stored documents and retained state, then exit
    #[arg(long)]
    status: bool,

    /// Validate a document file and exit
    #[arg(long, value_name = "FILE")]
    validate: Option<PathBuf>,

    /// Document type for --validate (keyconfig, macros, system)
    #[arg(long, value_name = "KIND", default_value = "keyconfig")]
    kind: DocumentKind,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Handle simple commands first
    if let Some(path) = &cli.validate {
        return validate(&config, path, cli.kind);
    }

    if cli.status {
        return print_status(&config, cli.storage.as_deref());
    }

    info!("Starting macropad");

    let options = Options {
        storage_dir: cli.storage,
        force_config_mode: cli.config_mode,
        console: cli.console,
    };
    let mut app = App::new(config, options).await?;

    // Set up signal handlers for graceful shutdown
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let result = tokio::select! {
        result = app.run() => {
            result
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            Ok(())
        }
    };

    // Always run shutdown
    app.shutdown().await;
    result
}

fn validate(config: &Config, path: &std::path::Path, kind: DocumentKind) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let store = ConfigStore::new(
        Arc::new(MemoryStorage::new()),
        DocumentLimits::from_config(config),
    );

    match store.parse(kind, &data) {
        Ok(ParsedConfig::Layers(layers)) => {
            println!("✓ {} layer(s)", layers.len());
            for layer in &layers {
                println!("  {}", layer.title);
            }
            Ok(())
        }
        Ok(ParsedConfig::Macros(macros)) => {
            println!("✓ {} macro slot(s)", macros.len());
            Ok(())
        }
        Ok(ParsedConfig::System(system)) => {
            println!("✓ system settings (ssid '{}')", system.ssid);
            Ok(())
        }
        Err(e) => {
            println!("✗ {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn print_status(config: &Config, storage: Option<&std::path::Path>) -> Result<()> {
    let (store, retained) = open_store(config, storage)?;
    let state = retained.load();

    println!("Boot mode: {:?}", state.boot_mode);
    println!("Layout index: {}", state.layout_index);

    match store.load_layers() {
        Ok(layers) => {
            println!("Layouts:");
            for (i, layer) in layers.iter().enumerate() {
                let marker = if i == state.layout_index { "*" } else { " " };
                println!(" {} {}", marker, layer.title);
            }
        }
        Err(e) => println!("✗ keyconfig: {}", e),
    }

    match store.load_macros() {
        Ok(macros) => println!("Macros: {} slot(s)", macros.len()),
        Err(e) => println!("✗ macros: {}", e),
    }

    let usage = store.usage()?;
    println!(
        "Storage: {} file(s), {}",
        usage.files.len(),
        macropad::web::human_size(usage.used_bytes)
    );
    Ok(())
}
