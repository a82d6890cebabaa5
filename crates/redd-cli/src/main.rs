//! redd: command-line access to ReDD remote storage.
//!
//! Every command goes through the runtime-loaded client library; nothing is
//! linked against it at build time.

mod config;
mod transfer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_redd_ffi::{BindingManager, ReddFile};
use lib_storage::{IoFlags, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "redd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Path to a TOML or JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client library name or path (overrides the configuration)
    #[arg(long)]
    library: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and initialize the client library, then unload it
    Probe,

    /// Write a remote file to standard output
    Cat {
        /// Remote file name
        remote: String,
    },

    /// Copy a remote file to a local path
    Get {
        /// Remote file name
        remote: String,

        /// Local destination
        local: PathBuf,
    },

    /// Copy a local file to remote storage
    Put {
        /// Local source
        local: PathBuf,

        /// Remote file name
        remote: String,

        /// Fail if the remote file already exists
        #[arg(long)]
        exclusive: bool,
    },

    /// Show the size of a remote file
    Stat {
        /// Remote file name
        remote: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(library) = cli.library {
        config.library.name = library;
    }

    let manager = Arc::new(
        BindingManager::new(config.library.loader())
            .with_options(config.library.binding_options()),
    );
    if BindingManager::install_global(manager.clone()).is_err() {
        tracing::warn!("ReDD binding manager was already installed");
    }

    match cli.command {
        Commands::Probe => probe(&manager, cli.format)?,
        Commands::Cat { remote } => cat(&manager, &config, &remote)?,
        Commands::Get { remote, local } => get(&manager, &config, &remote, &local)?,
        Commands::Put { local, remote, exclusive } => {
            put(&manager, &config, &local, &remote, exclusive)?
        }
        Commands::Stat { remote } => stat(&manager, &config, &remote, cli.format)?,
    }

    Ok(())
}

fn open_remote(manager: &Arc<BindingManager>, config: &config::ReddConfig, remote: &str, flags: IoFlags) -> Result<ReddFile> {
    let lease = manager
        .acquire()
        .with_context(|| format!("Failed to load {}", manager.library_name()))?;
    let mut file = ReddFile::with_config(lease, config.file.file_config());
    file.open(remote, flags, config.file.permissions)?;
    Ok(file)
}

fn probe(manager: &Arc<BindingManager>, format: OutputFormat) -> Result<()> {
    tracing::info!("Probing {}", manager.library_name());

    manager
        .ensure_loaded()
        .with_context(|| format!("Failed to load {}", manager.library_name()))?;
    let loaded = manager.is_loaded();
    manager.ensure_unloaded();

    match format {
        OutputFormat::Text => {
            println!("Library: {}", manager.library_name());
            println!("Initialized: {}", if loaded { "yes" } else { "no" });
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "library": manager.library_name(),
                "initialized": loaded,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn cat(manager: &Arc<BindingManager>, config: &config::ReddConfig, remote: &str) -> Result<()> {
    let mut file = open_remote(manager, config, remote, IoFlags::OPEN_READ)?;
    let stdout = std::io::stdout();
    let copied = transfer::copy_to_writer(&mut file, &mut stdout.lock(), config.file.buffer_size)?;
    file.close()?;

    tracing::info!("Read {} bytes from {}", copied, remote);
    Ok(())
}

fn get(manager: &Arc<BindingManager>, config: &config::ReddConfig, remote: &str, local: &Path) -> Result<()> {
    let mut file = open_remote(manager, config, remote, IoFlags::OPEN_READ)?;
    let mut out = std::fs::File::create(local)
        .with_context(|| format!("Failed to create {:?}", local))?;
    let copied = transfer::copy_to_writer(&mut file, &mut out, config.file.buffer_size)?;
    file.close()?;

    tracing::info!("Copied {} bytes from {} to {:?}", copied, remote, local);
    Ok(())
}

fn put(
    manager: &Arc<BindingManager>,
    config: &config::ReddConfig,
    local: &Path,
    remote: &str,
    exclusive: bool,
) -> Result<()> {
    let mut input = std::fs::File::open(local)
        .with_context(|| format!("Failed to open {:?}", local))?;
    let mut file = open_remote(manager, config, remote, IoFlags::for_create(exclusive))?;

    let copied = match transfer::copy_from_reader(&mut input, &mut file, config.file.buffer_size) {
        Ok(copied) => copied,
        Err(e) => {
            file.abort();
            return Err(e.context(format!("Failed to upload {:?} to {}", local, remote)));
        }
    };
    file.close()?;

    tracing::info!("Copied {} bytes from {:?} to {}", copied, local, remote);
    Ok(())
}

fn stat(manager: &Arc<BindingManager>, config: &config::ReddConfig, remote: &str, format: OutputFormat) -> Result<()> {
    let mut file = open_remote(manager, config, remote, IoFlags::OPEN_READ)?;
    let stat = transfer::stat(remote, &mut file)?;
    file.close()?;

    transfer::write_stat(&stat, format, &mut std::io::stdout().lock())
}
