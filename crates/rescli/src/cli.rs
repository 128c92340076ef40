//! Exposes the command line application.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rescache_service::caching::Coordinator;
use rescache_service::config::Config;
use rescache_service::{logging, metrics};

use crate::fetch::{self, FetchArgs};

/// Rescli commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch resources into the cache and print their local paths.
    Fetch(FetchArgs),

    /// Remove the cache directory with all cached resources.
    Clear,
}

/// Fetches remote resources into the local resource cache.
#[derive(Parser, Debug)]
#[command(author, version, about, bin_name = "rescli")]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    // SAFETY: No other threads have been spawned yet.
    unsafe { logging::init_logging(&config) };
    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to set up metrics")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("rescache")
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    let coordinator = Coordinator::from_config(&config, runtime.handle().clone())
        .context("failed to create the cache")?;

    match cli.command {
        Command::Fetch(args) => runtime.block_on(fetch::run(&coordinator, args)),
        Command::Clear => runtime
            .block_on(coordinator.clear())
            .with_context(|| format!("failed to clear {}", config.cache_dir.display())),
    }
}
