// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repflow - a rep assistance orchestrator.
//!
//! This is the binary entry point for the Repflow service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod ingest;
mod serve;

/// Repflow - a rep assistance orchestrator.
#[derive(Parser, Debug)]
#[command(name = "repflow", version, about, long_about = None)]
struct Cli {
    /// Path to a config file (overrides the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Repflow orchestrator server.
    Serve,
    /// Ingest help articles into the semantic content index.
    Ingest {
        /// JSON file containing an array of articles
        /// (`{"id", "title", "url", "content"}`).
        file: PathBuf,
    },
}

fn load_config(path: &Option<PathBuf>) -> repflow_config::RepflowConfig {
    let loaded = match path {
        Some(path) => repflow_config::load_config_from_path(path),
        None => repflow_config::load_config(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration: {e}");
            std::process::exit(2);
        }
    };
    if let Err(errors) = repflow_config::validate_config(&config) {
        for error in &errors {
            eprintln!("error: invalid configuration: {error}");
        }
        std::process::exit(2);
    }
    config
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli.config);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Ingest { file } => ingest::run_ingest(&config, &file).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
