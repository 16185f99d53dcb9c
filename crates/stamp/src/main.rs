// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stamp - a conversational time-tracking assistant with reliable delivery.
//!
//! This is the binary entry point for the Stamp server.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod serve;

/// Stamp - a conversational time-tracking assistant.
#[derive(Parser, Debug)]
#[command(name = "stamp", version, about, long_about = None)]
struct Cli {
    /// Explicit config file path (bypasses the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Stamp server.
    Serve,
    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => stamp_config::load_config_from_path(path)
            .map_err(stamp_config::diagnostic::figment_to_config_errors)
            .and_then(|config| {
                stamp_config::validation::validate_config(&config)?;
                Ok(config)
            }),
        None => stamp_config::load_and_validate(),
    };
    let config = match config {
        Ok(config) => config,
        Err(errors) => {
            stamp_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run(config).await {
                tracing::error!(error = %e, "server exited with error");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("stamp: failed to render config: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("stamp: use --help for available commands");
        }
    }
}

/// Initialize tracing with RUST_LOG taking precedence over the config level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stamp={log_level},info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0);
    }

    #[test]
    fn cli_parses_serve() {
        use clap::Parser;
        let cli = super::Cli::parse_from(["stamp", "serve"]);
        assert!(matches!(cli.command, Some(super::Commands::Serve)));
    }

    #[test]
    fn cli_parses_explicit_config_path() {
        use clap::Parser;
        let cli = super::Cli::parse_from(["stamp", "--config", "/tmp/stamp.toml", "config"]);
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/tmp/stamp.toml"))
        );
    }
}
