//! Portier - authentication gateway for axum services
//!
//! Main entry point for the Portier CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

mod authenticator;
mod commands;
mod logging;

use commands::{discover, gen_cookie_key, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Portier - OpenID Connect and Basic authentication in front of your routes
#[derive(Parser)]
#[command(name = "portier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file (overrides default discovery)
    #[arg(long, global = true, env = "PORTIER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve a demo app protected by the configured authenticator
    Serve(serve::ServeArgs),

    /// Fetch and validate the provider's discovery document
    Discover(discover::DiscoverArgs),

    /// Generate a random session cookie key
    GenCookieKey(gen_cookie_key::GenCookieKeyArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref())?;

    let logging = loaded.config.logging.clone().unwrap_or_default();
    let _guard = logging::init(cli.verbose, &logging);

    // Print warnings (plaintext secrets, parse errors, etc.)
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Discover(args) => discover::run(args, &ctx).await,
        Commands::GenCookieKey(args) => gen_cookie_key::run(args, &ctx),
    }
}
