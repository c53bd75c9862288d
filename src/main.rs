// ABOUTME: Entry point for the sshpool CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use sshpool::config::{self, Config};
use sshpool::error::Result;
use sshpool::pool::SshPool;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;

    if let Commands::Init { force } = cli.command {
        config::init_config(&cwd, force)?;
        println!("Created {}", config::CONFIG_FILENAME);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover_or_default(&cwd)?,
    };

    match cli.command {
        Commands::Serve => commands::serve(SshPool::new(config.pool_settings())).await,
        Commands::Exec {
            host,
            command,
            password,
        } => commands::exec_command(config, host, command, password).await,
        Commands::Forward {
            host,
            lport,
            rhost,
            rport,
            password,
        } => commands::forward_command(config, host, lport, rhost, rport, password).await,
        Commands::Init { .. } => Ok(()),
    }
}
