//! knit - Extension point inspection CLI
//!
//! Scans extension resource directories and generates and compiles adaptive
//! dispatch classes with the knit-core registry.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("knit=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Scan(cmd) => commands::scan::execute(cmd, &config),
        Commands::Compilers { json } => commands::compilers::execute(json, &config),
        Commands::Generate(cmd) => commands::generate::execute(cmd),
        Commands::Compile(cmd) => commands::compile::execute(cmd, &config),
        Commands::Doctor => commands::doctor::execute(&config),
        Commands::Version => {
            println!("knit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
