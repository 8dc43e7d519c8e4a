//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Extension point inspection CLI
///
/// Lists extension resources and builds adaptive dispatch classes.
#[derive(Parser, Debug)]
#[command(name = "knit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the resource entries of an extension point, per tier
    Scan(ScanCommand),

    /// List registered compiler backends
    Compilers {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Generate adaptive source from a point description (TOML)
    Generate(GenerateCommand),

    /// Compile generated adaptive source and print its dispatch table
    Compile(CompileCommand),

    /// Run diagnostics
    Doctor,

    /// Show version
    Version,
}

#[derive(Args, Debug)]
pub struct ScanCommand {
    /// Qualified extension point name (e.g. com.example.Greeter)
    pub point: String,

    /// Additional resource roots, searched after the configured ones
    #[arg(short, long = "root", value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Point description file
    pub file: PathBuf,

    /// Write the source here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CompileCommand {
    /// Generated source file
    pub file: PathBuf,

    /// Compiler backend (overrides the configured one)
    #[arg(short, long, env = "KNIT_COMPILER")]
    pub compiler: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}
