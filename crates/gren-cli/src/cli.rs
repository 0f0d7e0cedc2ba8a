//! CLI argument definitions for gren.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "gren",
    version,
    about = "Dependency resolution and package cache for Gren projects"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the dependencies of the project in the current directory
    Resolve,

    /// Manage the shared package cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Copy a local package into the cache
    Add {
        /// Directory containing the package's gren.json
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Remove every cached package
    Clean,
    /// Show cache location, package count and size
    Stats,
}

pub fn parse() -> Cli {
    Cli::parse()
}
