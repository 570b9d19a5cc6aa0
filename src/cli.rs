//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// inkwell incremental site engine CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file name (default: site.toml)
    #[arg(short = 'C', long, default_value = "site.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scan all pages, run generation once and exit
    Build {
        /// Ignore the persisted cache file and start from an empty cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Build, then keep regenerating affected pages as inputs change
    Watch {
        /// Ignore the persisted cache file and start from an empty cache
        #[arg(long)]
        no_cache: bool,
    },
}

impl Cli {
    pub const fn is_watch(&self) -> bool {
        matches!(self.command, Commands::Watch { .. })
    }

    pub const fn no_cache(&self) -> bool {
        match self.command {
            Commands::Build { no_cache } | Commands::Watch { no_cache } => no_cache,
        }
    }
}
