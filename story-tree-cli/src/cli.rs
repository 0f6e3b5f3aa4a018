//! Command-line interface for `storytree`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Grow, inspect and validate branching stories.
#[derive(Parser, Debug)]
#[command(name = "storytree")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON file holding the scenelets
    #[arg(long, global = true, value_name = "PATH", default_value = "stories.json")]
    pub store: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start or resume growing a story with Claude
    Grow {
        /// Story identifier
        #[arg(long)]
        story: String,

        /// Premise the story is grown from
        #[arg(long)]
        premise: String,

        /// Optional working title
        #[arg(long)]
        title: Option<String>,
    },

    /// Print the pending generation tasks as JSON
    Plan {
        #[arg(long)]
        story: String,
    },

    /// Check a stored story against the tree invariants
    Validate {
        #[arg(long)]
        story: String,
    },

    /// Print the canonical snapshot of a story
    Snapshot {
        #[arg(long)]
        story: String,
    },
}
