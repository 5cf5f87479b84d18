use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level CLI parser for the `cadence` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cadence",
    version,
    about = "Turns a newsletter into a rotating schedule of social posts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file layered over cadence.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format: text, json
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compose the next post without publishing it or touching the rotation
    Preview,

    /// Draft upcoming posts and write schedule.json and schedule.md
    Plan {
        /// Number of posts to plan (defaults to schedule.default_weeks)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=104))]
        weeks: Option<u32>,
    },

    /// Publish the next post and advance the rotation
    Commit,

    /// Show the rotation pointer, counters, and remaining backlog
    Status,

    /// Parse the source document and report structural problems
    Validate,

    /// Rewind the rotation to the first article
    Reset {
        /// Also forget what has been posted
        #[arg(long)]
        clear_history: bool,

        /// Overwrite the state file without reading it (recovers a corrupted file)
        #[arg(long)]
        force: bool,
    },

    /// Manage cached article analyses
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

impl Commands {
    /// Name used in the root span.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Preview => "preview",
            Commands::Plan { .. } => "plan",
            Commands::Commit => "commit",
            Commands::Status => "status",
            Commands::Validate => "validate",
            Commands::Reset { .. } => "reset",
            Commands::Cache { .. } => "cache",
        }
    }

    /// Whether the command calls the language model.
    pub fn needs_model(&self) -> bool {
        matches!(self, Commands::Preview | Commands::Plan { .. } | Commands::Commit)
    }
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Drop cached analyses so articles are analysed again
    Clear {
        /// Only this article (1-based) of the current document
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        article: Option<u32>,
    },
}
