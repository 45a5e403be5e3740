use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::config::RankOverrides;

#[derive(Debug, Parser)]
#[command(
    name = "rentrank",
    about = "Rank rental listings by hard constraints and semantic similarity"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding backend used for descriptions and queries
    #[arg(long, value_enum, default_value = "colbert", global = true)]
    pub embedder: EmbedderKind,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Pooled ColBERT token embeddings (downloads the model on first use)
    Colbert,
    /// Model-free hashed bag of words
    Hash,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rank the listings of a dataset against a free-text query
    Search(SearchArgs),
    /// Manage stored defaults for ranking options
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Show system status and statistics
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp(McpArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The free-text query matched against listing descriptions
    pub query: String,

    /// Listing dataset (defaults to the `dataset` setting)
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Maximum monthly price
    #[arg(long)]
    pub max_price: Option<f64>,

    /// Minimum number of bedrooms
    #[arg(long)]
    pub min_bedrooms: Option<u32>,

    /// Weight of the hard-constraint score
    #[arg(long)]
    pub weight_hard: Option<f32>,

    /// Weight of the semantic score
    #[arg(long)]
    pub weight_semantic: Option<f32>,

    /// Minimum final score for a listing to be returned
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Number of results to return
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Return all results above the score threshold
    #[arg(long, conflicts_with = "count")]
    pub all: bool,

    /// Score constraints as plain 0/1 matches instead of graded penalties
    #[arg(long)]
    pub binary_filter: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn overrides(&self) -> RankOverrides {
        RankOverrides {
            max_price: self.max_price,
            min_bedrooms: self.min_bedrooms,
            weight_hard: self.weight_hard,
            weight_semantic: self.weight_semantic,
            threshold: self.threshold,
            top_k: self.count,
            all: self.all,
            binary_filter: self.binary_filter,
        }
    }
}

// -- Settings --

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show every stored setting
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a default value
    Set {
        /// Setting name (e.g. threshold, weight_hard, max_price)
        key: String,
        /// New value
        value: String,
    },
    /// Remove a stored value (revert to the built-in default)
    Clear {
        /// Setting name
        key: String,
    },
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- MCP --

#[derive(Debug, Parser)]
pub struct McpArgs {
    /// Listing dataset served by the tools (defaults to the `dataset` setting)
    #[arg(long)]
    pub dataset: Option<PathBuf>,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "rentrank",
            &mut std::io::stdout(),
        );
    }
}
