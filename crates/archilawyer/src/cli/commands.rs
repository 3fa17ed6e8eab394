//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::regulation::Profile;

/// Ask command arguments.
#[derive(Debug, Args)]
pub struct AskCommand {
    /// The question; read from stdin when omitted
    pub question: Option<String>,

    /// Ask the model directly, without retrieving regulation passages
    #[arg(short, long)]
    pub direct: bool,

    /// Number of passages to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Do not record the answer in the history
    #[arg(long)]
    pub no_history: bool,
}

/// Search command arguments.
#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Text to find matching regulation passages for
    pub query: String,

    /// Number of passages to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Ingest command arguments.
#[derive(Debug, Args)]
pub struct IngestCommand {
    /// PDF file to ingest
    pub pdf: PathBuf,

    /// How pages are shaped before splitting
    #[arg(short, long, value_enum, default_value_t = Profile::Plain)]
    pub profile: Profile,

    /// Delete and recreate the index first
    #[arg(long)]
    pub recreate: bool,

    /// Stop after splitting; contact no service
    #[arg(long)]
    pub dry_run: bool,

    /// Override the chunk size
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Override the chunk overlap
    #[arg(long)]
    pub chunk_overlap: Option<usize>,
}

/// Preprocess command arguments.
#[derive(Debug, Args)]
pub struct PreprocessCommand {
    /// PDF file to preprocess
    pub pdf: PathBuf,

    /// How pages are shaped
    #[arg(short, long, value_enum, default_value_t = Profile::TechnicalConditions)]
    pub profile: Profile,

    /// Write JSON lines here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Vector index commands.
#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// List indexes
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Describe an index (defaults to the configured one)
    Describe {
        /// Index name
        name: Option<String>,
    },

    /// Show vector statistics of an index
    Stats {
        /// Index name
        name: Option<String>,
    },

    /// Create an index and wait until it is ready
    Create {
        /// Index name
        name: Option<String>,
    },

    /// Delete an index
    Delete {
        /// Index name
        name: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Answer history commands.
#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// Show recent answers
    List {
        /// Number of answers to show
        #[arg(short, long, default_value = "10")]
        last: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Search past questions and answers
    Search {
        /// Text to look for
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show history database statistics
    Stats,

    /// Apply the configured retention limits
    Prune,

    /// Delete every recorded answer
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
