//! Command-line interface for archilawyer.
//!
//! This module provides the CLI structure for the `archilawyer` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AskCommand, ConfigCommand, HistoryCommand, IndexCommand, IngestCommand, PreprocessCommand,
    SearchCommand,
};

/// Text printed by `archilawyer about`.
pub const ABOUT: &str = "\
Architect Assistant

Answers queries related to British building regulations. Ask a question and
receive concise, regulation-based answers with the source they came from.

Knowledge base:
  The merged Approved Documents (last updated 8 March 2023)
  https://www.gov.uk/guidance/building-regulations-and-approved-documents-index

Sample question:
  In the context of food preparation areas, what are the key requirements for
  sink provision according to Requirement G6, and how does it differ in
  dwellings and buildings other than dwellings?

Location of the answer in the document:
  Page 739 of the document";

/// archilawyer - Answers to building-regulation questions
///
/// Retrieves the passages of indexed building regulations closest to a
/// question and asks a language model to answer from them, citing sources.
#[derive(Debug, Parser)]
#[command(name = "archilawyer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ask a question about the regulations
    Ask(AskCommand),

    /// Show the regulation passages closest to a query
    Search(SearchCommand),

    /// Load a PDF into the vector index
    Ingest(IngestCommand),

    /// Print the documents a PDF would be split from
    Preprocess(PreprocessCommand),

    /// Manage the vector index
    #[command(subcommand)]
    Index(IndexCommand),

    /// Browse recorded answers
    #[command(subcommand)]
    History(HistoryCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Describe the knowledge base
    About,
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
