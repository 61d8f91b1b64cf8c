//! Command-line argument definitions for the ecdsl CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. A subcommand selects the operation; configuration file
//! selection and logging verbosity apply to every subcommand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line arguments for the ecdsl tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile every `.ec` document under a directory and report diagnostics
    Check {
        #[arg(default_value = ".")]
        root: PathBuf,
    },

    /// Compile every `.ec` document under a directory and print the graph as JSON
    Graph {
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Write the graph to a file instead of standard output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Format documents, printing the result unless `--write` or `--check` is given
    Fmt {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Rewrite the files in place
        #[arg(long, conflicts_with = "check")]
        write: bool,

        /// Fail if any file is not formatted
        #[arg(long)]
        check: bool,
    },
}
