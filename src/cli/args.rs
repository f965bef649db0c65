use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Print a default configuration file and exit
    #[arg(long)]
    pub generate_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Identify the eggs in an image and record the result
    Scan {
        /// Image file to identify
        image: PathBuf,
    },

    /// Inspect or clear the scan history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage the image cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List recorded scans, newest first
    List {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete every record and its image
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Remove expired entries and enforce the size budget
    Sweep,

    /// Clear all cache entries
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Load an image through the cache
    Fetch {
        url: String,

        /// Write the image to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
