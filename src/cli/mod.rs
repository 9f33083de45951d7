pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Download novels for offline reading", long_about = None)]
pub struct Cli {
    /// Maximum number of concurrent downloads (overrides the config file)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue chapters of a novel and download them
    Add {
        /// Collection id on the remote source
        collection: String,

        /// Chapters to download, e.g. "1-10,15" (default: all)
        #[arg(short, long)]
        items: Option<String>,
    },
    /// Resume downloads left in the queue by a previous run
    Resume,
    /// Show the persisted download queue
    Queue,
    /// List downloaded novels
    List,
    /// Show a downloaded novel and its chapters
    Show {
        collection: String,
    },
    /// Print a downloaded chapter
    Read {
        collection: String,
        number: u32,
    },
    /// Remove chapters, or the whole novel when no numbers are given
    Remove {
        collection: String,
        numbers: Vec<u32>,
    },
    /// Fetch and save a novel's metadata without downloading chapters
    Info {
        collection: String,
    },
}
