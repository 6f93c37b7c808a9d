pub mod cache;
pub mod datasets;
pub mod lookup;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "compulse",
    about = "Look up a company across public datasets",
    version
)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, env = "COMPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a company name against every dataset
    Lookup(LookupArgs),
    /// Inspect or clear cached dataset snapshots
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// List the datasets a name is resolved against
    Datasets,
}

#[derive(Args)]
pub struct LookupArgs {
    /// Company name as the user would type it
    pub name: String,
    /// Only resolve against these dataset ids (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
    /// Job title to search postings for
    #[arg(long)]
    pub role: Option<String>,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
    /// Fetch the latest annual filing for a matched registry entry
    #[arg(long)]
    pub filings: bool,
    /// Summarize filings and court records with the configured model server
    #[arg(long)]
    pub summarize: bool,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cached entries and when they were fetched
    Status,
    /// Remove one cached entry, or all of them
    Clear {
        /// Dataset id to remove (all entries if omitted)
        key: Option<String>,
    },
}
