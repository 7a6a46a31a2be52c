pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "linnaea",
    version,
    about = "Consensus taxonomy assignment for sequence similarity hits",
    long_about = "Linnaea assigns a consensus taxonomic classification to each query sequence \
                  from a table of similarity-search hits, using an adaptive identity margin, \
                  deprecated-id remapping and evalue-weighted per-rank scoring."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify every query in a hit table
    Classify(commands::classify::ClassifyArgs),

    /// Resolve a single taxon id and print its lineage
    Lineage(commands::lineage::LineageArgs),
}
