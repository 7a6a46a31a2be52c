use clap::Parser;
use colored::*;
use linnaea::cli::{Cli, Commands};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging with LINNAEA_LOG environment variable support
    let log_level = std::env::var("LINNAEA_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        // Use appropriate exit codes based on error type
        let exit_code = match e.downcast_ref::<linnaea::LinnaeaError>() {
            Some(linnaea::LinnaeaError::Config(_)) => 2,
            Some(linnaea::LinnaeaError::Io(_)) => 3,
            Some(linnaea::LinnaeaError::Parse(_)) => 4,
            Some(linnaea::LinnaeaError::FatalInput(_)) => 5,
            Some(linnaea::LinnaeaError::Resolver(_)) => 6,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    linnaea::utils::parallel::configure_thread_pool(cli.threads)
        .expect("Failed to initialize thread pool");

    if cli.verbose > 0 {
        let num_threads = if cli.threads == 0 {
            num_cpus::get()
        } else {
            cli.threads
        };
        eprintln!("Using {} threads", num_threads);
    }

    match cli.command {
        Commands::Classify(args) => linnaea::cli::commands::classify::run(args),
        Commands::Lineage(args) => linnaea::cli::commands::lineage::run(args),
    }
}
