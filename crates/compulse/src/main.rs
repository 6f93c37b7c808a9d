mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{CacheCommands, Cli, Commands};
use compulse_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!("Cache directory: {}", config.cache.resolved_dir().display());

    match cli.command {
        Commands::Lookup(args) => cli::lookup::run(config, args).await,
        Commands::Cache { command } => match command {
            CacheCommands::Status => cli::cache::run_status(&config).await,
            CacheCommands::Clear { key } => cli::cache::run_clear(&config, key.as_deref()).await,
        },
        Commands::Datasets => cli::datasets::run(&config),
    }
}
