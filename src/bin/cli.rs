//! keyword-relay CLI
//!
//! Streams items matching the configured poll options and relays each match
//! to nsqd until SIGINT or SIGTERM.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keyword_relay::{
    error::Result,
    models::Config,
    pipeline::{self, Collaborators},
    services::{FileKeywordStore, KeywordSource},
};

/// keyword-relay - stream keyword matcher
#[derive(Parser, Debug)]
#[command(
    name = "keyword-relay",
    version,
    about = "Relays stream items matching poll options to a message queue"
)]

struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay until interrupted (default)
    Run,

    /// Validate configuration and keyword store
    Validate,

    /// Print the current keyword set
    Keywords,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging is configured from the file, so read it before logging starts.
    let loaded = Config::load(&cli.config);
    let level = loaded
        .as_ref()
        .map(|config| config.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {}. Using defaults.",
                cli.config.display(),
                e
            );
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            log::info!("keyword-relay starting...");
            let collaborators = Collaborators::from_config(&config).await?;
            pipeline::run_relay(&config, collaborators, pipeline::termination_signal()).await?;
        }

        Command::Validate => {
            log::info!("✓ Config OK");
            let store = FileKeywordStore::new(&config.keywords.path);
            let keywords = store.load().await?;
            log::info!(
                "✓ Keyword store OK ({} keywords in {})",
                keywords.len(),
                store.describe()
            );
            log::info!("All validations passed!");
        }

        Command::Keywords => {
            let store = FileKeywordStore::new(&config.keywords.path);
            let keywords = store.load().await?;
            for keyword in keywords.iter() {
                println!("{keyword}");
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
