//! Companion CLI entry point

use clap::Parser;
use tracing::{error, info};

use companion_cli::{
    cli::{Cli, Commands},
    commands::CommandDispatcher,
    config::AppConfig,
    error::Result,
    logging::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    if cli.command == Commands::ExampleConfig {
        return CommandDispatcher::execute(cli, AppConfig::default(), None).await;
    }

    // Load configuration
    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Override state directory if specified
    if let Some(state_dir) = &cli.state_dir {
        config.runtime.state_dir = Some(state_dir.clone());
    }

    // Initialize logging
    let log = init_logging(cli.verbose, config.preferences.log_level)?;

    // Execute the command
    if let Err(e) = CommandDispatcher::execute(cli, config, Some(log)).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("Companion CLI exited successfully");
    Ok(())
}
