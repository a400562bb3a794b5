//! Command handlers for the companion CLI

use std::path::PathBuf;

use tracing::info;

use companion_core::{keys, StateStore};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::host::CompanionHost;
use crate::logging::LogHandle;
use crate::state::{JsonFileStore, RunStatus};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig, log: Option<LogHandle>) -> Result<()> {
        match cli.command {
            Commands::Run => Self::handle_run_command(config, cli.config, log).await,
            Commands::Validate => Self::handle_validate_command(config).await,
            Commands::Status => Self::handle_status_command(&config),
            Commands::ExampleConfig => {
                print!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Handle the run command
    async fn handle_run_command(
        config: AppConfig,
        config_path: Option<PathBuf>,
        log: Option<LogHandle>,
    ) -> Result<()> {
        info!("Using state directory {}", config.state_dir().display());
        let mut host = CompanionHost::new(config, config_path, log)?;
        host.run().await
    }

    /// Handle the validate command
    async fn handle_validate_command(config: AppConfig) -> Result<()> {
        let host = CompanionHost::new(config, None, None)?;
        let report = host.validate().await?;

        println!("{}: {}", report.message.title, report.message.body);
        if report.message.is_success() {
            Ok(())
        } else {
            Err(CliError::Validation(report.message.body))
        }
    }

    /// Handle the status command
    fn handle_status_command(config: &AppConfig) -> Result<()> {
        let store = JsonFileStore::open(config.state_file())?;

        println!("=== Companion Status ===");
        println!("State file: {}", store.path().display());

        let account = store
            .get_str(keys::AUTH_USERNAME)
            .filter(|_| store.get_str(keys::AUTH_TOKEN).is_some());
        match account {
            Some(username) => println!("Authenticated as: {}", username),
            None => println!("Authenticated as: -"),
        }

        let valid = store
            .get_bool(keys::PREFERENCES_VALID)
            .map(|valid| if valid { "yes" } else { "no" })
            .unwrap_or("unknown");
        println!("Preferences valid: {}", valid);
        println!(
            "Activity mode: {}",
            store
                .get_str(keys::PREFERENCES_ACTIVITY_MODE)
                .unwrap_or_else(|| "-".to_string())
        );
        println!(
            "Matcher mode: {}",
            store
                .get_str(keys::PREFERENCES_MATCHER_MODE)
                .unwrap_or_else(|| "-".to_string())
        );

        println!();
        match RunStatus::load_from_file(&config.status_file())? {
            Some(status) => {
                println!("Running: pid {} (v{})", status.pid, status.version);
                println!("Started at: {} (unix)", status.started_at);
                println!("Started in mode: {}", status.activity_mode);
            }
            None => println!("Running: no"),
        }

        Ok(())
    }
}
