//! Companion CLI library
//!
//! Host-side pieces for running the companion from a terminal: layered
//! configuration, a JSON-file state store, an HTTP auth client, reloadable
//! logging and the long-running host loop.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod modules;
pub mod state;

pub use cli::{Cli, Commands};
pub use client::HttpAuthClient;
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use host::{ChannelRestarter, CompanionHost};
pub use logging::{init_logging, LogHandle};
pub use state::{JsonFileStore, RunStatus};
