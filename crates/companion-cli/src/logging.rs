//! Logging setup with a reloadable level filter

use companion_core::{CompanionError, CompanionResult, LogControl, LogLevel};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use crate::error::{CliError, Result};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Handle for re-initializing the installed subscriber's level
#[derive(Clone)]
pub struct LogHandle {
    handle: FilterHandle,
    verbose: bool,
}

impl LogHandle {
    fn new(handle: FilterHandle, verbose: bool) -> Self {
        Self { handle, verbose }
    }

    /// Active filter directive
    pub fn current(&self) -> Option<String> {
        self.handle.with_current(|filter| filter.to_string()).ok()
    }
}

impl LogControl for LogHandle {
    fn reinitialize(&self, level: LogLevel) -> CompanionResult<()> {
        // --verbose pins debug output
        let level = if self.verbose { LogLevel::Debug } else { level };
        self.handle
            .reload(EnvFilter::new(level.as_filter()))
            .map_err(|e| CompanionError::host(format!("Failed to reload log filter: {}", e)))
    }
}

/// Install the global subscriber
pub fn init_logging(verbose: bool, level: LogLevel) -> Result<LogHandle> {
    let level = if verbose { LogLevel::Debug } else { level };
    let (filter, handle) = reload::Layer::new(EnvFilter::new(level.as_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    Ok(LogHandle::new(handle, verbose))
}
