//! Module Registry & Lifecycle Manager
//!
//! Modules are registered once, in dependency order, and driven through two
//! phases: every `Initializable` is initialized before any `Startable` is
//! started. Modules without a capability are skipped for that phase. The first
//! failure aborts the remaining sequence and is returned to the caller.

use std::fmt;

use companion_core::{CompanionResult, LifecycleError, ModuleHandle};
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Lifecycle Phase
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Registered,
    Initialized,
    Started,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Registered => "registered",
            LifecyclePhase::Initialized => "initialized",
            LifecyclePhase::Started => "started",
        };
        f.write_str(name)
    }
}

/// Names of the modules a phase actually invoked, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub invoked: Vec<String>,
}

impl PhaseReport {
    pub fn count(&self) -> usize {
        self.invoked.len()
    }

    fn summary(&self) -> String {
        self.invoked.join(", ")
    }
}

// ----------------------------------------------------------------------------
// Module Registry
// ----------------------------------------------------------------------------

/// Ordered module registry
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
    phase: LifecyclePhase,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            phase: LifecyclePhase::Registered,
        }
    }

    /// Append a module; only allowed before the first phase runs
    pub fn register(&mut self, module: ModuleHandle) -> CompanionResult<()> {
        if self.phase != LifecyclePhase::Registered {
            return Err(LifecycleError::OutOfOrder {
                requested: format!("register {}", module.name()),
                current: self.phase.to_string(),
            }
            .into());
        }
        debug!("Registered module {}", module.name());
        self.modules.push(module);
        Ok(())
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Registered module names in registration order
    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Run `initialize` on every initializable module
    pub async fn initialize_all(&mut self) -> CompanionResult<PhaseReport> {
        if self.phase != LifecyclePhase::Registered {
            return Err(self.out_of_order("initialize"));
        }

        let mut report = PhaseReport::default();
        for module in &self.modules {
            let Some(initializable) = module.as_initializable() else {
                continue;
            };
            initializable
                .initialize()
                .await
                .map_err(|e| LifecycleError::Initialize {
                    module: module.name().to_string(),
                    reason: e.to_string(),
                })?;
            report.invoked.push(module.name().to_string());
        }

        self.phase = LifecyclePhase::Initialized;
        info!("Initialized {} modules: {}", report.count(), report.summary());
        Ok(report)
    }

    /// Run `start` on every startable module; requires `initialize_all` first
    pub async fn start_all(&mut self) -> CompanionResult<PhaseReport> {
        if self.phase != LifecyclePhase::Initialized {
            return Err(self.out_of_order("start"));
        }

        let mut report = PhaseReport::default();
        for module in &self.modules {
            let Some(startable) = module.as_startable() else {
                continue;
            };
            startable
                .start()
                .await
                .map_err(|e| LifecycleError::Start {
                    module: module.name().to_string(),
                    reason: e.to_string(),
                })?;
            report.invoked.push(module.name().to_string());
        }

        self.phase = LifecyclePhase::Started;
        info!("Started {} modules: {}", report.count(), report.summary());
        Ok(report)
    }

    fn out_of_order(&self, requested: &str) -> companion_core::CompanionError {
        LifecycleError::OutOfOrder {
            requested: requested.to_string(),
            current: self.phase.to_string(),
        }
        .into()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
