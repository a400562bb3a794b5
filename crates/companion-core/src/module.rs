//! Module Capability Traits
//!
//! Modules registered with the lifecycle manager opt into lifecycle hooks by
//! implementing `Initializable` and/or `Startable` and advertising them through
//! the `Module` accessors. A module with neither capability is a lifecycle-free
//! utility and is skipped in both phases.
//!
//! ```rust
//! use companion_core::{CompanionResult, Module, Startable};
//!
//! struct Scrobbler;
//!
//! #[async_trait::async_trait]
//! impl Startable for Scrobbler {
//!     async fn start(&self) -> CompanionResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! impl Module for Scrobbler {
//!     fn name(&self) -> &str {
//!         "Scrobbler"
//!     }
//!
//!     fn as_startable(&self) -> Option<&dyn Startable> {
//!         Some(self)
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::errors::CompanionResult;

/// First lifecycle phase: set up shared state
#[async_trait::async_trait]
pub trait Initializable: Send + Sync {
    async fn initialize(&self) -> CompanionResult<()>;
}

/// Second lifecycle phase: begin active operation
#[async_trait::async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self) -> CompanionResult<()>;
}

/// A registered module
pub trait Module: Send + Sync {
    /// Stable display name, used only for logging
    fn name(&self) -> &str;

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        None
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }
}

/// Shared reference to a registered module
pub type ModuleHandle = Arc<dyn Module>;
