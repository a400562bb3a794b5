//! Singleton Guards
//!
//! `LockFileGuard` takes an advisory exclusive lock on a file and keeps the
//! handle open for the lifetime of the guard; the OS releases it on exit.
//! `UnguardedSingleton` is used when the host disables the lock file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use companion_core::SingletonGuard;
use fs2::FileExt;
use parking_lot::Mutex;
use tracing::{debug, warn};

// ----------------------------------------------------------------------------
// Lock File Guard
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum LockState {
    NotAttempted,
    Held(File),
    Unavailable,
}

/// Advisory lock on a file, acquired at most once
#[derive(Debug)]
pub struct LockFileGuard {
    path: PathBuf,
    state: Mutex<LockState>,
}

impl LockFileGuard {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(LockState::NotAttempted),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this guard currently holds the lock
    pub fn is_held(&self) -> bool {
        matches!(*self.state.lock(), LockState::Held(_))
    }

    fn try_lock(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.try_lock_exclusive()?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(file)
    }
}

impl SingletonGuard for LockFileGuard {
    fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        if let LockState::NotAttempted = *state {
            *state = match self.try_lock() {
                Ok(file) => {
                    debug!("Acquired singleton lock {}", self.path.display());
                    LockState::Held(file)
                }
                Err(e) => {
                    warn!(
                        "Singleton lock {} unavailable: {}",
                        self.path.display(),
                        e
                    );
                    LockState::Unavailable
                }
            };
        }
        matches!(*state, LockState::Held(_))
    }
}

// ----------------------------------------------------------------------------
// Unguarded
// ----------------------------------------------------------------------------

/// Guard that always succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct UnguardedSingleton;

impl SingletonGuard for UnguardedSingleton {
    fn acquire(&self) -> bool {
        true
    }
}
