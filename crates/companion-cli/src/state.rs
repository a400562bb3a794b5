//! State persistence for the companion CLI
//!
//! `JsonFileStore` implements the runtime's state store on top of a single
//! JSON file. Writes are staged in memory; `commit` writes a temporary file
//! next to the target and renames it into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use companion_core::{
    ActivityMode, CompanionError, CompanionResult, StateStore, StoreError, StoreValue,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: BTreeMap<String, StoreValue>,
}

// ----------------------------------------------------------------------------
// JSON File Store
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    staged: RwLock<BTreeMap<String, StoreValue>>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&contents).map_err(|e| {
                CliError::StatePersistence(format!(
                    "Failed to parse state file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if file.version != STORE_FORMAT_VERSION {
                return Err(CliError::StatePersistence(format!(
                    "Unsupported state file version {} in {}",
                    file.version,
                    path.display()
                )));
            }
            file.entries
        } else {
            BTreeMap::new()
        };

        debug!("Opened state store {} ({} entries)", path.display(), entries.len());
        Ok(Self {
            path,
            staged: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the staged entries
    pub fn entries(&self) -> BTreeMap<String, StoreValue> {
        self.staged.read().clone()
    }

    fn write_file(&self, file: &StoreFile) -> CompanionResult<()> {
        let contents = serde_json::to_string_pretty(file)
            .map_err(|e| CompanionError::store_serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::from)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(StoreError::from)?;
        std::fs::rename(&tmp, &self.path).map_err(StoreError::from)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<StoreValue> {
        self.staged.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: StoreValue) {
        self.staged.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.staged.write().remove(key);
    }

    fn commit(&self) -> CompanionResult<()> {
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            entries: self.staged.read().clone(),
        };
        self.write_file(&file)?;
        debug!(
            "Committed {} entries to {}",
            file.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Status File
// ----------------------------------------------------------------------------

/// Written while `run` is active so `status` can report on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub pid: u32,
    pub version: String,
    pub started_at: u64,
    pub activity_mode: ActivityMode,
}

impl RunStatus {
    pub fn current(activity_mode: ActivityMode) -> Self {
        Self {
            pid: std::process::id(),
            version: companion_core::VERSION.to_string(),
            started_at: current_timestamp(),
            activity_mode,
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Current timestamp in seconds
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
