//! Persisted State Store
//!
//! The store is the companion's only durable memory across restarts. Writes are
//! whole-value replacements staged in memory; nothing is durable until
//! `commit()` is called. Implementations use interior mutability because the
//! store is shared between the authenticator, the reconciler and background
//! tasks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CompanionResult;

// ----------------------------------------------------------------------------
// Keys
// ----------------------------------------------------------------------------

/// Persisted key names
pub mod keys {
    pub const AUTH_TOKEN: &str = "auth.token";
    pub const AUTH_USERNAME: &str = "auth.username";
    pub const PREFERENCES_VALID: &str = "preferences.valid";
    pub const PREFERENCES_MATCHER_MODE: &str = "preferences.matcher_mode";
    pub const PREFERENCES_ACTIVITY_MODE: &str = "preferences.activity_mode";
}

// ----------------------------------------------------------------------------
// Store Value
// ----------------------------------------------------------------------------

/// Value held under a store key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Bool(bool),
    Text(String),
}

impl StoreValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::Text(text) => Some(text),
            StoreValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoreValue::Bool(value) => Some(*value),
            StoreValue::Text(_) => None,
        }
    }
}

impl From<bool> for StoreValue {
    fn from(value: bool) -> Self {
        StoreValue::Bool(value)
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        StoreValue::Text(value)
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        StoreValue::Text(value.to_string())
    }
}

// ----------------------------------------------------------------------------
// State Store Trait
// ----------------------------------------------------------------------------

/// Durable string-keyed store with an explicit commit
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<StoreValue>;

    /// Replace the value under `key`
    fn set(&self, key: &str, value: StoreValue);

    fn remove(&self, key: &str);

    /// Make all staged writes durable
    fn commit(&self) -> CompanionResult<()>;

    /// Non-empty text value under `key`
    fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(StoreValue::Text(text)) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|value| value.as_bool())
    }
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

/// Store that keeps staged and committed maps in memory
///
/// Useful for tests and for hosts that provide their own durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    staged: RwLock<BTreeMap<String, StoreValue>>,
    committed: RwLock<BTreeMap<String, StoreValue>>,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store as if `entries` had been committed by a previous run
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StoreValue>,
    {
        let map: BTreeMap<String, StoreValue> = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        Self {
            staged: RwLock::new(map.clone()),
            committed: RwLock::new(map),
            commits: AtomicUsize::new(0),
        }
    }

    /// Copy of what the last commit made durable
    pub fn committed(&self) -> BTreeMap<String, StoreValue> {
        self.committed.read().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStore {
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
        let snapshot = self.staged.read().clone();
        let entries = snapshot.len();
        *self.committed.write() = snapshot;
        let commits = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Committed {} store entries (commit #{})", entries, commits);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_staged_until_commit() {
        let store = MemoryStore::new();
        store.set(keys::AUTH_TOKEN, "T1".into());

        assert_eq!(store.get_str(keys::AUTH_TOKEN).as_deref(), Some("T1"));
        assert!(store.committed().is_empty());

        store.commit().unwrap();
        assert_eq!(
            store.committed().get(keys::AUTH_TOKEN),
            Some(&StoreValue::Text("T1".to_string()))
        );
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_empty_text_reads_as_absent() {
        let store = MemoryStore::with_entries([(keys::AUTH_TOKEN, "")]);
        assert_eq!(store.get_str(keys::AUTH_TOKEN), None);
    }

    #[test]
    fn test_typed_accessors() {
        let store = MemoryStore::new();
        store.set(keys::PREFERENCES_VALID, false.into());
        assert_eq!(store.get_bool(keys::PREFERENCES_VALID), Some(false));
        assert_eq!(store.get_str(keys::PREFERENCES_VALID), None);
    }

    #[test]
    fn test_store_value_json_shape() {
        let encoded = serde_json::to_string(&StoreValue::Bool(true)).unwrap();
        assert_eq!(encoded, "true");
        let decoded: StoreValue = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(decoded, StoreValue::Text("abc".to_string()));
    }
}
