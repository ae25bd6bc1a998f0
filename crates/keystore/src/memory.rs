//! In-memory backend for tests

use crate::backend::BackendKind;
use crate::error::{Result, StoreError};
use crate::store::{validate_key, Entry, SecretStore};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Process-lifetime store. Only opened when explicitly selected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn get(&self, key: &str) -> Result<Entry> {
        validate_key(key, &[])?;
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .map(|data| Entry::new(key, data.clone()))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key, &[])?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}
