//! OS keychain backend
//!
//! Uses the platform credential service through the `keyring` crate:
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service API (GNOME Keyring, KWallet, etc.)
//!
//! None of these can enumerate a service's entries portably, so the key
//! set is shadowed in a reserved index entry holding a JSON array.

use crate::backend::BackendKind;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{validate_key, Entry, SecretStore};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Entry name of the key index
pub const INDEX_KEY: &str = "__vetinari_index__";

/// Secret store backed by the system keychain
pub struct OsNativeStore {
    kind: BackendKind,
    service: String,
    /// Collection (Secret Service) the entries live in
    target: Option<String>,
    /// Serializes read-modify-write of the index entry
    index_lock: Mutex<()>,
}

impl fmt::Debug for OsNativeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsNativeStore")
            .field("kind", &self.kind)
            .field("service", &self.service)
            .field("target", &self.target)
            .finish()
    }
}

impl OsNativeStore {
    /// Connect and check access by reading the index. A missing index is an
    /// empty store; anything else means the service is unusable.
    pub fn open(kind: BackendKind, config: &StoreConfig) -> Result<Self> {
        let target = if cfg!(target_os = "linux") {
            Some(config.keychain_name.clone())
        } else {
            None
        };

        let store = Self {
            kind,
            service: config.service_name.clone(),
            target,
            index_lock: Mutex::new(()),
        };

        let keys = store.read_index()?;
        debug!(backend = %kind, service = %store.service, keys = keys.len(), "opened keychain");
        Ok(store)
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        let entry = match &self.target {
            Some(target) => keyring::Entry::new_with_target(target, &self.service, key),
            None => keyring::Entry::new(&self.service, key),
        };
        entry.map_err(|e| self.error(&format!("failed to create entry '{}'", key), e))
    }

    fn read_index(&self) -> Result<Vec<String>> {
        match self.entry(INDEX_KEY)?.get_secret() {
            Ok(bytes) => decode_index(&bytes).map_err(|e| StoreError::backend(self.kind, e)),
            Err(keyring::Error::NoEntry) => Ok(vec![]),
            Err(e) => Err(self.error("failed to read key index", e)),
        }
    }

    fn write_index(&self, keys: &[String]) -> Result<()> {
        let bytes = encode_index(keys);
        self.entry(INDEX_KEY)?
            .set_secret(&bytes)
            .map_err(|e| self.error("failed to write key index", e))
    }

    fn error(&self, context: &str, e: keyring::Error) -> StoreError {
        StoreError::backend(self.kind, format!("{}: {}", context, e))
    }
}

impl SecretStore for OsNativeStore {
    fn backend(&self) -> BackendKind {
        self.kind
    }

    fn get(&self, key: &str) -> Result<Entry> {
        validate_key(key, &[INDEX_KEY])?;
        match self.entry(key)?.get_secret() {
            Ok(data) => Ok(Entry::new(key, data)),
            Err(keyring::Error::NoEntry) => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(self.error(&format!("failed to read '{}'", key), e)),
        }
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key, &[INDEX_KEY])?;
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // A broken index aborts before anything is written
        let mut keys = self.read_index()?;
        let entry = self.entry(key)?;
        let previous = match entry.get_secret() {
            Ok(old) => Some(old),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => return Err(self.error(&format!("failed to read '{}'", key), e)),
        };

        // The platform replaces a single credential atomically
        entry
            .set_secret(data)
            .map_err(|e| self.error(&format!("failed to write '{}'", key), e))?;

        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            if let Err(e) = self.write_index(&keys) {
                let restored = match &previous {
                    Some(old) => entry.set_secret(old),
                    None => entry.delete_credential(),
                };
                if let Err(undo) = restored {
                    warn!(backend = %self.kind, key, error = %undo, "failed to roll back entry");
                }
                return Err(e);
            }
        }

        debug!(backend = %self.kind, key, "stored entry");
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.read_index()
    }
}

pub(crate) fn encode_index(keys: &[String]) -> Vec<u8> {
    // Serializing a slice of strings cannot fail
    serde_json::to_vec(keys).unwrap_or_else(|_| b"[]".to_vec())
}

pub(crate) fn decode_index(bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("corrupt key index: {}", e))
}
