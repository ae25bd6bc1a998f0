//! Linux kernel keyring backend
//!
//! Keys are `user` type keys named `<service>:<key>` in the keyring picked
//! by the configured scope. The kernel replaces a key with the same
//! description atomically on `add_key`. Enumeration is shadowed in an
//! index key, like the OS keychain backend.

use crate::backend::BackendKind;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::os_native::{decode_index, encode_index, INDEX_KEY};
use crate::store::{validate_key, Entry, SecretStore};
use linux_keyutils::{KeyError, KeyRing, KeyRingIdentifier};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Prefix byte of every payload; `user` keys cannot hold zero bytes
const PAYLOAD_TAG: u8 = 1;

pub struct KeyCtlStore {
    service: String,
    scope: String,
    ring: KeyRing,
    index_lock: Mutex<()>,
}

impl fmt::Debug for KeyCtlStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCtlStore")
            .field("service", &self.service)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Map a scope name to the kernel's special keyring
pub fn parse_scope(scope: &str) -> Result<KeyRingIdentifier> {
    match scope {
        "thread" => Ok(KeyRingIdentifier::Thread),
        "process" => Ok(KeyRingIdentifier::Process),
        "session" => Ok(KeyRingIdentifier::Session),
        "user" => Ok(KeyRingIdentifier::User),
        "usersession" => Ok(KeyRingIdentifier::UserSession),
        "group" => Ok(KeyRingIdentifier::Group),
        other => Err(StoreError::Config(format!(
            "unknown keyctl scope '{}' \
             (expected session, user, usersession, group, process or thread)",
            other
        ))),
    }
}

impl KeyCtlStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        validate_service(&config.service_name)?;
        let id = parse_scope(&config.keyring_scope)?;
        let ring = KeyRing::from_special_id(id, true).map_err(|e| {
            key_error(
                &format!("failed to open {} keyring", config.keyring_scope),
                e,
            )
        })?;

        let store = Self {
            service: config.service_name.clone(),
            scope: config.keyring_scope.clone(),
            ring,
            index_lock: Mutex::new(()),
        };
        let keys = store.read_index()?;
        debug!(
            scope = %store.scope,
            service = %store.service,
            keys = keys.len(),
            "opened kernel keyring"
        );
        Ok(store)
    }

    fn description(&self, key: &str) -> String {
        format!("{}:{}", self.service, key)
    }

    /// Payload of `key`, or `None` if the kernel has no such key
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let found = match self.ring.search(self.description(key).as_str()) {
            Ok(found) => found,
            Err(KeyError::KeyDoesNotExist | KeyError::KeyExpired | KeyError::KeyRevoked) => {
                return Ok(None)
            }
            Err(e) => return Err(key_error(&format!("failed to look up '{}'", key), e)),
        };
        let payload = found
            .read_to_vec()
            .map_err(|e| key_error(&format!("failed to read '{}'", key), e))?;
        decode_payload(&payload).map(Some)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.ring
            .add_key(self.description(key).as_str(), encode_payload(data).as_slice())
            .map(|_| ())
            .map_err(|e| key_error(&format!("failed to write '{}'", key), e))
    }

    /// Drop `key` from the keyring; a missing key is already removed
    fn remove(&self, key: &str) -> Result<()> {
        match self.ring.search(self.description(key).as_str()) {
            Ok(found) => found
                .invalidate()
                .map_err(|e| key_error(&format!("failed to remove '{}'", key), e)),
            Err(KeyError::KeyDoesNotExist | KeyError::KeyExpired | KeyError::KeyRevoked) => Ok(()),
            Err(e) => Err(key_error(&format!("failed to look up '{}'", key), e)),
        }
    }

    fn read_index(&self) -> Result<Vec<String>> {
        match self.read(INDEX_KEY)? {
            Some(bytes) => {
                decode_index(&bytes).map_err(|e| StoreError::backend(BackendKind::KeyCtl, e))
            }
            None => Ok(vec![]),
        }
    }
}

impl SecretStore for KeyCtlStore {
    fn backend(&self) -> BackendKind {
        BackendKind::KeyCtl
    }

    fn get(&self, key: &str) -> Result<Entry> {
        validate_key(key, &[INDEX_KEY])?;
        self.read(key)?
            .map(|data| Entry::new(key, data))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key, &[INDEX_KEY])?;
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // A broken index aborts before anything is written
        let mut keys = self.read_index()?;
        let previous = self.read(key)?;

        self.write(key, data)?;

        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            if let Err(e) = self.write(INDEX_KEY, &encode_index(&keys)) {
                let restored = match &previous {
                    Some(old) => self.write(key, old),
                    None => self.remove(key),
                };
                if let Err(undo) = restored {
                    warn!(scope = %self.scope, key, error = %undo, "failed to roll back key");
                }
                return Err(e);
            }
        }

        debug!(scope = %self.scope, key, "stored entry");
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.read_index()
    }
}

/// Descriptions are `<service>:<key>`, so the first `:` must end the service
fn validate_service(service: &str) -> Result<()> {
    if service.is_empty() || service.contains(':') {
        return Err(StoreError::Config(format!(
            "service name '{}' cannot be empty or contain ':' with keyctl",
            service
        )));
    }
    Ok(())
}

fn encode_payload(data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(data.len() + 1);
    payload.push(PAYLOAD_TAG);
    payload.extend_from_slice(data);
    payload
}

fn decode_payload(payload: &[u8]) -> Result<Vec<u8>> {
    match payload.split_first() {
        Some((&PAYLOAD_TAG, data)) => Ok(data.to_vec()),
        _ => Err(StoreError::backend(
            BackendKind::KeyCtl,
            "key payload was not written by this tool",
        )),
    }
}

fn key_error(context: &str, e: KeyError) -> StoreError {
    StoreError::backend(BackendKind::KeyCtl, format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        assert!(matches!(parse_scope("user"), Ok(KeyRingIdentifier::User)));
        assert!(matches!(parse_scope("session"), Ok(KeyRingIdentifier::Session)));
        assert!(matches!(parse_scope("thread"), Ok(KeyRingIdentifier::Thread)));
        assert!(matches!(parse_scope("global"), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_payload_allows_empty_secret() {
        assert_eq!(encode_payload(b""), vec![PAYLOAD_TAG]);
        assert_eq!(decode_payload(&[PAYLOAD_TAG]).unwrap(), Vec::<u8>::new());
        assert_eq!(
            decode_payload(&encode_payload(&[0xff, 0x00])).unwrap(),
            vec![0xff, 0x00]
        );
    }

    #[test]
    fn test_foreign_payload_rejected() {
        assert!(decode_payload(b"").is_err());
        assert!(decode_payload(b"plain").is_err());
    }

    #[test]
    fn test_open_rejects_unknown_scope() {
        let mut config = StoreConfig::default();
        config.keyring_scope = "galaxy".to_string();
        assert!(matches!(KeyCtlStore::open(&config), Err(StoreError::Config(_))));
    }

    /// Store in the process keyring under a name no other test uses, or
    /// `None` when the kernel keyring cannot be reached here
    fn scratch_store(name: &str) -> Option<KeyCtlStore> {
        let mut config = StoreConfig::new(format!("vetinari-test-{}-{}", std::process::id(), name));
        config.keyring_scope = "process".to_string();
        match KeyCtlStore::open(&config) {
            Ok(store) => Some(store),
            Err(StoreError::Config(msg)) => panic!("unexpected config error: {}", msg),
            Err(e) => {
                eprintln!("skipping, kernel keyring unavailable: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_open_rejects_colon_in_service() {
        let mut config = StoreConfig::new("a:b");
        config.keyring_scope = "process".to_string();
        assert!(matches!(KeyCtlStore::open(&config), Err(StoreError::Config(_))));
        assert!(matches!(
            KeyCtlStore::open(&StoreConfig::new("")),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        let Some(store) = scratch_store("round-trip") else { return };
        store.set("token", &[0x00, 0xff, 0x10]).unwrap();
        assert_eq!(store.get("token").unwrap().data, vec![0x00, 0xff, 0x10]);
    }

    #[test]
    fn test_empty_secret() {
        let Some(store) = scratch_store("empty") else { return };
        store.set("blank", b"").unwrap();
        assert_eq!(store.get("blank").unwrap().data, Vec::<u8>::new());
    }

    #[test]
    fn test_overwrite_listed_once() {
        let Some(store) = scratch_store("overwrite") else { return };
        store.set("k", b"one").unwrap();
        store.set("k", b"two").unwrap();
        store.set("other", b"x").unwrap();

        assert_eq!(store.get("k").unwrap().data, b"two".to_vec());
        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["k".to_string(), "other".to_string()]);
    }

    #[test]
    fn test_missing_key_not_found() {
        let Some(store) = scratch_store("missing") else { return };
        assert!(store.get("nope").unwrap_err().is_not_found());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_index_blocks_set() {
        let Some(store) = scratch_store("corrupt-index") else { return };
        store.write(INDEX_KEY, b"not json").unwrap();

        assert!(matches!(store.set("k", b"v"), Err(StoreError::Backend { .. })));
        assert!(store.get("k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let Some(store) = scratch_store("remove") else { return };
        store.remove("absent").unwrap();
        store.write("present", b"v").unwrap();
        store.remove("present").unwrap();
        assert!(store.read("present").unwrap().is_none());
    }
}
