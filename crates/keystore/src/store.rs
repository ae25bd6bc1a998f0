//! The SecretStore trait and backend selection

use crate::backend::{available_backends, BackendKind};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::file::FileStore;
use crate::memory::MemoryStore;
use std::fmt;
use tracing::{debug, info, warn};

/// A stored secret
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

/// Lowest common denominator over every backend.
///
/// Calls block until the backend answers, which may include an OS
/// consent prompt. Nothing is retried. Dropping the store releases
/// whatever the backend acquired at open.
pub trait SecretStore: Send + Sync {
    /// Backend serving this handle
    fn backend(&self) -> BackendKind;

    /// Fetch an entry, `NotFound` if the key was never set
    fn get(&self, key: &str) -> Result<Entry>;

    /// Create or overwrite an entry. Either the new value is stored or the
    /// previous state is left untouched.
    fn set(&self, key: &str, data: &[u8]) -> Result<()>;

    /// All keys under the configured service. Order is backend-defined.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Open the best backend for this host, or the one forced by `config`
pub fn open(config: &StoreConfig) -> Result<Box<dyn SecretStore>> {
    if let Some(kind) = config.backend {
        let store = open_backend(kind, config).map_err(|e| match e {
            StoreError::Backend { .. } => {
                StoreError::BackendUnavailable(format!("{}: {}", kind, e))
            }
            other => other,
        })?;
        info!(backend = %kind, service = %config.service_name, "opened configured backend");
        return Ok(store);
    }

    let candidates = available_backends();
    debug!(?candidates, "trying backends");
    open_first(&candidates, config)
}

/// Open the first of `candidates` that initializes. A configuration
/// error stops the search instead of falling through to a weaker backend.
fn open_first(candidates: &[BackendKind], config: &StoreConfig) -> Result<Box<dyn SecretStore>> {
    let mut failures = vec![];
    for &kind in candidates {
        match open_backend(kind, config) {
            Ok(store) => {
                info!(backend = %kind, service = %config.service_name, "opened backend");
                return Ok(store);
            }
            Err(e @ StoreError::Config(_)) => return Err(e),
            Err(e) => {
                warn!(backend = %kind, error = %e, "backend failed to open");
                failures.push(format!("{}: {}", kind, e));
            }
        }
    }

    if failures.is_empty() {
        return Err(StoreError::BackendUnavailable(
            "no backends detected on this host".to_string(),
        ));
    }
    Err(StoreError::BackendUnavailable(failures.join("; ")))
}

fn open_backend(kind: BackendKind, config: &StoreConfig) -> Result<Box<dyn SecretStore>> {
    match kind {
        BackendKind::Memory => Ok(Box::new(MemoryStore::new())),
        BackendKind::File => Ok(Box::new(FileStore::open(config)?)),
        #[cfg(target_os = "linux")]
        BackendKind::SecretService => Ok(Box::new(crate::os_native::OsNativeStore::open(
            kind, config,
        )?)),
        #[cfg(target_os = "macos")]
        BackendKind::Keychain => Ok(Box::new(crate::os_native::OsNativeStore::open(
            kind, config,
        )?)),
        #[cfg(target_os = "windows")]
        BackendKind::WinCred => Ok(Box::new(crate::os_native::OsNativeStore::open(
            kind, config,
        )?)),
        #[cfg(target_os = "linux")]
        BackendKind::KeyCtl => Ok(Box::new(crate::keyctl::KeyCtlStore::open(config)?)),
        other => Err(StoreError::BackendUnavailable(format!(
            "{} is not supported on {}",
            other,
            std::env::consts::OS
        ))),
    }
}

/// Reject keys no backend can hold
pub(crate) fn validate_key(key: &str, reserved: &[&str]) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::Config("key cannot be empty".to_string()));
    }
    if reserved.contains(&key) {
        return Err(StoreError::Config(format!("key '{}' is reserved", key)));
    }
    Ok(())
}
