//! Store configuration

use crate::backend::BackendKind;
use std::fmt;
use std::path::PathBuf;

/// Name used for every default when nothing else is configured
pub const DEFAULT_NAME: &str = "vetinari";

/// Everything needed to open a store
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Namespace separating this tool's secrets inside a shared store
    pub service_name: String,
    /// Kernel keyring scope (`session`, `user`, `process`, `thread`, ...)
    pub keyring_scope: String,
    /// Keychain / collection name for backends that present a prompt
    pub keychain_name: String,
    /// Force a backend instead of picking one automatically
    pub backend: Option<BackendKind>,
    /// Directory holding the encrypted-file backend's files
    pub file_dir: PathBuf,
    /// Passphrase for the file backend; prompted for when `None`
    pub file_passphrase: Option<String>,
}

impl StoreConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_dir = dir.into();
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.file_passphrase = Some(passphrase.into());
        self
    }

    /// Path of the encrypted file for this service
    pub fn file_path(&self) -> PathBuf {
        self.file_dir.join(format!("{}.age", self.service_name))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_NAME.to_string(),
            keyring_scope: "user".to_string(),
            keychain_name: DEFAULT_NAME.to_string(),
            backend: None,
            file_dir: PathBuf::from("."),
            file_passphrase: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("service_name", &self.service_name)
            .field("keyring_scope", &self.keyring_scope)
            .field("keychain_name", &self.keychain_name)
            .field("backend", &self.backend)
            .field("file_dir", &self.file_dir)
            .field(
                "file_passphrase",
                &self.file_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.service_name, "vetinari");
        assert_eq!(config.keyring_scope, "user");
        assert_eq!(config.keychain_name, "vetinari");
        assert!(config.backend.is_none());
    }

    #[test]
    fn test_file_path_uses_service() {
        let config = StoreConfig::new("example").with_file_dir("/tmp/store");
        assert_eq!(config.file_path(), PathBuf::from("/tmp/store/example.age"));
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let config = StoreConfig::default().with_passphrase("hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
