//! Encrypted-file backend
//!
//! All entries of a service live in one age file (`<dir>/<service>.age`),
//! encrypted with a passphrase (scrypt + ChaCha20-Poly1305). The file is
//! decrypted in full at open and rewritten in full on every set.
//!
//! Writes go to a temporary file in the same directory which is then
//! renamed over the target, so readers see either the old or the new
//! file. Within a process a mutex serializes set. Across processes there
//! is no locking: two concurrent writers can lose an update.

use crate::backend::BackendKind;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{validate_key, Entry, SecretStore};
use age::secrecy::{ExposeSecret, Secret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[cfg(unix)]
use std::fs::Permissions;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const FORMAT_VERSION: u32 = 1;

/// Plaintext layout inside the age envelope
#[derive(Debug, Default, Deserialize)]
struct Document {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, Vec<u8>>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, Vec<u8>>,
}

/// Passphrase-encrypted single-file store
pub struct FileStore {
    path: PathBuf,
    passphrase: SecretString,
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

impl FileStore {
    /// Open the file for `config.service_name`, prompting for the
    /// passphrase unless the config carries one
    pub fn open(config: &StoreConfig) -> Result<Self> {
        validate_service(&config.service_name)?;
        let path = config.file_path();

        let passphrase = match &config.file_passphrase {
            Some(passphrase) => passphrase.clone(),
            None => rpassword::prompt_password(format!("Passphrase for {}: ", path.display()))
                .map_err(|e| io_error("failed to read passphrase", e))?,
        };

        Self::open_with_passphrase(path, passphrase)
    }

    /// Open (or start) the store at `path`
    pub fn open_with_passphrase(path: impl Into<PathBuf>, passphrase: String) -> Result<Self> {
        let path = path.into();
        if passphrase.is_empty() {
            return Err(StoreError::Config(
                "file backend passphrase cannot be empty".to_string(),
            ));
        }
        let passphrase = Secret::new(passphrase);

        let entries = if path.exists() {
            let encrypted = fs::read(&path)
                .map_err(|e| io_error(&format!("failed to read {}", path.display()), e))?;
            let document = decrypt(&encrypted, &passphrase)?;
            if document.version != FORMAT_VERSION {
                return Err(backend_error(format!(
                    "unsupported file format version {} in {}",
                    document.version,
                    path.display()
                )));
            }
            document.entries
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "opened file store");

        Ok(Self {
            path,
            passphrase,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt `entries` and atomically replace the file
    fn persist(&self, entries: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        let plaintext = serde_json::to_vec(&DocumentRef {
            version: FORMAT_VERSION,
            entries,
        })
        .map_err(|e| backend_error(format!("failed to serialize entries: {}", e)))?;

        let encrypted = encrypt(&plaintext, &self.passphrase)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| io_error(&format!("failed to create {}", dir.display()), e))?;
            #[cfg(unix)]
            fs::set_permissions(&dir, Permissions::from_mode(0o700))
                .map_err(|e| io_error("failed to restrict directory permissions", e))?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| io_error(&format!("failed to create temp file in {}", dir.display()), e))?;
        tmp.write_all(&encrypted)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| io_error("failed to write temp file", e))?;

        #[cfg(unix)]
        fs::set_permissions(tmp.path(), Permissions::from_mode(0o600))
            .map_err(|e| io_error("failed to restrict file permissions", e))?;

        tmp.persist(&self.path)
            .map_err(|e| io_error(&format!("failed to replace {}", self.path.display()), e.error))?;

        Ok(())
    }
}

impl SecretStore for FileStore {
    fn backend(&self) -> BackendKind {
        BackendKind::File
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

        // Held across the whole read-modify-write cycle
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.insert(key.to_string(), data.to_vec());

        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }

        debug!(key, path = %self.path.display(), "stored entry");
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}

fn encrypt(plaintext: &[u8], passphrase: &SecretString) -> Result<Vec<u8>> {
    let encryptor =
        age::Encryptor::with_user_passphrase(Secret::new(passphrase.expose_secret().clone()));

    let mut encrypted = vec![];
    let mut writer = encryptor
        .wrap_output(&mut encrypted)
        .map_err(|e| backend_error(format!("encryption error: {}", e)))?;
    writer
        .write_all(plaintext)
        .map_err(|e| backend_error(format!("encryption error: {}", e)))?;
    writer
        .finish()
        .map_err(|e| backend_error(format!("encryption error: {}", e)))?;

    Ok(encrypted)
}

fn decrypt(encrypted: &[u8], passphrase: &SecretString) -> Result<Document> {
    let decryptor = match age::Decryptor::new(encrypted)
        .map_err(|e| backend_error(format!("decryption error: {}", e)))?
    {
        age::Decryptor::Passphrase(d) => d,
        _ => {
            return Err(backend_error(
                "decryption error: file is not passphrase-encrypted",
            ))
        }
    };

    let mut plaintext = vec![];
    let mut reader = decryptor
        .decrypt(passphrase, None)
        .map_err(|e| backend_error(format!("decryption error: {}", e)))?;
    reader
        .read_to_end(&mut plaintext)
        .map_err(|e| backend_error(format!("decryption error: {}", e)))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| backend_error(format!("corrupt store contents: {}", e)))
}

fn validate_service(service: &str) -> Result<()> {
    if service.is_empty()
        || service == "."
        || service == ".."
        || service.contains(['/', '\\'])
    {
        return Err(StoreError::Config(format!(
            "service name '{}' cannot be used as a file name",
            service
        )));
    }
    Ok(())
}

fn backend_error(message: impl Into<String>) -> StoreError {
    StoreError::backend(BackendKind::File, message)
}

fn io_error(context: &str, e: io::Error) -> StoreError {
    backend_error(format!("{}: {}", context, e))
}
