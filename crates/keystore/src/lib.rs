//! keystore - Secret storage over OS-native credential stores
//!
//! One trait, several backends:
//! - `secret-service`: Linux Secret Service (GNOME Keyring, KWallet)
//! - `keychain`: macOS Keychain
//! - `wincred`: Windows Credential Manager
//! - `keyctl`: Linux kernel key retention service
//! - `file`: age-encrypted file, usable on any host
//! - `memory`: process-local store for tests
//!
//! [`open`] picks the most preferred backend that initializes on the
//! current host, unless the configuration forces one.

pub mod backend;
pub mod config;
pub mod error;
pub mod file;
pub mod memory;
pub mod store;

#[cfg(target_os = "linux")]
pub mod keyctl;
#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
pub mod os_native;

pub use backend::{available_backends, available_backends_in, BackendKind, Environment};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::{open, Entry, SecretStore};
