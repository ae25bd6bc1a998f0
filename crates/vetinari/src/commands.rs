//! Command handlers
//!
//! Handlers write to the given writer and return errors; only `main`
//! turns an error into an exit status.

use crate::cli::Commands;
use anyhow::{Context, Result};
use keystore::{BackendKind, SecretStore, StoreConfig};
use std::io::Write;
use tracing::debug;
use vetinari_core::Settings;

/// Placeholder printed for values outside unsafe mode
pub const MASK: &str = "****";

/// Build the store configuration from resolved settings
pub fn store_config(settings: &Settings) -> Result<StoreConfig> {
    let backend = settings
        .backend
        .as_deref()
        .map(str::parse::<BackendKind>)
        .transpose()?;

    Ok(StoreConfig {
        service_name: settings.service_name.clone(),
        keyring_scope: settings.keyctl_scope.clone(),
        keychain_name: settings.keychain_name.clone(),
        backend,
        file_dir: settings.file_dir.clone(),
        file_passphrase: settings.file_passphrase.clone(),
    })
}

/// Execute one command
pub fn run(command: Commands, settings: &Settings, out: &mut dyn Write) -> Result<()> {
    debug!(?settings, "running command");

    match command {
        Commands::Backends => cmd_backends(&keystore::available_backends(), out),
        Commands::Get { key } => cmd_get(open_store(settings)?.as_ref(), &key, out),
        Commands::Set { key, value } => cmd_set(open_store(settings)?.as_ref(), &key, &value),
        Commands::List => cmd_list(open_store(settings)?.as_ref(), settings.unsafe_mode, out),
    }
}

fn open_store(settings: &Settings) -> Result<Box<dyn SecretStore>> {
    let config = store_config(settings)?;
    keystore::open(&config).context("could not open keyring")
}

/// Print the raw value, byte for byte, with no trailing newline
pub fn cmd_get(store: &dyn SecretStore, key: &str, out: &mut dyn Write) -> Result<()> {
    let entry = store
        .get(key)
        .with_context(|| format!("could not get value for key '{}'", key))?;
    out.write_all(&entry.data)?;
    out.flush()?;
    Ok(())
}

pub fn cmd_set(store: &dyn SecretStore, key: &str, value: &str) -> Result<()> {
    store
        .set(key, value.as_bytes())
        .with_context(|| format!("could not set key '{}'", key))
}

/// Print `key: ****` per entry, or `key: value` in unsafe mode
pub fn cmd_list(store: &dyn SecretStore, unsafe_mode: bool, out: &mut dyn Write) -> Result<()> {
    let keys = store
        .keys()
        .context("could not retrieve keys from keyring")?;

    for key in keys {
        if unsafe_mode {
            let entry = store
                .get(&key)
                .with_context(|| format!("could not retrieve key '{}' from keyring", key))?;
            // Values are written as stored, like `get`
            out.write_all(key.as_bytes())?;
            out.write_all(b": ")?;
            out.write_all(&entry.data)?;
            out.write_all(b"\n")?;
        } else {
            writeln!(out, "{}: {}", key, MASK)?;
        }
    }

    Ok(())
}

/// One backend identifier per line, most preferred first
pub fn cmd_backends(backends: &[BackendKind], out: &mut dyn Write) -> Result<()> {
    for backend in backends {
        writeln!(out, "{}", backend)?;
    }
    Ok(())
}
