//! Command-line interface

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vetinari_core::SettingsLayer;

#[derive(Parser, Debug)]
#[command(name = "vetinari")]
#[command(version)]
#[command(about = "Application for manipulating values in the system's keyring")]
#[command(after_help = r#"CONFIGURATION:
    Settings are read from ~/.vetinari.yaml, then VETINARI_* environment
    variables, then flags (later wins). Keys in the YAML file match the
    flag names: service-name, keyctl-scope, keychain-name, unsafe,
    backend, file-dir.

    The file backend reads its passphrase from VETINARI_FILE_PASSPHRASE
    or prompts for it.

SECURITY:
    'set' takes the value as an argument, so it is visible in process
    listings and shell history."#)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Print secrets during commands that aren't 'get'
    #[arg(long = "unsafe", alias = "print-secrets", global = true)]
    pub unsafe_mode: bool,

    /// Service name for keyring backends that support it
    #[arg(long, global = true)]
    pub service_name: Option<String>,

    /// Scope for keyctl: session, user, usersession, group, process or thread
    #[arg(long, global = true)]
    pub keyctl_scope: Option<String>,

    /// Name of the keychain (collection on Secret Service)
    #[arg(long, global = true)]
    pub keychain_name: Option<String>,

    /// Force a backend instead of picking the best available one
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Directory for the encrypted file backend
    #[arg(long, global = true)]
    pub file_dir: Option<PathBuf>,

    /// Config file to use instead of ~/.vetinari.yaml
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,
}

impl GlobalArgs {
    /// The flag layer of the settings. An absent `--unsafe` leaves the
    /// decision to lower layers.
    pub fn settings_layer(&self) -> SettingsLayer {
        SettingsLayer {
            service_name: self.service_name.clone(),
            keyctl_scope: self.keyctl_scope.clone(),
            keychain_name: self.keychain_name.clone(),
            unsafe_mode: self.unsafe_mode.then_some(true),
            backend: self.backend.clone(),
            file_dir: self.file_dir.clone(),
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Retrieve a value from the keyring and print it to stdout (handle with care)
    Get {
        /// Key to retrieve
        key: String,
    },

    /// Set a value in the keyring
    Set {
        /// Key to set
        key: String,
        /// Value to store
        value: String,
    },

    /// List all keys in the keyring; values too with --unsafe
    List,

    /// List available keyring backends in usage priority order
    Backends,
}

/// Exit status for a clap error: help and version are successes,
/// every other parse failure (including a missing subcommand) is 1
pub fn exit_code_for(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}
