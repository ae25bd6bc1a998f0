//! vetinari core - configuration plumbing shared by the vetinari CLI
//!
//! Settings are resolved once at startup from, lowest to highest
//! precedence: built-in defaults, `~/.vetinari.yaml`, `VETINARI_*`
//! environment variables, command-line flags.

pub mod config;
pub mod paths;

pub use config::{Settings, SettingsLayer};
pub use paths::Paths;

/// Tool name, used as the default service and keychain name
pub const NAME: &str = "vetinari";
