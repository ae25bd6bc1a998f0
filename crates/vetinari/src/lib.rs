//! vetinari - manipulate values in the system's keyring
//!
//! Thin CLI over the `keystore` crate: parse flags, resolve settings,
//! open a store, format output.

pub mod cli;
pub mod commands;
pub mod logging;

pub use cli::{exit_code_for, Cli, Commands, GlobalArgs};
pub use commands::{run, store_config};
pub use logging::log_filter;
