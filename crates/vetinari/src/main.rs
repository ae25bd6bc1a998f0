//! vetinari - interact with various keyrings to securely manage secrets
//!
//! Commands:
//! - get <KEY>: Print a value to stdout
//! - set <KEY> <VALUE>: Store a value
//! - list: List keys (and values with --unsafe)
//! - backends: List available backends in priority order

use clap::Parser;
use std::io;
use std::process::ExitCode;
use vetinari::{exit_code_for, log_filter, run, Cli};
use vetinari_core::Settings;

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries secret values
    let directives = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = exit_code_for(e.kind());
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let result = Settings::load(cli.global.settings_layer(), cli.global.config_file.clone())
        .and_then(|settings| run(cli.command, &settings, &mut io::stdout().lock()));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
