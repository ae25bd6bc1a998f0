//! Backend identifiers and environment detection

use crate::error::StoreError;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// One concrete storage mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Linux Secret Service over D-Bus
    SecretService,
    /// macOS Keychain
    Keychain,
    /// Windows Credential Manager
    WinCred,
    /// Linux kernel key retention service
    KeyCtl,
    /// age-encrypted file
    File,
    /// Process-local store, never auto-selected
    Memory,
}

/// Backends in order of preference. `Memory` is deliberately absent.
pub const PRIORITY: [BackendKind; 5] = [
    BackendKind::SecretService,
    BackendKind::Keychain,
    BackendKind::WinCred,
    BackendKind::KeyCtl,
    BackendKind::File,
];

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecretService => "secret-service",
            Self::Keychain => "keychain",
            Self::WinCred => "wincred",
            Self::KeyCtl => "keyctl",
            Self::File => "file",
            Self::Memory => "memory",
        }
    }

    pub fn all() -> [BackendKind; 6] {
        [
            Self::SecretService,
            Self::Keychain,
            Self::WinCred,
            Self::KeyCtl,
            Self::File,
            Self::Memory,
        ]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::all().iter().map(|k| k.as_str()).collect();
                StoreError::Config(format!(
                    "unknown backend '{}' (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Snapshot of the host facts that decide which backends can work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Operating system, as in `std::env::consts::OS`
    pub os: String,
    /// A D-Bus session bus is reachable (Secret Service)
    pub dbus_session: bool,
    /// The kernel exposes key retention (`/proc/keys`)
    pub kernel_keys: bool,
}

impl Environment {
    /// Inspect the current host. Reads environment variables and checks for
    /// a few paths; never connects to anything.
    pub fn current() -> Self {
        let dbus_session = env::var_os("DBUS_SESSION_BUS_ADDRESS").is_some()
            || env::var_os("XDG_RUNTIME_DIR")
                .map(|dir| Path::new(&dir).join("bus").exists())
                .unwrap_or(false);

        Self {
            os: env::consts::OS.to_string(),
            dbus_session,
            kernel_keys: Path::new("/proc/keys").exists(),
        }
    }

    pub fn supports(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::SecretService => self.os == "linux" && self.dbus_session,
            BackendKind::Keychain => self.os == "macos",
            BackendKind::WinCred => self.os == "windows",
            BackendKind::KeyCtl => self.os == "linux" && self.kernel_keys,
            BackendKind::File => true,
            BackendKind::Memory => false,
        }
    }
}

/// Backends usable on this host, most preferred first
pub fn available_backends() -> Vec<BackendKind> {
    available_backends_in(&Environment::current())
}

/// Backends usable in `environment`, most preferred first
pub fn available_backends_in(environment: &Environment) -> Vec<BackendKind> {
    PRIORITY
        .into_iter()
        .filter(|kind| environment.supports(*kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux(dbus_session: bool, kernel_keys: bool) -> Environment {
        Environment {
            os: "linux".to_string(),
            dbus_session,
            kernel_keys,
        }
    }

    #[test]
    fn test_linux_desktop_priority() {
        let backends = available_backends_in(&linux(true, true));
        assert_eq!(
            backends,
            vec![
                BackendKind::SecretService,
                BackendKind::KeyCtl,
                BackendKind::File
            ]
        );
    }

    #[test]
    fn test_headless_linux() {
        let backends = available_backends_in(&linux(false, true));
        assert_eq!(backends, vec![BackendKind::KeyCtl, BackendKind::File]);

        let backends = available_backends_in(&linux(false, false));
        assert_eq!(backends, vec![BackendKind::File]);
    }

    #[test]
    fn test_macos_and_windows() {
        let mac = Environment {
            os: "macos".to_string(),
            dbus_session: false,
            kernel_keys: false,
        };
        assert_eq!(
            available_backends_in(&mac),
            vec![BackendKind::Keychain, BackendKind::File]
        );

        let windows = Environment {
            os: "windows".to_string(),
            dbus_session: true,
            kernel_keys: true,
        };
        assert_eq!(
            available_backends_in(&windows),
            vec![BackendKind::WinCred, BackendKind::File]
        );
    }

    #[test]
    fn test_memory_never_listed() {
        for env in [linux(true, true), linux(false, false)] {
            assert!(!available_backends_in(&env).contains(&BackendKind::Memory));
        }
        assert!(!available_backends().contains(&BackendKind::Memory));
    }

    #[test]
    fn test_priority_is_deterministic() {
        assert_eq!(available_backends(), available_backends());
        let env = Environment::current();
        assert_eq!(available_backends_in(&env), available_backends_in(&env));
    }

    #[test]
    fn test_file_always_last() {
        let backends = available_backends();
        assert_eq!(backends.last(), Some(&BackendKind::File));
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("keyctl".parse::<BackendKind>().unwrap(), BackendKind::KeyCtl);
        assert_eq!(
            "Secret-Service".parse::<BackendKind>().unwrap(),
            BackendKind::SecretService
        );
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);

        let err = "pass".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert!(err.to_string().contains("pass"));
    }
}
