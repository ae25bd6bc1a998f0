//! Layered settings
//!
//! Configuration sources:
//! - `~/.vetinari.yaml` (or a file given with `--config-file`)
//! - `VETINARI_*` environment variables
//! - command-line flags

use crate::paths::Paths;
use crate::NAME;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_SERVICE_NAME: &str = "VETINARI_SERVICE_NAME";
pub const ENV_KEYCTL_SCOPE: &str = "VETINARI_KEYCTL_SCOPE";
pub const ENV_KEYCHAIN_NAME: &str = "VETINARI_KEYCHAIN_NAME";
pub const ENV_UNSAFE: &str = "VETINARI_UNSAFE";
pub const ENV_BACKEND: &str = "VETINARI_BACKEND";
pub const ENV_FILE_DIR: &str = "VETINARI_FILE_DIR";
pub const ENV_FILE_PASSPHRASE: &str = "VETINARI_FILE_PASSPHRASE";
pub const ENV_CONFIG_FILE: &str = "VETINARI_CONFIG_FILE";

/// One source of settings; unset fields fall through to the next layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SettingsLayer {
    pub service_name: Option<String>,
    pub keyctl_scope: Option<String>,
    pub keychain_name: Option<String>,
    #[serde(rename = "unsafe")]
    pub unsafe_mode: Option<bool>,
    pub backend: Option<String>,
    pub file_dir: Option<PathBuf>,
}

impl SettingsLayer {
    /// Fill unset fields of `self` from `lower`
    pub fn or(self, lower: SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            service_name: self.service_name.or(lower.service_name),
            keyctl_scope: self.keyctl_scope.or(lower.keyctl_scope),
            keychain_name: self.keychain_name.or(lower.keychain_name),
            unsafe_mode: self.unsafe_mode.or(lower.unsafe_mode),
            backend: self.backend.or(lower.backend),
            file_dir: self.file_dir.or(lower.file_dir),
        }
    }

    /// Read a YAML layer. An empty file is an empty layer.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Read the `VETINARI_*` variables through `lookup`
    pub fn from_env(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let unsafe_mode = match lookup(ENV_UNSAFE) {
            Some(value) => Some(
                parse_bool(&value).with_context(|| format!("Invalid value for {}", ENV_UNSAFE))?,
            ),
            None => None,
        };

        Ok(Self {
            service_name: lookup(ENV_SERVICE_NAME),
            keyctl_scope: lookup(ENV_KEYCTL_SCOPE),
            keychain_name: lookup(ENV_KEYCHAIN_NAME),
            unsafe_mode,
            backend: lookup(ENV_BACKEND),
            file_dir: lookup(ENV_FILE_DIR).map(PathBuf::from),
        })
    }
}

/// Fully resolved settings
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub service_name: String,
    pub keyctl_scope: String,
    pub keychain_name: String,
    /// Print secret values in commands other than `get`
    pub unsafe_mode: bool,
    /// Backend name to force, validated when the store is opened
    pub backend: Option<String>,
    pub file_dir: PathBuf,
    /// Only ever taken from the environment
    pub file_passphrase: Option<String>,
    /// Config file that contributed, if any
    pub config_file: Option<PathBuf>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("service_name", &self.service_name)
            .field("keyctl_scope", &self.keyctl_scope)
            .field("keychain_name", &self.keychain_name)
            .field("unsafe_mode", &self.unsafe_mode)
            .field("backend", &self.backend)
            .field("file_dir", &self.file_dir)
            .field("file_passphrase", &self.file_passphrase.as_ref().map(|_| "<redacted>"))
            .field("config_file", &self.config_file)
            .finish()
    }
}

impl Settings {
    /// Resolve settings against the real environment and home directory
    pub fn load(flags: SettingsLayer, config_file: Option<PathBuf>) -> Result<Self> {
        let lookup = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self::resolve(flags, config_file, &lookup, &Paths::new())
    }

    /// Resolve settings: flags > environment > config file > defaults.
    ///
    /// An explicitly named config file must exist; the default one is
    /// optional.
    pub fn resolve(
        flags: SettingsLayer,
        config_file: Option<PathBuf>,
        lookup: &dyn Fn(&str) -> Option<String>,
        paths: &Paths,
    ) -> Result<Self> {
        let explicit = config_file.or_else(|| lookup(ENV_CONFIG_FILE).map(PathBuf::from));

        let config_file = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                Some(path)
            }
            None => paths.config_candidates().into_iter().find(|p| p.exists()),
        };

        let file_layer = match &config_file {
            Some(path) => {
                info!(path = %path.display(), "using config file");
                SettingsLayer::from_file(path)?
            }
            None => {
                debug!("no config file found");
                SettingsLayer::default()
            }
        };

        let env_layer = SettingsLayer::from_env(lookup)?;
        let merged = flags.or(env_layer).or(file_layer);

        Ok(Self {
            service_name: merged.service_name.unwrap_or_else(|| NAME.to_string()),
            keyctl_scope: merged.keyctl_scope.unwrap_or_else(|| "user".to_string()),
            keychain_name: merged.keychain_name.unwrap_or_else(|| NAME.to_string()),
            unsafe_mode: merged.unsafe_mode.unwrap_or(false),
            backend: merged.backend,
            file_dir: merged.file_dir.unwrap_or_else(|| paths.data.clone()),
            file_passphrase: lookup(ENV_FILE_PASSPHRASE),
            config_file,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let home = tempdir().unwrap();
        let paths = Paths::rooted(home.path());
        let settings =
            Settings::resolve(SettingsLayer::default(), None, &env(&[]), &paths).unwrap();

        assert_eq!(settings.service_name, "vetinari");
        assert_eq!(settings.keyctl_scope, "user");
        assert_eq!(settings.keychain_name, "vetinari");
        assert!(!settings.unsafe_mode);
        assert!(settings.backend.is_none());
        assert_eq!(settings.file_dir, paths.data);
        assert!(settings.config_file.is_none());
    }

    #[test]
    fn test_precedence() {
        let home = tempdir().unwrap();
        let paths = Paths::rooted(home.path());
        fs::write(
            home.path().join(".vetinari.yaml"),
            "service-name: from-file\nkeyctl-scope: session\nkeychain-name: file-chain\nunsafe: true\n",
        )
        .unwrap();

        let lookup = env(&[
            ("VETINARI_KEYCTL_SCOPE", "process"),
            ("VETINARI_KEYCHAIN_NAME", "env-chain"),
        ]);
        let flags = SettingsLayer {
            keychain_name: Some("flag-chain".to_string()),
            ..Default::default()
        };

        let settings = Settings::resolve(flags, None, &lookup, &paths).unwrap();
        assert_eq!(settings.service_name, "from-file");
        assert_eq!(settings.keyctl_scope, "process");
        assert_eq!(settings.keychain_name, "flag-chain");
        assert!(settings.unsafe_mode);
        assert_eq!(
            settings.config_file,
            Some(home.path().join(".vetinari.yaml"))
        );
    }

    #[test]
    fn test_explicit_config_file() {
        let home = tempdir().unwrap();
        let paths = Paths::rooted(home.path());
        let custom = home.path().join("custom.yaml");
        fs::write(&custom, "backend: file\nfile-dir: /srv/secrets\n").unwrap();

        let settings =
            Settings::resolve(SettingsLayer::default(), Some(custom.clone()), &env(&[]), &paths)
                .unwrap();
        assert_eq!(settings.backend.as_deref(), Some("file"));
        assert_eq!(settings.file_dir, PathBuf::from("/srv/secrets"));

        let missing = home.path().join("missing.yaml");
        let resolved = Settings::resolve(SettingsLayer::default(), Some(missing), &env(&[]), &paths);
        assert!(resolved.is_err());
    }

    #[test]
    fn test_config_file_from_env() {
        let home = tempdir().unwrap();
        let paths = Paths::rooted(home.path());
        let custom = home.path().join("env.yaml");
        fs::write(&custom, "service-name: env-config\n").unwrap();

        let lookup = env(&[("VETINARI_CONFIG_FILE", custom.to_str().unwrap())]);
        let settings = Settings::resolve(SettingsLayer::default(), None, &lookup, &paths).unwrap();
        assert_eq!(settings.service_name, "env-config");
    }

    #[test]
    fn test_malformed_config() {
        let home = tempdir().unwrap();
        let paths = Paths::rooted(home.path());
        fs::write(home.path().join(".vetinari.yaml"), "service-name: [unclosed\n").unwrap();
        assert!(Settings::resolve(SettingsLayer::default(), None, &env(&[]), &paths).is_err());

        fs::write(home.path().join(".vetinari.yaml"), "colour: blue\n").unwrap();
        assert!(Settings::resolve(SettingsLayer::default(), None, &env(&[]), &paths).is_err());
    }

    #[test]
    fn test_empty_config_file() {
        let home = tempdir().unwrap();
        let paths = Paths::rooted(home.path());
        fs::write(home.path().join(".vetinari.yaml"), "\n").unwrap();
        let settings =
            Settings::resolve(SettingsLayer::default(), None, &env(&[]), &paths).unwrap();
        assert_eq!(settings.service_name, "vetinari");
    }

    #[test]
    fn test_env_bool_and_passphrase() {
        let home = tempdir().unwrap();
        let paths = Paths::rooted(home.path());

        let lookup = env(&[("VETINARI_UNSAFE", "yes"), ("VETINARI_FILE_PASSPHRASE", "pw")]);
        let settings = Settings::resolve(SettingsLayer::default(), None, &lookup, &paths).unwrap();
        assert!(settings.unsafe_mode);
        assert_eq!(settings.file_passphrase.as_deref(), Some("pw"));
        assert!(!format!("{:?}", settings).contains("\"pw\""));

        let lookup = env(&[("VETINARI_UNSAFE", "maybe")]);
        assert!(Settings::resolve(SettingsLayer::default(), None, &lookup, &paths).is_err());
    }
}
