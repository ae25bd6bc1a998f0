//! Standard paths used by vetinari

use crate::NAME;
use std::path::PathBuf;

/// Standard vetinari paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Home directory, where `.vetinari.yaml` is looked up
    pub home: PathBuf,
    /// Data directory (~/.local/share/vetinari), home of the encrypted file store
    pub data: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        let data = dirs::data_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join(NAME);

        Self { home, data }
    }

    /// Paths rooted somewhere else (tests, sandboxes)
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let home = root.into();
        let data = home.join(".local/share").join(NAME);
        Self { home, data }
    }

    /// Default config file locations, in lookup order
    pub fn config_candidates(&self) -> Vec<PathBuf> {
        vec![
            self.home.join(format!(".{}.yaml", NAME)),
            self.home.join(format!(".{}.yml", NAME)),
        ]
    }
}
