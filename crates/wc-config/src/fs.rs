// SPDX-License-Identifier: Apache-2.0
//! Filesystem-backed [`ConfigStore`] storing one JSON blob per key under the
//! platform configuration directory.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::config::{ConfigError, ConfigStore};

/// Stores config blobs as `<key>.json` files under a base directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Root the store at the platform's per-user config directory (e.g.
    /// `~/.config/wc-engine` on Linux).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Other`] if the platform config directory
    /// can't be resolved, or [`ConfigError::Io`] if it can't be created.
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "wc-engine")
            .ok_or_else(|| ConfigError::Other("could not resolve platform config directory".to_string()))?;
        Self::at(proj.config_dir())
    }

    /// Root the store at an explicit directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the directory can't be created.
    pub fn at(base: &Path) -> Result<Self, ConfigError> {
        fs::create_dir_all(base)?;
        Ok(Self { base: base.to_path_buf() })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_blob_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path()).unwrap();
        store.save_raw("settings", b"{\"a\":1}").unwrap();
        assert_eq!(store.load_raw("settings").unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn missing_key_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path()).unwrap();
        assert!(matches!(store.load_raw("absent"), Err(ConfigError::NotFound)));
    }
}
