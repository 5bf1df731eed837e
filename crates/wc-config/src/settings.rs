// SPDX-License-Identifier: Apache-2.0
//! The four working-copy settings the core consults, stored as a single
//! JSON blob via [`crate::ConfigService`].

use serde::{Deserialize, Serialize};

/// Working-copy settings read by the core during install, commit, and
/// conflict handling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WcSettings {
    /// When installing a file, set its mtime to the last-change date
    /// instead of the time of installation.
    pub use_commit_times: bool,
    /// External three-way merge command invoked by collaborators; the core
    /// itself never runs it.
    pub diff3_cmd: Option<String>,
    /// File extensions preserved verbatim when renaming conflict siblings
    /// (e.g. `.txt`, so `file.txt` stays `file.txt.mine` not
    /// `file.mine.txt`).
    pub preserved_conflict_file_exts: Vec<String>,
    /// On commit of a locked path, skip the automatic unlock.
    pub no_unlock: bool,
}

/// The logical config-store key [`WcSettings`] is saved/loaded under.
pub const SETTINGS_KEY: &str = "wc_settings";

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ConfigService, FsConfigStore};

    #[test]
    fn default_settings_are_conservative() {
        let settings = WcSettings::default();
        assert!(!settings.use_commit_times);
        assert!(!settings.no_unlock);
        assert!(settings.diff3_cmd.is_none());
        assert!(settings.preserved_conflict_file_exts.is_empty());
    }

    #[test]
    fn round_trips_through_a_config_service() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(FsConfigStore::at(dir.path()).unwrap());

        let settings = WcSettings {
            use_commit_times: true,
            diff3_cmd: Some("diff3".to_string()),
            preserved_conflict_file_exts: vec!["txt".to_string()],
            ..WcSettings::default()
        };
        service.save(SETTINGS_KEY, &settings).unwrap();

        let loaded: WcSettings = service.load(SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_settings_blob_loads_as_none_letting_caller_default() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(FsConfigStore::at(dir.path()).unwrap());
        let loaded: Option<WcSettings> = service.load(SETTINGS_KEY).unwrap();
        assert!(loaded.is_none());
    }
}
