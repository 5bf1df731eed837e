// SPDX-License-Identifier: Apache-2.0
//! The open administrative database for a single wcroot.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::debug;

use crate::{schema, ReposIdentity, Result};

const ADM_FILE_NAME: &str = ".wc.db";

/// An open connection to one wcroot's administrative database.
///
/// All mutating methods (defined across the `base`, `working`, `global`,
/// `lock`, and `workqueue` modules) run inside a single SQLite transaction
/// and commit or roll back atomically, per the transactional contract in
/// `spec.md` §4.3/§5.
pub struct Store {
    conn: Mutex<Connection>,
    root: PathBuf,
}

impl Store {
    /// Open (creating if necessary) the administrative database under
    /// `wcroot`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbError::Sqlite`] if the database cannot be opened,
    /// or [`crate::DbError::UpgradeRequired`] if its schema is newer than
    /// this build supports.
    pub fn open(wcroot: &Path) -> Result<Self> {
        std::fs::create_dir_all(wcroot)?;
        let path = wcroot.join(ADM_FILE_NAME);
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::open_or_migrate(&conn)?;
        debug!(wcroot = %wcroot.display(), "opened working-copy store");
        Ok(Self {
            conn: Mutex::new(conn),
            root: wcroot.to_path_buf(),
        })
    }

    /// Open an in-memory store, used by tests that do not need a real
    /// wcroot on disk.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbError::Sqlite`] if the in-memory database cannot
    /// be initialized.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::open_or_migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            root: PathBuf::new(),
        })
    }

    /// The wcroot this store was opened against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run `f` inside a single transaction, committing on `Ok` and rolling
    /// back on `Err`.
    pub(crate) fn transact<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

/// Normalize a path relative to `root` into the slash-separated relpath
/// form every `wc-db` table key is stored as.
pub(crate) fn relpath(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let s = rel.to_string_lossy().replace('\\', "/");
    s.trim_matches('/').to_string()
}

pub(crate) fn parent_relpath(relpath: &str) -> Option<String> {
    if relpath.is_empty() {
        return None;
    }
    match relpath.rfind('/') {
        Some(idx) => Some(relpath[..idx].to_string()),
        None => Some(String::new()),
    }
}

/// Insert `repos` if not already known, returning its internal row id
/// either way.
pub(crate) fn upsert_repos(tx: &rusqlite::Transaction<'_>, repos: &ReposIdentity) -> Result<i64> {
    tx.execute(
        "INSERT OR IGNORE INTO repositories (root_url, uuid) VALUES (?1, ?2)",
        rusqlite::params![repos.root_url, repos.uuid],
    )?;
    let id = tx.query_row(
        "SELECT id FROM repositories WHERE root_url = ?1",
        rusqlite::params![repos.root_url],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub(crate) fn load_repos(tx: &rusqlite::Connection, repos_id: i64) -> Result<ReposIdentity> {
    let (root_url, uuid) = tx.query_row(
        "SELECT root_url, uuid FROM repositories WHERE id = ?1",
        rusqlite::params![repos_id],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;
    Ok(ReposIdentity { root_url, uuid })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_adm_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(dir.path().join(ADM_FILE_NAME).exists());
        assert_eq!(store.root(), dir.path());
    }

    #[test]
    fn relpath_strips_root_and_normalizes_separators() {
        let root = Path::new("/wc");
        assert_eq!(relpath(root, Path::new("/wc/a/b.txt")), "a/b.txt");
        assert_eq!(relpath(root, Path::new("/wc")), "");
    }

    #[test]
    fn parent_relpath_of_top_level_is_empty_string() {
        assert_eq!(parent_relpath("a.txt"), Some(String::new()));
        assert_eq!(parent_relpath(""), None);
        assert_eq!(parent_relpath("a/b.txt"), Some("a".to_string()));
    }
}
