// SPDX-License-Identifier: Apache-2.0
//! RA-level repository locks (recorded on BASE rows) and the administrative
//! wc-lock used to serialize structural changes to a subtree.

use std::path::Path;

use rusqlite::{params, OptionalExtension};

use crate::store::{self, Store};
use crate::{DbError, LockInfo, Result};

impl Store {
    /// Record a repository-issued lock on `path`'s BASE row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if `path` has no BASE row.
    pub fn lock_add(&self, path: &Path, lock: &LockInfo) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let changed = self.conn().execute(
            "UPDATE base_nodes SET lock_token = ?2, lock_owner = ?3, lock_comment = ?4, lock_date = ?5
             WHERE local_relpath = ?1",
            params![relpath, lock.token, lock.owner, lock.comment, lock.date],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(relpath));
        }
        Ok(())
    }

    /// Clear any repository-issued lock recorded on `path`'s BASE row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn lock_remove(&self, path: &Path) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        self.conn().execute(
            "UPDATE base_nodes SET lock_token = NULL, lock_owner = NULL, lock_comment = NULL, lock_date = NULL
             WHERE local_relpath = ?1",
            params![relpath],
        )?;
        Ok(())
    }

    /// Take the administrative write lock on `path` for `owner_token`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if `path` is already locked by a
    /// different owner (a `UNIQUE`/primary-key violation) or any other
    /// underlying database failure.
    pub fn wclock_set(&self, path: &Path, owner_token: &str) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        self.conn()
            .execute("INSERT INTO wc_lock (local_relpath, owner_token) VALUES (?1, ?2)", params![relpath, owner_token])?;
        Ok(())
    }

    /// Whether `path` itself (not an ancestor) currently holds the
    /// administrative write lock.
    pub fn wclocked(&self, path: &Path) -> Result<bool> {
        let relpath = store::relpath(self.root(), path);
        let token: Option<String> = self
            .conn()
            .query_row("SELECT owner_token FROM wc_lock WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()?;
        Ok(token.is_some())
    }

    /// Whether `owner_token` is the current holder of `path`'s
    /// administrative write lock.
    pub fn temp_own_lock(&self, path: &Path, owner_token: &str) -> Result<bool> {
        let relpath = store::relpath(self.root(), path);
        let token: Option<String> = self
            .conn()
            .query_row("SELECT owner_token FROM wc_lock WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()?;
        Ok(token.as_deref() == Some(owner_token))
    }

    /// Release the administrative write lock on `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn wclock_remove(&self, path: &Path) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        self.conn().execute("DELETE FROM wc_lock WHERE local_relpath = ?1", params![relpath])?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::props::Props;
    use crate::{BaseNodeSpec, ChangeInfo, ReposIdentity};

    fn spec() -> BaseNodeSpec {
        BaseNodeSpec {
            revision: 2,
            repos: ReposIdentity {
                root_url: "https://example.invalid/repo".to_string(),
                uuid: "11111111-1111-1111-1111-111111111111".to_string(),
            },
            repos_relpath: "trunk/a.txt".to_string(),
            changed: ChangeInfo {
                rev: 2,
                date: 1_700_000_000_000,
                author: Some("alice".to_string()),
            },
        }
    }

    #[test]
    fn lock_add_then_remove_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(), "hash", None, &Props::new(), &[]).unwrap();

        let lock = LockInfo {
            token: "opaquelocktoken:abc".to_string(),
            owner: Some("alice".to_string()),
            comment: None,
            date: 1_700_000_000_000,
        };
        store.lock_add(Path::new("a.txt"), &lock).unwrap();
        let info = store.base_get_info(Path::new("a.txt")).unwrap();
        assert_eq!(info.lock, Some(lock));

        store.lock_remove(Path::new("a.txt")).unwrap();
        let info = store.base_get_info(Path::new("a.txt")).unwrap();
        assert!(info.lock.is_none());
    }

    #[test]
    fn lock_add_on_missing_base_row_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let lock = LockInfo {
            token: "t".to_string(),
            owner: None,
            comment: None,
            date: 0,
        };
        assert!(store.lock_add(Path::new("missing.txt"), &lock).is_err());
    }

    #[test]
    fn wclock_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.wclocked(Path::new("dir")).unwrap());

        store.wclock_set(Path::new("dir"), "token-1").unwrap();
        assert!(store.wclocked(Path::new("dir")).unwrap());
        assert!(store.temp_own_lock(Path::new("dir"), "token-1").unwrap());
        assert!(!store.temp_own_lock(Path::new("dir"), "token-2").unwrap());

        store.wclock_remove(Path::new("dir")).unwrap();
        assert!(!store.wclocked(Path::new("dir")).unwrap());
    }

    #[test]
    fn wclock_set_rejects_second_owner() {
        let store = Store::open_in_memory().unwrap();
        store.wclock_set(Path::new("dir"), "token-1").unwrap();
        assert!(store.wclock_set(Path::new("dir"), "token-2").is_err());
    }
}
