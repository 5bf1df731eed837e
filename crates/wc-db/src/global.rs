// SPDX-License-Identifier: Apache-2.0
//! Whole-repository-identity and post-commit bookkeeping operations that
//! span the BASE/WORKING boundary.

use std::path::Path;

use rusqlite::{params, OptionalExtension};

use crate::props::Props;
use crate::store::{self, Store};
use crate::{BaseNodeSpec, ChangeInfo, DbError, Depth, Kind, Result, Schedule};

impl Store {
    /// Fold a successful commit's result into the metadata store: the
    /// WORKING row at `path` (if any) becomes the new BASE row at
    /// `new_revision`, and any ACTUAL modification flags are cleared.
    ///
    /// A pending delete removes the BASE row outright instead.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbError::Sqlite`] on any underlying database
    /// failure.
    pub fn global_commit(&self, path: &Path, new_revision: i64, changed: ChangeInfo) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let Some(working) = self.read_working_row(&relpath)? else {
            return Ok(());
        };

        match working.schedule {
            Schedule::Deleted => {
                self.base_remove(path)?;
                self.transact(|tx| {
                    tx.execute("DELETE FROM working_nodes WHERE local_relpath = ?1", params![relpath])?;
                    Ok(())
                })?;
            }
            Schedule::Added | Schedule::Replaced => {
                let (kind, checksum, target, depth) = self.read_working_shape(&relpath)?;
                let props = self.read_working_props(&relpath)?;
                let (repos, repos_relpath) = if let Ok(scan) = self.scan_base_repos(path) {
                    (scan.repos, scan.repos_relpath)
                } else {
                    let origin = working
                        .origin
                        .ok_or_else(|| DbError::NotFound(relpath.clone()))?;
                    (
                        crate::ReposIdentity {
                            root_url: origin.repos_root_url,
                            uuid: origin.repos_uuid,
                        },
                        origin.repos_relpath,
                    )
                };
                let spec = BaseNodeSpec {
                    revision: new_revision,
                    repos,
                    repos_relpath,
                    changed,
                };
                match kind {
                    Kind::Dir => self.base_add_directory(path, spec, depth, &props, &[])?,
                    Kind::File => self.base_add_file(path, spec, checksum.as_deref().unwrap_or(""), None, &props, &[])?,
                    Kind::Symlink => self.base_add_symlink(path, spec, target.as_deref().unwrap_or(""), &props, &[])?,
                    Kind::Unknown => {}
                }
                self.transact(|tx| {
                    tx.execute("DELETE FROM working_nodes WHERE local_relpath = ?1", params![relpath])?;
                    Ok(())
                })?;
            }
            Schedule::Normal => {}
        }

        self.transact(|tx| {
            tx.execute(
                "UPDATE actual_nodes SET text_mod = 0, props_mod = 0 WHERE local_relpath = ?1",
                params![relpath],
            )?;
            Ok(())
        })
    }

    /// Bring `path`'s BASE row to a new repository state as delivered by an
    /// update/switch, overwriting whatever was recorded before.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbError::Sqlite`] on any underlying database
    /// failure.
    #[allow(clippy::too_many_arguments)]
    pub fn global_update(
        &self,
        path: &Path,
        spec: BaseNodeSpec,
        kind: Kind,
        depth: Depth,
        checksum: Option<&str>,
        target: Option<&str>,
        props: &Props,
    ) -> Result<()> {
        match kind {
            Kind::Dir => self.base_add_directory(path, spec, depth, props, &[]),
            Kind::File => self.base_add_file(path, spec, checksum.unwrap_or(""), None, props, &[]),
            Kind::Symlink => self.base_add_symlink(path, spec, target.unwrap_or(""), props, &[]),
            Kind::Unknown => Ok(()),
        }
    }

    /// Rewrite every row's repository root URL from `old_root_url` to
    /// `new_root_url`, leaving the UUID (and hence repository identity)
    /// unchanged. Used when a repository is relocated to a new address.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbError::Sqlite`] on any underlying database
    /// failure.
    pub fn global_relocate(&self, old_root_url: &str, new_root_url: &str) -> Result<()> {
        self.transact(|tx| {
            tx.execute(
                "UPDATE repositories SET root_url = ?2 WHERE root_url = ?1",
                params![old_root_url, new_root_url],
            )?;
            Ok(())
        })
    }

    fn read_working_props(&self, relpath: &str) -> Result<Props> {
        let text: Option<String> = self
            .conn()
            .query_row("SELECT properties FROM working_nodes WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()
            .map_err(crate::DbError::from)?
            .flatten();
        match text {
            Some(text) if !text.is_empty() => crate::props::decode(&text),
            _ => Ok(Props::new()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{NodeStatus, ReposIdentity};

    fn repos() -> ReposIdentity {
        ReposIdentity {
            root_url: "https://example.invalid/repo".to_string(),
            uuid: "11111111-1111-1111-1111-111111111111".to_string(),
        }
    }

    fn spec(revision: i64) -> BaseNodeSpec {
        BaseNodeSpec {
            revision,
            repos: repos(),
            repos_relpath: "trunk".to_string(),
            changed: ChangeInfo {
                rev: revision,
                date: 1_700_000_000_000,
                author: Some("alice".to_string()),
            },
        }
    }

    #[test]
    fn global_commit_promotes_pure_add_to_base() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_directory(Path::new(""), spec(1), Depth::Infinity, &Props::new(), &[]).unwrap();
        store.op_add_file(Path::new("new.txt"), "hash", &Props::new()).unwrap();

        store
            .global_commit(
                Path::new("new.txt"),
                2,
                ChangeInfo {
                    rev: 2,
                    date: 1_700_000_001_000,
                    author: Some("bob".to_string()),
                },
            )
            .unwrap();

        let info = store.base_get_info(Path::new("new.txt")).unwrap();
        assert_eq!(info.revision, 2);
        assert_eq!(info.checksum.as_deref(), Some("hash"));
        assert!(store.read_info(Path::new("new.txt")).unwrap().origin.is_none());
        assert_eq!(store.read_info(Path::new("new.txt")).unwrap().status, NodeStatus::Normal);
    }

    #[test]
    fn global_commit_of_pending_delete_removes_base_row() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(1), "hash", None, &Props::new(), &[]).unwrap();
        store.op_delete(Path::new("a.txt")).unwrap();

        store
            .global_commit(
                Path::new("a.txt"),
                2,
                ChangeInfo {
                    rev: 2,
                    date: 1_700_000_001_000,
                    author: Some("bob".to_string()),
                },
            )
            .unwrap();

        assert!(store.base_get_info(Path::new("a.txt")).is_err());
        assert!(store.read_info(Path::new("a.txt")).is_err());
    }

    #[test]
    fn global_relocate_rewrites_root_url_only() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(1), "hash", None, &Props::new(), &[]).unwrap();

        store.global_relocate("https://example.invalid/repo", "https://relocated.invalid/repo").unwrap();

        let info = store.base_get_info(Path::new("a.txt")).unwrap();
        assert_eq!(info.repos.unwrap().root_url, "https://relocated.invalid/repo");
    }
}
