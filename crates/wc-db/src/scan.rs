// SPDX-License-Identifier: Apache-2.0
//! Upward scans across the BASE/WORKING layers: repository-identity
//! inheritance, addition roots, and deletion roots.

use std::path::Path;

use rusqlite::{params, OptionalExtension};

use crate::store::{self, Store};
use crate::{AdditionScan, BaseRepos, DbError, DeletionScan, NodeStatus, Origin, Result, Schedule};

pub(crate) struct WorkingRow {
    pub(crate) schedule: Schedule,
    pub(crate) moved_here: bool,
    pub(crate) copied: bool,
    pub(crate) origin: Option<Origin>,
    pub(crate) moved_to_relpath: Option<String>,
}

impl Store {
    /// Walk upward from `path` to the nearest ancestor (or `path` itself)
    /// whose BASE row records a repository identity directly, returning
    /// that identity plus `path`'s repository-relative path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no ancestor up to and including the
    /// wcroot records a repository identity.
    pub fn scan_base_repos(&self, path: &Path) -> Result<BaseRepos> {
        let relpath = store::relpath(self.root(), path);
        let mut cur = relpath.clone();
        loop {
            let row: Option<(Option<i64>, Option<String>)> = self
                .conn()
                .query_row(
                    "SELECT repos_id, repos_relpath FROM base_nodes WHERE local_relpath = ?1",
                    params![cur],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            if let Some((Some(repos_id), Some(base_repos_relpath))) = row {
                let suffix = relpath[cur.len()..].trim_start_matches('/');
                let repos_relpath = if suffix.is_empty() {
                    base_repos_relpath
                } else {
                    format!("{base_repos_relpath}/{suffix}")
                };
                let repos = store::load_repos(&self.conn(), repos_id)?;
                return Ok(BaseRepos { repos, repos_relpath });
            }

            match store::parent_relpath(&cur) {
                Some(parent) => cur = parent,
                None => return Err(DbError::NotFound(relpath)),
            }
        }
    }

    pub(crate) fn read_working_row(&self, relpath: &str) -> Result<Option<WorkingRow>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT schedule, moved_here, copied, origin_repos_id, origin_repos_relpath,
                        origin_revision, moved_to_relpath
                 FROM working_nodes WHERE local_relpath = ?1",
                params![relpath],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((schedule, moved_here, copied, origin_repos_id, origin_repos_relpath, origin_revision, moved_to_relpath)) = row
        else {
            return Ok(None);
        };

        let origin = match (origin_repos_id, origin_repos_relpath, origin_revision) {
            (Some(repos_id), Some(repos_relpath), Some(revision)) => {
                let repos = store::load_repos(&conn, repos_id)?;
                Some(Origin {
                    repos_root_url: repos.root_url,
                    repos_uuid: repos.uuid,
                    repos_relpath,
                    revision,
                })
            }
            _ => None,
        };

        Ok(Some(WorkingRow {
            schedule: Schedule::from_str(&schedule),
            moved_here: moved_here != 0,
            copied: copied != 0,
            origin,
            moved_to_relpath,
        }))
    }

    /// Find the root of the contiguous chain of WORKING additions that
    /// covers `path`, and the copy/move origin recorded there, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if `path` has no pending WORKING add.
    pub fn scan_addition(&self, path: &Path) -> Result<AdditionScan> {
        let relpath = store::relpath(self.root(), path);
        let Some(row) = self.read_working_row(&relpath)? else {
            return Err(DbError::NotFound(relpath));
        };
        if row.schedule != Schedule::Added && row.schedule != Schedule::Replaced {
            return Err(DbError::NotFound(relpath));
        }

        let mut op_root = relpath;
        let mut op_row = row;
        while let Some(parent) = store::parent_relpath(&op_root) {
            let Some(parent_row) = self.read_working_row(&parent)? else {
                break;
            };
            if parent_row.schedule != Schedule::Added && parent_row.schedule != Schedule::Replaced {
                break;
            }
            op_root = parent;
            op_row = parent_row;
        }

        let status = if op_row.moved_here {
            NodeStatus::MovedHere
        } else if op_row.copied {
            NodeStatus::Copied
        } else {
            NodeStatus::Added
        };

        Ok(AdditionScan {
            status,
            op_root_relpath: op_root,
            origin: op_row.origin,
        })
    }

    /// Find the nearest WORKING deletion root covering `path`, the
    /// outermost BASE row it shadows, and any recorded move destination.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn scan_deletion(&self, path: &Path) -> Result<DeletionScan> {
        let mut cur = store::relpath(self.root(), path);
        let mut scan = DeletionScan::default();
        let mut working_root: Option<(String, WorkingRow)> = None;
        loop {
            match self.read_working_row(&cur)? {
                Some(row) if matches!(row.schedule, Schedule::Deleted | Schedule::Replaced) => {
                    working_root = Some((cur.clone(), row));
                }
                _ => break,
            }
            match store::parent_relpath(&cur) {
                Some(parent) => cur = parent,
                None => break,
            }
        }

        let Some((root_relpath, root_row)) = working_root else {
            return Ok(scan);
        };

        scan.working_del_relpath = Some(root_relpath.clone());
        scan.moved_to_relpath = root_row.moved_to_relpath;
        scan.base_replaced = root_row.schedule == Schedule::Replaced;

        if self.base_get_info(Path::new(&root_relpath)).is_ok() {
            scan.base_del_relpath = Some(root_relpath);
        }

        Ok(scan)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::props::Props;
    use crate::{BaseNodeSpec, ChangeInfo, Depth, ReposIdentity};

    fn spec() -> BaseNodeSpec {
        BaseNodeSpec {
            revision: 9,
            repos: ReposIdentity {
                root_url: "https://example.invalid/repo".to_string(),
                uuid: "11111111-1111-1111-1111-111111111111".to_string(),
            },
            repos_relpath: "trunk".to_string(),
            changed: ChangeInfo {
                rev: 9,
                date: 1_700_000_000_000,
                author: Some("alice".to_string()),
            },
        }
    }

    #[test]
    fn scan_base_repos_inherits_from_ancestor() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_directory(Path::new(""), spec(), Depth::Infinity, &Props::new(), &[]).unwrap();

        let scan = store.scan_base_repos(Path::new("dir/a.txt")).unwrap();
        assert_eq!(scan.repos.root_url, "https://example.invalid/repo");
        assert_eq!(scan.repos_relpath, "trunk/dir/a.txt");
    }

    #[test]
    fn scan_base_repos_without_any_base_row_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.scan_base_repos(Path::new("a.txt")).is_err());
    }

    #[test]
    fn scan_addition_finds_contiguous_root_and_origin() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("src.txt"), spec(), "hash", None, &Props::new(), &[]).unwrap();
        store.op_copy(Path::new("src.txt"), Path::new("dir/dst.txt")).unwrap();

        let scan = store.scan_addition(Path::new("dir/dst.txt")).unwrap();
        assert_eq!(scan.status, NodeStatus::Copied);
        assert_eq!(scan.op_root_relpath, "dir/dst.txt");
        assert!(scan.origin.is_some());
    }

    #[test]
    fn scan_addition_without_pending_add_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(), "hash", None, &Props::new(), &[]).unwrap();
        assert!(store.scan_addition(Path::new("a.txt")).is_err());
    }

    #[test]
    fn scan_deletion_reports_base_and_move_destination() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(), "hash", None, &Props::new(), &[]).unwrap();
        store.op_move(Path::new("a.txt"), Path::new("b.txt")).unwrap();

        let scan = store.scan_deletion(Path::new("a.txt")).unwrap();
        assert_eq!(scan.working_del_relpath.as_deref(), Some("a.txt"));
        assert_eq!(scan.base_del_relpath.as_deref(), Some("a.txt"));
        assert_eq!(scan.moved_to_relpath.as_deref(), Some("b.txt"));
        assert!(!scan.base_replaced);
    }

    #[test]
    fn scan_deletion_of_untouched_node_is_empty() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(), "hash", None, &Props::new(), &[]).unwrap();
        let scan = store.scan_deletion(Path::new("a.txt")).unwrap();
        assert_eq!(scan, DeletionScan::default());
    }

    #[test]
    fn scan_deletion_distinguishes_replace_from_plain_delete() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(), "hash", None, &Props::new(), &[]).unwrap();
        store.op_delete(Path::new("a.txt")).unwrap();
        store.op_add_file(Path::new("a.txt"), "new-hash", &Props::new()).unwrap();

        let scan = store.scan_deletion(Path::new("a.txt")).unwrap();
        assert!(scan.base_replaced);
    }
}
