// SPDX-License-Identifier: Apache-2.0
//! BASE-layer APIs: the last known server state for a node.

use std::path::Path;

use rusqlite::{params, OptionalExtension};

use crate::props::Props;
use crate::store::{self, Store};
use crate::workqueue;
use crate::{
    BaseInfo, BaseNodeSpec, ChangeInfo, Depth, DbError, Kind, LockInfo, Presence, Result, Skel, INVALID_REVISION,
};

impl Store {
    /// Create or replace a BASE directory row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn base_add_directory(
        &self,
        path: &Path,
        spec: BaseNodeSpec,
        depth: Depth,
        props: &Props,
        work_items: &[Skel],
    ) -> Result<()> {
        self.base_add(path, spec, Kind::Dir, Presence::Normal, Some(depth), None, None, None, props, work_items)
    }

    /// Create or replace a BASE file row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn base_add_file(
        &self,
        path: &Path,
        spec: BaseNodeSpec,
        checksum: &str,
        translated_size: Option<i64>,
        props: &Props,
        work_items: &[Skel],
    ) -> Result<()> {
        self.base_add(
            path,
            spec,
            Kind::File,
            Presence::Normal,
            None,
            Some(checksum),
            translated_size,
            None,
            props,
            work_items,
        )
    }

    /// Create or replace a BASE symlink row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn base_add_symlink(
        &self,
        path: &Path,
        spec: BaseNodeSpec,
        target: &str,
        props: &Props,
        work_items: &[Skel],
    ) -> Result<()> {
        self.base_add(path, spec, Kind::Symlink, Presence::Normal, None, None, None, Some(target), props, work_items)
    }

    /// Record a BASE row for a node the server withheld, marked absent, or
    /// knows is not present at this revision (`presence` must be one of
    /// those three; `Normal`/`Incomplete` are rejected by convention of the
    /// `base_add_*` family above).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn base_add_absent_node(&self, path: &Path, spec: BaseNodeSpec, kind: Kind, presence: Presence) -> Result<()> {
        self.base_add(path, spec, kind, presence, None, None, None, None, &Props::new(), &[])
    }

    #[allow(clippy::too_many_arguments)]
    fn base_add(
        &self,
        path: &Path,
        spec: BaseNodeSpec,
        kind: Kind,
        presence: Presence,
        depth: Option<Depth>,
        checksum: Option<&str>,
        translated_size: Option<i64>,
        target: Option<&str>,
        props: &Props,
        work_items: &[Skel],
    ) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        self.transact(|tx| {
            let repos_id = store::upsert_repos(tx, &spec.repos)?;
            tx.execute(
                "INSERT INTO base_nodes (
                    local_relpath, parent_relpath, repos_id, repos_relpath, presence, kind,
                    revision, changed_rev, changed_date, changed_author, depth, checksum,
                    translated_size, target, properties, incomplete
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,0)
                ON CONFLICT(local_relpath) DO UPDATE SET
                    parent_relpath=excluded.parent_relpath, repos_id=excluded.repos_id,
                    repos_relpath=excluded.repos_relpath, presence=excluded.presence,
                    kind=excluded.kind, revision=excluded.revision, changed_rev=excluded.changed_rev,
                    changed_date=excluded.changed_date, changed_author=excluded.changed_author,
                    depth=excluded.depth, checksum=excluded.checksum,
                    translated_size=excluded.translated_size, target=excluded.target,
                    properties=excluded.properties, incomplete=0",
                params![
                    relpath,
                    parent,
                    repos_id,
                    spec.repos_relpath,
                    presence.as_str(),
                    kind.as_str(),
                    spec.revision,
                    spec.changed.rev,
                    spec.changed.date,
                    spec.changed.author,
                    depth.map(Depth::as_str),
                    checksum,
                    translated_size,
                    target,
                    crate::props::encode(props),
                ],
            )?;
            for item in work_items {
                workqueue::wq_add_tx(tx, item)?;
            }
            Ok(())
        })
    }

    /// Recursively remove a BASE subtree rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn base_remove(&self, path: &Path) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let prefix = format!("{relpath}/%");
        self.transact(|tx| {
            tx.execute("DELETE FROM base_nodes WHERE local_relpath = ?1", params![relpath])?;
            tx.execute("DELETE FROM base_nodes WHERE local_relpath LIKE ?1 ESCAPE '\\'", params![prefix])?;
            Ok(())
        })
    }

    /// Read every recorded BASE attribute for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no BASE row exists at `path`.
    /// Returns [`DbError::Sqlite`] on any other database failure.
    pub fn base_get_info(&self, path: &Path) -> Result<BaseInfo> {
        let relpath = store::relpath(self.root(), path);
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT presence, kind, revision, repos_id, repos_relpath, changed_rev, changed_date,
                        changed_author, depth, checksum, translated_size, target,
                        lock_token, lock_owner, lock_comment, lock_date, incomplete
                 FROM base_nodes WHERE local_relpath = ?1",
                params![relpath],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, Option<i64>>(10)?,
                        row.get::<_, Option<String>>(11)?,
                        row.get::<_, Option<String>>(12)?,
                        row.get::<_, Option<String>>(13)?,
                        row.get::<_, Option<String>>(14)?,
                        row.get::<_, Option<i64>>(15)?,
                        row.get::<_, i64>(16)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(relpath.clone()))?;

        let (
            presence,
            kind,
            revision,
            repos_id,
            repos_relpath,
            changed_rev,
            changed_date,
            changed_author,
            depth,
            checksum,
            translated_size,
            target,
            lock_token,
            lock_owner,
            lock_comment,
            lock_date,
            incomplete,
        ) = row;

        let repos = match repos_id {
            Some(id) => Some(store::load_repos(&conn, id)?),
            None => None,
        };
        let lock = lock_token.map(|token| LockInfo {
            token,
            owner: lock_owner,
            comment: lock_comment,
            date: lock_date.unwrap_or(0),
        });

        Ok(BaseInfo {
            presence: Presence::from_str(&presence),
            kind: Kind::from_str(&kind),
            revision,
            repos,
            repos_relpath,
            changed: ChangeInfo {
                rev: changed_rev.unwrap_or(INVALID_REVISION),
                date: changed_date.unwrap_or(0),
                author: changed_author,
            },
            depth: depth.as_deref().map_or(Depth::Unknown, Depth::from_str),
            checksum,
            translated_size,
            target,
            lock,
            incomplete: incomplete != 0,
        })
    }

    /// Read one BASE property value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no BASE row exists at `path`.
    pub fn base_get_prop(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.base_get_props(path)?.get(name).cloned())
    }

    /// Read the full BASE property map.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no BASE row exists at `path`.
    pub fn base_get_props(&self, path: &Path) -> Result<Props> {
        let relpath = store::relpath(self.root(), path);
        let conn = self.conn();
        let text: String = conn
            .query_row("SELECT properties FROM base_nodes WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()?
            .ok_or_else(|| DbError::NotFound(relpath.clone()))?;
        crate::props::decode(&text)
    }

    /// Persist an opaque DAV cache blob for the RA layer, verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no BASE row exists at `path`.
    pub fn base_set_dav_cache(&self, path: &Path, blob: &[u8]) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        self.transact(|tx| {
            let changed = tx.execute(
                "UPDATE base_nodes SET dav_cache = ?2 WHERE local_relpath = ?1",
                params![relpath, blob],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound(relpath.clone()));
            }
            Ok(())
        })
    }

    /// Read the DAV cache blob recorded by [`Store::base_set_dav_cache`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no BASE row exists at `path`.
    pub fn base_get_dav_cache(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let relpath = store::relpath(self.root(), path);
        self.conn()
            .query_row("SELECT dav_cache FROM base_nodes WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::NotFound(relpath.clone()))
    }

    /// List the basenames of `path`'s immediate BASE children.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn base_get_children(&self, path: &Path) -> Result<Vec<String>> {
        let relpath = store::relpath(self.root(), path);
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT local_relpath FROM base_nodes WHERE parent_relpath = ?1 ORDER BY local_relpath")?;
        let rows = stmt.query_map(params![relpath], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let child_relpath = row?;
            if let Some(name) = child_relpath.rsplit('/').next() {
                out.push(name.to_string());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ReposIdentity;

    fn spec() -> BaseNodeSpec {
        BaseNodeSpec {
            revision: 5,
            repos: ReposIdentity {
                root_url: "https://example.invalid/repo".to_string(),
                uuid: "11111111-1111-1111-1111-111111111111".to_string(),
            },
            repos_relpath: "trunk/a.txt".to_string(),
            changed: ChangeInfo {
                rev: 5,
                date: 1_700_000_000_000,
                author: Some("alice".to_string()),
            },
        }
    }

    #[test]
    fn add_then_get_file_round_trips_attributes() {
        let store = Store::open_in_memory().unwrap();
        let mut props = Props::new();
        props.insert("svn:mime-type".to_string(), b"text/plain".to_vec());
        store
            .base_add_file(Path::new("a.txt"), spec(), "deadbeef", Some(42), &props, &[])
            .unwrap();

        let info = store.base_get_info(Path::new("a.txt")).unwrap();
        assert_eq!(info.presence, Presence::Normal);
        assert_eq!(info.kind, Kind::File);
        assert_eq!(info.revision, 5);
        assert_eq!(info.checksum.as_deref(), Some("deadbeef"));
        assert_eq!(info.translated_size, Some(42));
        assert_eq!(info.repos.unwrap().root_url, "https://example.invalid/repo");
        assert_eq!(store.base_get_props(Path::new("a.txt")).unwrap(), props);
    }

    #[test]
    fn add_directory_then_list_children() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_directory(Path::new(""), spec(), Depth::Infinity, &Props::new(), &[]).unwrap();
        store.base_add_file(Path::new("a.txt"), spec(), "hash-a", None, &Props::new(), &[]).unwrap();
        store.base_add_file(Path::new("b.txt"), spec(), "hash-b", None, &Props::new(), &[]).unwrap();

        let children = store.base_get_children(Path::new("")).unwrap();
        assert_eq!(children, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn get_info_on_missing_path_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.base_get_info(Path::new("missing.txt")).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn base_remove_deletes_subtree() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_directory(Path::new("dir"), spec(), Depth::Infinity, &Props::new(), &[]).unwrap();
        store.base_add_file(Path::new("dir/a.txt"), spec(), "hash-a", None, &Props::new(), &[]).unwrap();

        store.base_remove(Path::new("dir")).unwrap();
        assert!(store.base_get_info(Path::new("dir")).is_err());
        assert!(store.base_get_info(Path::new("dir/a.txt")).is_err());
    }

    #[test]
    fn dav_cache_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_file(Path::new("a.txt"), spec(), "hash-a", None, &Props::new(), &[]).unwrap();
        store.base_set_dav_cache(Path::new("a.txt"), b"opaque-dav-blob").unwrap();
        assert_eq!(store.base_get_dav_cache(Path::new("a.txt")).unwrap(), Some(b"opaque-dav-blob".to_vec()));
    }

    #[test]
    fn add_absent_node_records_sentinel_attributes() {
        let store = Store::open_in_memory().unwrap();
        store.base_add_absent_node(Path::new("gone.txt"), spec(), Kind::File, Presence::NotPresent).unwrap();
        let info = store.base_get_info(Path::new("gone.txt")).unwrap();
        assert_eq!(info.presence, Presence::NotPresent);
        assert!(info.checksum.is_none());
    }
}
