// SPDX-License-Identifier: Apache-2.0
//! WORKING/ACTUAL-layer APIs: pending structural changes and local
//! overrides (properties, conflicts, changelist membership).

use std::path::Path;

use rusqlite::{params, OptionalExtension};

use crate::props::Props;
use crate::store::{self, Store};
use crate::{DbError, Depth, Kind, Origin, Result, Schedule, Skel};

impl Store {
    /// Record a pure local add of a directory (no BASE counterpart yet).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_add_directory(&self, path: &Path, depth: Depth, props: &Props) -> Result<()> {
        self.working_upsert(path, Schedule::Added, Kind::Dir, Some(depth), None, None, props)
    }

    /// Record a pure local add of a file.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_add_file(&self, path: &Path, checksum: &str, props: &Props) -> Result<()> {
        self.working_upsert(path, Schedule::Added, Kind::File, None, Some(checksum), None, props)
    }

    /// Record a pure local add of a symlink.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_add_symlink(&self, path: &Path, target: &str, props: &Props) -> Result<()> {
        self.working_upsert(path, Schedule::Added, Kind::Symlink, None, None, Some(target), props)
    }

    /// Record a copied directory with the given origin.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_copy_dir(&self, dst: &Path, origin: Origin, depth: Depth, props: &Props) -> Result<()> {
        self.op_copy_with_origin(dst, origin, Kind::Dir, Some(depth), None, None, props, false)
    }

    /// Record a copied file with the given origin.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_copy_file(&self, dst: &Path, origin: Origin, checksum: &str, props: &Props) -> Result<()> {
        self.op_copy_with_origin(dst, origin, Kind::File, None, Some(checksum), None, props, false)
    }

    /// Record a copied symlink with the given origin.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_copy_symlink(&self, dst: &Path, origin: Origin, target: &str, props: &Props) -> Result<()> {
        self.op_copy_with_origin(dst, origin, Kind::Symlink, None, None, Some(target), props, false)
    }

    /// Copy `src` (which must have a readable BASE row) to `dst`, inferring
    /// kind, checksum/target, and origin from `src`'s BASE attributes.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if `src` has no BASE row.
    pub fn op_copy(&self, src: &Path, dst: &Path) -> Result<()> {
        let info = self.base_get_info(src)?;
        let repos = info
            .repos
            .or_else(|| self.scan_base_repos(src).ok().map(|scan| scan.repos))
            .ok_or_else(|| DbError::NotFound(store::relpath(self.root(), src)))?;
        let repos_relpath = info
            .repos_relpath
            .unwrap_or_else(|| store::relpath(self.root(), src));
        let origin = Origin {
            repos_root_url: repos.root_url,
            repos_uuid: repos.uuid,
            repos_relpath,
            revision: info.revision,
        };
        let props = self.base_get_props(src)?;
        match info.kind {
            Kind::Dir => self.op_copy_dir(dst, origin, info.depth, &props),
            Kind::File => self.op_copy_file(dst, origin, info.checksum.as_deref().unwrap_or(""), &props),
            Kind::Symlink => self.op_copy_symlink(dst, origin, info.target.as_deref().unwrap_or(""), &props),
            Kind::Unknown => Err(DbError::NotFound(store::relpath(self.root(), src))),
        }
    }

    /// Record that `src` was moved to `dst`: equivalent to a copy of `src`
    /// to `dst` plus a delete of `src` that remembers its destination.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if `src` has no BASE row.
    pub fn op_move(&self, src: &Path, dst: &Path) -> Result<()> {
        self.op_copy(src, dst)?;
        self.working_mark_moved(dst)?;
        let src_relpath = store::relpath(self.root(), src);
        let dst_relpath = store::relpath(self.root(), dst);
        self.op_delete(src)?;
        self.transact(|tx| {
            tx.execute(
                "UPDATE working_nodes SET moved_to_relpath = ?2 WHERE local_relpath = ?1",
                params![src_relpath, dst_relpath],
            )?;
            Ok(())
        })
    }

    fn working_mark_moved(&self, dst: &Path) -> Result<()> {
        let relpath = store::relpath(self.root(), dst);
        self.transact(|tx| {
            tx.execute("UPDATE working_nodes SET moved_here = 1 WHERE local_relpath = ?1", params![relpath])?;
            Ok(())
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn op_copy_with_origin(
        &self,
        dst: &Path,
        origin: Origin,
        kind: Kind,
        depth: Option<Depth>,
        checksum: Option<&str>,
        target: Option<&str>,
        props: &Props,
        moved_here: bool,
    ) -> Result<()> {
        let relpath = store::relpath(self.root(), dst);
        let parent = store::parent_relpath(&relpath);
        self.transact(|tx| {
            let origin_repos_id = store::upsert_repos(
                tx,
                &crate::ReposIdentity {
                    root_url: origin.repos_root_url.clone(),
                    uuid: origin.repos_uuid.clone(),
                },
            )?;
            tx.execute(
                "INSERT INTO working_nodes (
                    local_relpath, parent_relpath, schedule, kind, checksum, target, depth,
                    properties, origin_repos_id, origin_repos_relpath, origin_revision,
                    moved_here, copied
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,1)
                ON CONFLICT(local_relpath) DO UPDATE SET
                    schedule=excluded.schedule, kind=excluded.kind, checksum=excluded.checksum,
                    target=excluded.target, depth=excluded.depth, properties=excluded.properties,
                    origin_repos_id=excluded.origin_repos_id,
                    origin_repos_relpath=excluded.origin_repos_relpath,
                    origin_revision=excluded.origin_revision, moved_here=excluded.moved_here,
                    copied=1",
                params![
                    relpath,
                    parent,
                    Schedule::Added.as_str(),
                    kind.as_str(),
                    checksum,
                    target,
                    depth.map(Depth::as_str),
                    crate::props::encode(props),
                    origin_repos_id,
                    origin.repos_relpath,
                    origin.revision,
                    i64::from(moved_here),
                ],
            )?;
            Ok(())
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn working_upsert(
        &self,
        path: &Path,
        schedule: Schedule,
        kind: Kind,
        depth: Option<Depth>,
        checksum: Option<&str>,
        target: Option<&str>,
        props: &Props,
    ) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        // An add over a row already scheduled for deletion is a replace,
        // not a plain add: the BASE row is still shadowed, just by a new
        // node instead of a hole.
        let schedule = match (schedule, self.working_schedule(&relpath)?) {
            (Schedule::Added, Some(Schedule::Deleted | Schedule::Replaced)) => Schedule::Replaced,
            (schedule, _) => schedule,
        };
        self.transact(|tx| {
            tx.execute(
                "INSERT INTO working_nodes (
                    local_relpath, parent_relpath, schedule, kind, checksum, target, depth,
                    properties, moved_here, copied
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,0,0)
                ON CONFLICT(local_relpath) DO UPDATE SET
                    schedule=excluded.schedule, kind=excluded.kind, checksum=excluded.checksum,
                    target=excluded.target, depth=excluded.depth, properties=excluded.properties",
                params![
                    relpath,
                    parent,
                    schedule.as_str(),
                    kind.as_str(),
                    checksum,
                    target,
                    depth.map(Depth::as_str),
                    crate::props::encode(props),
                ],
            )?;
            Ok(())
        })
    }

    /// Record an override of `path`'s effective properties in ACTUAL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_set_props(&self, path: &Path, props: &Props) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        self.transact(|tx| {
            tx.execute(
                "INSERT INTO actual_nodes (local_relpath, parent_relpath, properties, props_mod)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(local_relpath) DO UPDATE SET properties=excluded.properties, props_mod=1",
                params![relpath, parent, crate::props::encode(props)],
            )?;
            Ok(())
        })
    }

    /// Schedule `path` for deletion: cancels a pure local add in place, or
    /// else marks the WORKING row (creating one if needed) as `Deleted`
    /// (`Replaced` if it already carried a pending add over a BASE row).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if `path` has neither a BASE nor a
    /// WORKING row.
    pub fn op_delete(&self, path: &Path) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        let has_base = self.base_get_info(path).is_ok();
        let working_schedule = self.working_schedule(&relpath)?;

        self.transact(|tx| {
            match working_schedule {
                Some(Schedule::Added) if !has_base => {
                    tx.execute("DELETE FROM working_nodes WHERE local_relpath = ?1", params![relpath])?;
                }
                Some(Schedule::Added) => {
                    tx.execute(
                        "UPDATE working_nodes SET schedule = ?2 WHERE local_relpath = ?1",
                        params![relpath, Schedule::Replaced.as_str()],
                    )?;
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE working_nodes SET schedule = ?2 WHERE local_relpath = ?1",
                        params![relpath, Schedule::Deleted.as_str()],
                    )?;
                }
                None if has_base => {
                    tx.execute(
                        "INSERT INTO working_nodes (local_relpath, parent_relpath, schedule, kind, copied, moved_here)
                         VALUES (?1, ?2, ?3, 'unknown', 0, 0)",
                        params![relpath, parent, Schedule::Deleted.as_str()],
                    )?;
                }
                None => return Err(DbError::NotFound(relpath.clone())),
            }
            Ok(())
        })
    }

    fn working_schedule(&self, relpath: &str) -> Result<Option<Schedule>> {
        let text: Option<String> = self
            .conn()
            .query_row("SELECT schedule FROM working_nodes WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()?;
        Ok(text.as_deref().map(Schedule::from_str))
    }

    /// Report whether `path`'s working text differs from its pristine/BASE
    /// text, per the ACTUAL row's recorded `text_mod` flag.
    pub fn op_modified(&self, path: &Path) -> Result<bool> {
        let relpath = store::relpath(self.root(), path);
        let flag: Option<i64> = self
            .conn()
            .query_row("SELECT text_mod FROM actual_nodes WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()?;
        Ok(flag.unwrap_or(0) != 0)
    }

    /// Record `path`'s working-file size (bytes) and modification time
    /// (seconds since epoch), as observed by a prior stat, so a future
    /// status check can detect a changed file without re-reading it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_record_fileinfo(&self, path: &Path, size: i64, mtime: i64) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        self.transact(|tx| {
            tx.execute(
                "INSERT INTO actual_nodes (local_relpath, parent_relpath, recorded_size, recorded_mtime) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(local_relpath) DO UPDATE SET recorded_size=excluded.recorded_size, recorded_mtime=excluded.recorded_mtime",
                params![relpath, parent, size, mtime],
            )?;
            Ok(())
        })
    }

    /// Read back the size/mtime pair last recorded by
    /// [`Self::op_record_fileinfo`], if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_get_recorded_fileinfo(&self, path: &Path) -> Result<Option<(i64, i64)>> {
        let relpath = store::relpath(self.root(), path);
        let row: Option<(Option<i64>, Option<i64>)> = self
            .conn()
            .query_row(
                "SELECT recorded_size, recorded_mtime FROM actual_nodes WHERE local_relpath = ?1",
                params![relpath],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(size, mtime)| size.zip(mtime)))
    }

    /// Record `path`'s changelist membership (`None` clears it).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_set_changelist(&self, path: &Path, changelist: Option<&str>) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        self.transact(|tx| {
            tx.execute(
                "INSERT INTO actual_nodes (local_relpath, parent_relpath, changelist) VALUES (?1, ?2, ?3)
                 ON CONFLICT(local_relpath) DO UPDATE SET changelist=excluded.changelist",
                params![relpath, parent, changelist],
            )?;
            Ok(())
        })
    }

    /// Record a text/property conflict descriptor at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_mark_conflict(&self, path: &Path, conflict: &Skel) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        self.transact(|tx| {
            tx.execute(
                "INSERT INTO actual_nodes (local_relpath, parent_relpath, conflict_data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(local_relpath) DO UPDATE SET conflict_data=excluded.conflict_data",
                params![relpath, parent, conflict.encode()],
            )?;
            Ok(())
        })
    }

    /// Clear any text/property conflict recorded at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_mark_resolved(&self, path: &Path) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        self.conn()
            .execute("UPDATE actual_nodes SET conflict_data = NULL WHERE local_relpath = ?1", params![relpath])?;
        Ok(())
    }

    /// Undo any pending WORKING/ACTUAL state at `path`, restoring the BASE
    /// row (if any) to visibility.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_revert(&self, path: &Path) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        self.transact(|tx| {
            tx.execute("DELETE FROM working_nodes WHERE local_relpath = ?1", params![relpath])?;
            tx.execute("DELETE FROM actual_nodes WHERE local_relpath = ?1", params![relpath])?;
            Ok(())
        })
    }

    /// Read the tree-conflict descriptor recorded at `path`, if any.
    pub fn op_read_tree_conflict(&self, path: &Path) -> Result<Option<Skel>> {
        let relpath = store::relpath(self.root(), path);
        let text: Option<String> = self
            .conn()
            .query_row("SELECT tree_conflict_data FROM actual_nodes WHERE local_relpath = ?1", params![relpath], |row| row.get(0))
            .optional()?
            .flatten();
        text.map(|t| Skel::parse(&t)).transpose()
    }

    /// Record a tree-conflict descriptor at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn op_set_tree_conflict(&self, path: &Path, conflict: &Skel) -> Result<()> {
        let relpath = store::relpath(self.root(), path);
        let parent = store::parent_relpath(&relpath);
        self.transact(|tx| {
            tx.execute(
                "INSERT INTO actual_nodes (local_relpath, parent_relpath, tree_conflict_data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(local_relpath) DO UPDATE SET tree_conflict_data=excluded.tree_conflict_data",
                params![relpath, parent, conflict.encode()],
            )?;
            Ok(())
        })
    }

    /// List every recorded tree conflict under `root`, as `(path, conflict)`
    /// pairs.
    pub fn op_read_all_tree_conflicts(&self, root: &Path) -> Result<Vec<(String, Skel)>> {
        let relpath = store::relpath(self.root(), root);
        let prefix = format!("{relpath}/%");
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT local_relpath, tree_conflict_data FROM actual_nodes
             WHERE tree_conflict_data IS NOT NULL
               AND (local_relpath = ?1 OR local_relpath LIKE ?2 ESCAPE '\\')
             ORDER BY local_relpath",
        )?;
        let rows = stmt.query_map(params![relpath, prefix], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            let (path, text) = row?;
            out.push((path, Skel::parse(&text)?));
        }
        Ok(out)
    }
}
