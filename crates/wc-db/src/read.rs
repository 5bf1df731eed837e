// SPDX-License-Identifier: Apache-2.0
//! `read_info`: the unified view across BASE, WORKING, and ACTUAL for a
//! single node.

use std::path::Path;

use rusqlite::{params, OptionalExtension};

use crate::store::{self, Store};
use crate::{ChangeInfo, DbError, Depth, Kind, NodeInfo, NodeStatus, Presence, Result, Schedule, INVALID_REVISION};

struct ActualRow {
    changelist: Option<String>,
    text_mod: bool,
    props_mod: bool,
    conflicted: bool,
}

impl Store {
    /// Read the fully resolved attribute set for `path`: its structural
    /// status, the layer it comes from, and any ACTUAL overlay.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if `path` has neither a BASE nor a
    /// WORKING row.
    pub fn read_info(&self, path: &Path) -> Result<NodeInfo> {
        let relpath = store::relpath(self.root(), path);
        let working = self.read_working_row(&relpath)?;
        let base = self.base_get_info(path).ok();
        let actual = self.read_actual_row(&relpath)?;

        if working.is_none() && base.is_none() {
            return Err(DbError::NotFound(relpath));
        }

        let base_shadowed = base.is_some() && working.is_some();

        let (status, kind, revision, repos, repos_relpath, changed, depth, checksum, translated_size, target, lock) =
            if let Some(row) = &working {
                let status = match row.schedule {
                    Schedule::Added | Schedule::Replaced if row.moved_here => NodeStatus::MovedHere,
                    Schedule::Added | Schedule::Replaced if row.copied => NodeStatus::Copied,
                    Schedule::Added | Schedule::Replaced => NodeStatus::Added,
                    Schedule::Deleted => NodeStatus::Deleted,
                    Schedule::Normal => NodeStatus::Normal,
                };
                let (kind, checksum, target, depth) = self.read_working_shape(&relpath)?;
                let (repos, repos_relpath) = match &row.origin {
                    Some(origin) => (
                        Some(crate::ReposIdentity {
                            root_url: origin.repos_root_url.clone(),
                            uuid: origin.repos_uuid.clone(),
                        }),
                        Some(origin.repos_relpath.clone()),
                    ),
                    None => (None, None),
                };
                (
                    status,
                    kind,
                    INVALID_REVISION,
                    repos,
                    repos_relpath,
                    ChangeInfo::sentinel(),
                    depth,
                    checksum,
                    None,
                    target,
                    None,
                )
            } else {
                let base = base.as_ref().ok_or_else(|| DbError::NotFound(relpath.clone()))?;
                let status = match base.presence {
                    Presence::Normal => NodeStatus::Normal,
                    Presence::Absent => NodeStatus::Absent,
                    Presence::NotPresent => NodeStatus::NotPresent,
                    Presence::Excluded => NodeStatus::Excluded,
                    Presence::Incomplete => NodeStatus::Incomplete,
                };
                (
                    status,
                    base.kind,
                    base.revision,
                    base.repos.clone(),
                    base.repos_relpath.clone(),
                    base.changed.clone(),
                    base.depth,
                    base.checksum.clone(),
                    base.translated_size,
                    base.target.clone(),
                    base.lock.clone(),
                )
            };

        Ok(NodeInfo {
            status,
            kind,
            revision,
            repos,
            repos_relpath,
            changed,
            last_mod_time: 0,
            depth,
            checksum,
            translated_size,
            symlink_target: target,
            changelist: actual.as_ref().and_then(|a| a.changelist.clone()),
            origin: working.and_then(|w| w.origin),
            text_mod: actual.as_ref().is_some_and(|a| a.text_mod),
            props_mod: actual.as_ref().is_some_and(|a| a.props_mod),
            base_shadowed,
            conflicted: actual.is_some_and(|a| a.conflicted),
            lock,
        })
    }

    pub(crate) fn read_working_shape(&self, relpath: &str) -> Result<(Kind, Option<String>, Option<String>, Depth)> {
        let row = self
            .conn()
            .query_row(
                "SELECT kind, checksum, target, depth FROM working_nodes WHERE local_relpath = ?1",
                params![relpath],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((kind, checksum, target, depth)) = row else {
            return Ok((Kind::Unknown, None, None, Depth::Unknown));
        };
        Ok((
            Kind::from_str(&kind),
            checksum,
            target,
            depth.as_deref().map_or(Depth::Unknown, Depth::from_str),
        ))
    }

    fn read_actual_row(&self, relpath: &str) -> Result<Option<ActualRow>> {
        let row = self
            .conn()
            .query_row(
                "SELECT changelist, text_mod, props_mod, conflict_data, tree_conflict_data
                 FROM actual_nodes WHERE local_relpath = ?1",
                params![relpath],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(changelist, text_mod, props_mod, conflict_data, tree_conflict_data)| ActualRow {
            changelist,
            text_mod: text_mod != 0,
            props_mod: props_mod != 0,
            conflicted: conflict_data.is_some() || tree_conflict_data.is_some(),
        }))
    }
}
