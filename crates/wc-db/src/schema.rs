// SPDX-License-Identifier: Apache-2.0
//! DDL and the `PRAGMA user_version` migration check.

use rusqlite::Connection;

use crate::{DbError, Result};

/// The schema version this build writes and expects to read.
pub const SCHEMA_VERSION: i64 = 1;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    root_url TEXT NOT NULL UNIQUE,
    uuid TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS base_nodes (
    local_relpath TEXT PRIMARY KEY,
    parent_relpath TEXT,
    repos_id INTEGER REFERENCES repositories(id),
    repos_relpath TEXT,
    presence TEXT NOT NULL,
    kind TEXT NOT NULL,
    revision INTEGER NOT NULL,
    changed_rev INTEGER,
    changed_date INTEGER,
    changed_author TEXT,
    depth TEXT,
    checksum TEXT,
    translated_size INTEGER,
    target TEXT,
    dav_cache TEXT,
    properties TEXT,
    lock_token TEXT,
    lock_owner TEXT,
    lock_comment TEXT,
    lock_date INTEGER,
    incomplete INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS base_nodes_parent ON base_nodes(parent_relpath);

CREATE TABLE IF NOT EXISTS working_nodes (
    local_relpath TEXT PRIMARY KEY,
    parent_relpath TEXT,
    schedule TEXT NOT NULL,
    kind TEXT NOT NULL,
    checksum TEXT,
    target TEXT,
    depth TEXT,
    properties TEXT,
    origin_repos_id INTEGER REFERENCES repositories(id),
    origin_repos_relpath TEXT,
    origin_revision INTEGER,
    moved_here INTEGER NOT NULL DEFAULT 0,
    copied INTEGER NOT NULL DEFAULT 0,
    moved_to_relpath TEXT
);
CREATE INDEX IF NOT EXISTS working_nodes_parent ON working_nodes(parent_relpath);

CREATE TABLE IF NOT EXISTS actual_nodes (
    local_relpath TEXT PRIMARY KEY,
    parent_relpath TEXT,
    properties TEXT,
    conflict_data TEXT,
    tree_conflict_data TEXT,
    changelist TEXT,
    text_mod INTEGER NOT NULL DEFAULT 0,
    props_mod INTEGER NOT NULL DEFAULT 0,
    recorded_size INTEGER,
    recorded_mtime INTEGER
);

CREATE TABLE IF NOT EXISTS wc_lock (
    local_relpath TEXT PRIMARY KEY,
    owner_token TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS work_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    skel TEXT NOT NULL
);
";

/// Open (creating if needed) the schema at `user_version`, failing closed if
/// the on-disk schema is newer than this build supports.
///
/// # Errors
///
/// Returns [`DbError::UpgradeRequired`] if the stored `user_version` is
/// greater than [`SCHEMA_VERSION`]. Returns [`DbError::Sqlite`] on any other
/// failure.
pub fn open_or_migrate(conn: &Connection) -> Result<()> {
    let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(DbError::UpgradeRequired {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    conn.execute_batch(DDL)?;
    if found < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fresh_db_gets_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        open_or_migrate(&conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn future_version_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        let err = open_or_migrate(&conn).unwrap_err();
        assert!(matches!(err, DbError::UpgradeRequired { .. }));
    }

    #[test]
    fn reopening_an_existing_db_is_a_noop() {
        let conn = Connection::open_in_memory().unwrap();
        open_or_migrate(&conn).unwrap();
        open_or_migrate(&conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
