// SPDX-License-Identifier: Apache-2.0
//! Relational store for the working copy's node state: BASE (last known
//! server state), WORKING (pending structural changes), and ACTUAL
//! (property overrides, conflicts, changelist membership).
//!
//! Backed by SQLite via `rusqlite`. One [`Store`] owns one open connection
//! to one wcroot's administrative database; [`Registry`] keeps the
//! process-wide map from wcroot path to open `Store` so repeated opens of
//! the same working copy within a process share a connection.
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(unsafe_code)]

mod base;
mod global;
mod lock;
mod props;
mod read;
mod registry;
mod scan;
mod schema;
mod skel;
mod store;
mod working;
mod workqueue;

pub use props::Props;
pub use registry::Registry;
pub use skel::{merge as skel_merge, Skel};
pub use store::Store;

use thiserror::Error;

/// Errors raised by the metadata store.
#[derive(Debug, Error)]
pub enum DbError {
    /// The underlying SQLite operation failed.
    #[error("db sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A filesystem operation (opening/creating the administrative area)
    /// failed.
    #[error("db io error: {0}")]
    Io(#[from] std::io::Error),
    /// A skel value could not be parsed.
    #[error("db skel malformed: {0}")]
    SkelMalformed(String),
    /// No node is recorded at the requested path.
    #[error("db node not found: {0}")]
    NotFound(String),
    /// The on-disk schema is newer than this build understands.
    #[error("db upgrade required: on-disk schema version {found}, supported {supported}")]
    UpgradeRequired {
        /// The `PRAGMA user_version` found on disk.
        found: i64,
        /// The schema version this build supports.
        supported: i64,
    },
    /// The work queue is empty.
    #[error("db work queue empty")]
    WorkQueueEmpty,
}

/// Result alias for metadata store operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Sentinel for "no revision recorded", matching the convention of treating
/// negative revisions as invalid.
pub const INVALID_REVISION: i64 = -1;

/// The kind of node a row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A directory.
    Dir,
    /// A regular file.
    File,
    /// A symlink.
    Symlink,
    /// Kind could not be determined (e.g. an obstruction).
    Unknown,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::File => "file",
            Self::Symlink => "symlink",
            Self::Unknown => "unknown",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "dir" => Self::Dir,
            "file" => Self::File,
            "symlink" => Self::Symlink,
            _ => Self::Unknown,
        }
    }
}

/// Ambient depth recorded on a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// No recorded children.
    Empty,
    /// Only file children are recorded.
    Files,
    /// Immediate children are recorded at depth `empty`.
    Immediates,
    /// Unconstrained.
    Infinity,
    /// Administratively excluded.
    Exclude,
    /// Not recorded.
    Unknown,
}

impl Depth {
    fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Files => "files",
            Self::Immediates => "immediates",
            Self::Infinity => "infinity",
            Self::Exclude => "exclude",
            Self::Unknown => "unknown",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "empty" => Self::Empty,
            "files" => Self::Files,
            "immediates" => Self::Immediates,
            "infinity" => Self::Infinity,
            "exclude" => Self::Exclude,
            _ => Self::Unknown,
        }
    }
}

/// BASE-row presence: whether the node is materially present, known-absent,
/// or a sentinel for a server-withheld/not-yet-existing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Node is fully present at this revision.
    Normal,
    /// Server withheld the node (authz).
    Absent,
    /// Known missing as of this revision (a future deletion marker).
    NotPresent,
    /// Administratively excluded from the working copy.
    Excluded,
    /// Row is a placeholder pending a full update.
    Incomplete,
}

impl Presence {
    fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Absent => "absent",
            Self::NotPresent => "not_present",
            Self::Excluded => "excluded",
            Self::Incomplete => "incomplete",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "absent" => Self::Absent,
            "not_present" => Self::NotPresent,
            "excluded" => Self::Excluded,
            "incomplete" => Self::Incomplete,
            _ => Self::Normal,
        }
    }
}

/// WORKING-row schedule: the pending structural change recorded for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// No WORKING row (present only for completeness of the enum space).
    Normal,
    /// Pure add, or add-over-deleted-BASE.
    Added,
    /// A delete shadowing a BASE row.
    Deleted,
    /// A delete followed by an add at the same path.
    Replaced,
}

impl Schedule {
    fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Replaced => "replaced",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "added" => Self::Added,
            "deleted" => Self::Deleted,
            "replaced" => Self::Replaced,
            _ => Self::Normal,
        }
    }
}

/// The resolved status of a node, derived from layer presence and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// BASE row present, no pending change.
    Normal,
    /// A pure WORKING add with no BASE counterpart.
    Added,
    /// A WORKING add whose origin is a local move.
    MovedHere,
    /// A WORKING add whose origin is a local copy.
    Copied,
    /// A WORKING delete with no replacing add.
    Deleted,
    /// The node's kind on disk does not match the recorded kind.
    Obstructed,
    /// An obstructed node that is also scheduled for addition.
    ObstructedAdd,
    /// An obstructed node that is also scheduled for deletion.
    ObstructedDelete,
    /// Server-withheld.
    Absent,
    /// Administratively excluded.
    Excluded,
    /// Known missing as of the recorded revision.
    NotPresent,
    /// Placeholder pending a full update.
    Incomplete,
    /// A BASE row shadowed by a WORKING delete.
    BaseDeleted,
}

/// Repository identity: root URL + UUID, inherited from the nearest
/// ancestor that records it (invariant 5 in `spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReposIdentity {
    /// The repository's root URL.
    pub root_url: String,
    /// The repository's UUID.
    pub uuid: String,
}

/// Last-change triple: revision, date, author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeInfo {
    /// Revision the change happened in.
    pub rev: i64,
    /// Change timestamp, unix epoch milliseconds.
    pub date: i64,
    /// Author, if recorded.
    pub author: Option<String>,
}

impl ChangeInfo {
    fn sentinel() -> Self {
        Self {
            rev: INVALID_REVISION,
            date: 0,
            author: None,
        }
    }
}

/// The copy/move origin of a WORKING row, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Source repository root URL.
    pub repos_root_url: String,
    /// Source repository UUID.
    pub repos_uuid: String,
    /// Source repository-relative path.
    pub repos_relpath: String,
    /// Source revision.
    pub revision: i64,
}

/// An RA-level lock descriptor, as recorded by [`Store::lock_add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    /// Opaque lock token issued by the repository.
    pub token: String,
    /// Lock owner.
    pub owner: Option<String>,
    /// Free-form lock comment.
    pub comment: Option<String>,
    /// Lock creation date, unix epoch milliseconds.
    pub date: i64,
}

/// Full attribute set returned by [`Store::read_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Resolved status.
    pub status: NodeStatus,
    /// Node kind.
    pub kind: Kind,
    /// BASE revision, or [`INVALID_REVISION`] if there is no BASE row.
    pub revision: i64,
    /// Repository identity, if resolvable without a scan.
    pub repos: Option<ReposIdentity>,
    /// Repository-relative path, if resolvable without a scan.
    pub repos_relpath: Option<String>,
    /// Last-changed triple.
    pub changed: ChangeInfo,
    /// Recorded ACTUAL mtime of the working file, unix epoch milliseconds.
    pub last_mod_time: i64,
    /// Ambient depth (directories only).
    pub depth: Depth,
    /// Pristine content hash, hex-encoded (files only).
    pub checksum: Option<String>,
    /// Recorded translated size in bytes (files only).
    pub translated_size: Option<i64>,
    /// Symlink target (symlinks only).
    pub symlink_target: Option<String>,
    /// Changelist membership.
    pub changelist: Option<String>,
    /// Copy/move origin, if any.
    pub origin: Option<Origin>,
    /// Working text differs from the pristine/BASE text.
    pub text_mod: bool,
    /// ACTUAL properties differ from BASE/WORKING properties.
    pub props_mod: bool,
    /// A WORKING row shadows a BASE row at this path.
    pub base_shadowed: bool,
    /// A conflict of any kind is recorded at this path.
    pub conflicted: bool,
    /// RA-level lock, if any.
    pub lock: Option<LockInfo>,
}

/// Result of [`Store::scan_base_repos`]: the inherited repository identity
/// and the repository-relative path of the original query path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRepos {
    /// The inherited repository identity.
    pub repos: ReposIdentity,
    /// Repository-relative path of the queried node.
    pub repos_relpath: String,
}

/// Result of [`Store::scan_addition`]: the root of the local addition and,
/// if it is a copy/move, the origin it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionScan {
    /// Status at the addition root (`Added`, `Copied`, or `MovedHere`).
    pub status: NodeStatus,
    /// Absolute path of the addition's root.
    pub op_root_relpath: String,
    /// Origin, if the addition root is a copy/move.
    pub origin: Option<Origin>,
}

/// Result of [`Store::scan_deletion`]: up to four related locations (see
/// `spec.md` §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeletionScan {
    /// Nearest BASE deletion root, if any.
    pub base_del_relpath: Option<String>,
    /// Whether `base_del_relpath` is also the target of a replacement.
    pub base_replaced: bool,
    /// Nearest move-destination path, if this node was moved away.
    pub moved_to_relpath: Option<String>,
    /// Nearest WORKING deletion root, if any.
    pub working_del_relpath: Option<String>,
}

/// Common fields every `base_add_*` call must supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseNodeSpec {
    /// Revision this row reflects.
    pub revision: i64,
    /// Repository identity.
    pub repos: ReposIdentity,
    /// Repository-relative path.
    pub repos_relpath: String,
    /// Last-changed triple.
    pub changed: ChangeInfo,
}

/// Full attribute set returned by [`Store::base_get_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseInfo {
    /// Row presence (normal / absent / not_present / excluded / incomplete).
    pub presence: Presence,
    /// Node kind.
    pub kind: Kind,
    /// Revision, or [`INVALID_REVISION`] if absent.
    pub revision: i64,
    /// Repository identity, if recorded directly on this row. `None` means
    /// the caller must `scan_base_repos` upward.
    pub repos: Option<ReposIdentity>,
    /// Repository-relative path, if recorded directly on this row.
    pub repos_relpath: Option<String>,
    /// Last-changed triple.
    pub changed: ChangeInfo,
    /// Ambient depth (directories only).
    pub depth: Depth,
    /// Pristine content hash, hex-encoded (files only).
    pub checksum: Option<String>,
    /// Recorded translated size in bytes (files only).
    pub translated_size: Option<i64>,
    /// Symlink target (symlinks only).
    pub target: Option<String>,
    /// RA-level lock, if any.
    pub lock: Option<LockInfo>,
    /// Row is a placeholder pending a full update.
    pub incomplete: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [Kind::Dir, Kind::File, Kind::Symlink, Kind::Unknown] {
            assert_eq!(Kind::from_str(kind.as_str()), kind);
        }
    }

    #[test]
    fn depth_round_trips_through_str() {
        for depth in [Depth::Empty, Depth::Files, Depth::Immediates, Depth::Infinity, Depth::Exclude] {
            assert_eq!(Depth::from_str(depth.as_str()), depth);
        }
    }

    #[test]
    fn presence_round_trips_through_str() {
        for presence in [Presence::Normal, Presence::Absent, Presence::NotPresent, Presence::Excluded, Presence::Incomplete] {
            assert_eq!(Presence::from_str(presence.as_str()), presence);
        }
    }

    #[test]
    fn change_info_sentinel_is_invalid_revision() {
        let sentinel = ChangeInfo::sentinel();
        assert_eq!(sentinel.rev, INVALID_REVISION);
        assert_eq!(sentinel.date, 0);
        assert!(sentinel.author.is_none());
    }
}
