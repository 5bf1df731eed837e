// SPDX-License-Identifier: Apache-2.0
//! The facade error type: one `#[from]` variant per component error, plus
//! the stable boundary error codes callers pattern-match on.

use thiserror::Error;

use wc_config::ConfigError;
use wc_db::DbError;
use wc_editor::EditorError;
use wc_lock::LockError;
use wc_pristine::PristineError;
use wc_stream::StreamError;
use wc_workqueue::WorkQueueError;

/// A stable, matchable identifier for a boundary-level failure. Callers
/// should pattern-match on the code, never on the error's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcErrorCode {
    /// The given path is not inside any recognized working copy.
    WcNotWorkingCopy,
    /// The target is already locked by another process.
    WcLocked,
    /// A mutation was attempted without holding the required lock.
    WcNotLocked,
    /// The path does not exist in the working copy's metadata.
    WcPathNotFound,
    /// The path exists but not in the state the operation requires.
    WcPathUnexpectedStatus,
    /// The administrative area is a newer (or unreadable older) schema
    /// version than this engine supports.
    WcUpgradeRequired,
    /// An update/switch encountered an on-disk obstruction it could not
    /// resolve automatically.
    WcObstructedUpdate,
    /// An operation aborted to avoid discarding local modifications.
    WcLeftLocalMod,
    /// A work-queue item was malformed or referenced an unknown operation.
    WcBadAdmLog,
    /// The working copy has pending work-queue items or a stale lock that
    /// must be resolved with a cleanup pass before proceeding.
    WcCleanupRequired,
    /// The client's local copy has been modified relative to what the
    /// operation expected.
    ClientModified,
    /// The path is not under version control.
    UnversionedResource,
}

/// The facade error returned by every [`crate::WcContext`] operation.
#[derive(Debug, Error)]
pub enum WcError {
    /// The metadata store failed.
    #[error("wc-core db error: {0}")]
    Db(#[from] DbError),
    /// The lock manager failed.
    #[error("wc-core lock error: {0}")]
    Lock(#[from] LockError),
    /// The work-queue executor failed.
    #[error("wc-core work queue error: {0}")]
    WorkQueue(#[from] WorkQueueError),
    /// The pristine store failed.
    #[error("wc-core pristine error: {0}")]
    Pristine(#[from] PristineError),
    /// A stream operation failed.
    #[error("wc-core stream error: {0}")]
    Stream(#[from] StreamError),
    /// The ambient-depth editor failed.
    #[error("wc-core editor error: {0}")]
    Editor(#[from] EditorError),
    /// The configuration store failed.
    #[error("wc-core config error: {0}")]
    Config(#[from] ConfigError),
    /// A boundary-level failure identified by a stable [`WcErrorCode`],
    /// for conditions that don't map onto a single component error (or
    /// that a caller needs to pattern-match on reliably).
    #[error("{code:?}: {message}")]
    Boundary {
        /// The stable error code.
        code: WcErrorCode,
        /// A human-readable, localizable message naming the offending
        /// path.
        message: String,
    },
    /// More than one failure occurred in the same operation (e.g. a
    /// work-item failure followed by a lock-release failure); every
    /// failure is preserved rather than dropping all but one.
    #[error("multiple wc-core failures: {0:?}")]
    Composite(Vec<WcError>),
}

impl WcError {
    /// Construct a [`WcError::Boundary`] naming `path` as the offending
    /// location.
    #[must_use]
    pub fn boundary(code: WcErrorCode, path: &std::path::Path) -> Self {
        Self::Boundary { code, message: path.display().to_string() }
    }
}
