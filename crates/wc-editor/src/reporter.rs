// SPDX-License-Identifier: Apache-2.0
//! The reporter contract: how a client describes its local revision state
//! to a server before the server computes a diff against it.

use wc_db::Depth;

use crate::Result;

/// Callback set a status/update/switch driver uses to describe the local
/// tree's revision state path by path, finishing with `finish_report` or
/// `abort_report`.
pub trait Reporter {
    /// Report that `path` is present locally at `revision` and `depth`.
    /// `start_empty` means the client has nothing below `path` yet (a
    /// shallow checkout being deepened). `lock_token` is the client's
    /// recorded lock on `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn set_path(&mut self, path: &str, revision: i64, depth: Depth, start_empty: bool, lock_token: Option<&str>) -> Result<()>;

    /// Report that `path`, present in the reported baseline, is missing
    /// locally.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn delete_path(&mut self, path: &str) -> Result<()>;

    /// Report that `path` is switched to `url` at `revision` and `depth`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    #[allow(clippy::too_many_arguments)]
    fn link_path(&mut self, path: &str, url: &str, revision: i64, depth: Depth, start_empty: bool, lock_token: Option<&str>) -> Result<()>;

    /// Close out the report, triggering the server-side diff.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn finish_report(&mut self) -> Result<()>;

    /// Abandon the report without triggering a diff.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn abort_report(&mut self) -> Result<()>;
}
