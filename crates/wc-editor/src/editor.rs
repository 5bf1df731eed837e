// SPDX-License-Identifier: Apache-2.0
//! The delta-editor contract: a structured callback set an RA collaborator
//! drives from `set_target_revision` through `close_edit`/`abort_edit`.
//!
//! Directories and files are addressed by opaque tokens handed back to the
//! caller by `open_root`/`add_directory`/`add_file`/etc., standing in for
//! the hierarchical batons of the original C API. An implementation is
//! free to choose what a token means internally; callers only ever pass
//! back a token they were just given.

use crate::Result;

/// An opaque handle to an open directory within one editor drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirToken(pub u64);

/// An opaque handle to an open file within one editor drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileToken(pub u64);

/// Receives zero or more delta windows for a file, followed by a final
/// `None` signaling the end of the stream.
pub trait WindowHandler {
    /// Apply one delta window, or finalize the stream on `None`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] if the window is malformed or the
    /// underlying write fails.
    fn apply_window(&mut self, window: Option<&[u8]>) -> Result<()>;
}

/// A window handler that discards every window it receives. Used by the
/// depth filter to swallow text deltas for excluded files.
pub struct NoopWindowHandler;

impl WindowHandler for NoopWindowHandler {
    fn apply_window(&mut self, _window: Option<&[u8]>) -> Result<()> {
        Ok(())
    }
}

/// A structured callback set describing one tree-delta edit.
///
/// An editor drive runs `set_target_revision`, then `open_root`, then a
/// sequence of per-entry calls nested under the directory tokens they
/// return, finishing with `close_edit` or `abort_edit`.
#[allow(clippy::too_many_arguments)]
pub trait DeltaEditor {
    /// Announce the revision this drive will bring the tree to.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn set_target_revision(&mut self, revision: i64) -> Result<()>;

    /// Open the root of the edit, returning its token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn open_root(&mut self, base_revision: i64) -> Result<DirToken>;

    /// Record that `path` (relative to the wcroot) no longer exists at
    /// `revision` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn delete_entry(&mut self, path: &str, revision: i64, parent: DirToken) -> Result<()>;

    /// Add a new directory at `path` under `parent`, optionally copied from
    /// `copyfrom` (url-ish path, revision).
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn add_directory(&mut self, path: &str, parent: DirToken, copyfrom: Option<(&str, i64)>) -> Result<DirToken>;

    /// Open an existing directory at `path` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn open_directory(&mut self, path: &str, parent: DirToken, base_revision: i64) -> Result<DirToken>;

    /// Set or remove (on `None`) a property on `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn change_dir_prop(&mut self, dir: DirToken, name: &str, value: Option<&[u8]>) -> Result<()>;

    /// Finish editing `dir`; no further calls may reference its token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn close_directory(&mut self, dir: DirToken) -> Result<()>;

    /// Record that the server withheld `path` under `parent` (authz).
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn absent_directory(&mut self, path: &str, parent: DirToken) -> Result<()>;

    /// Add a new file at `path` under `parent`, optionally copied from
    /// `copyfrom`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn add_file(&mut self, path: &str, parent: DirToken, copyfrom: Option<(&str, i64)>) -> Result<FileToken>;

    /// Open an existing file at `path` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn open_file(&mut self, path: &str, parent: DirToken, base_revision: i64) -> Result<FileToken>;

    /// Begin a text delta against `file`, optionally checked against
    /// `base_checksum`. The returned handler receives the delta windows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn apply_textdelta(&mut self, file: FileToken, base_checksum: Option<&str>) -> Result<Box<dyn WindowHandler + '_>>;

    /// Set or remove (on `None`) a property on `file`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn change_file_prop(&mut self, file: FileToken, name: &str, value: Option<&[u8]>) -> Result<()>;

    /// Finish editing `file`, optionally checked against `text_checksum`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn close_file(&mut self, file: FileToken, text_checksum: Option<&str>) -> Result<()>;

    /// Record that the server withheld `path` under `parent` (authz).
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn absent_file(&mut self, path: &str, parent: DirToken) -> Result<()>;

    /// Finish the drive successfully.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn close_edit(&mut self) -> Result<()>;

    /// Abort the drive; any partial state the editor staged must be
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EditorError`] on failure.
    fn abort_edit(&mut self) -> Result<()>;
}
