// SPDX-License-Identifier: Apache-2.0
//! `WcContext`: the single entry point wiring the metadata store, lock
//! manager, pristine store, work-queue executor, and ambient-depth editor
//! behind one working-copy handle.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error};
use wc_db::{AdditionScan, BaseRepos, ChangeInfo, DeletionScan, NodeInfo, Registry, Store};
use wc_editor::{DeltaEditor, DepthFilterEditor};
use wc_lock::{LockManager, LockState};
use wc_pristine::FsPristineStore;
use wc_workqueue::Executor;

use crate::error::{WcError, WcErrorCode};
use crate::Result;

/// The working-copy engine facade: one instance per open wcroot, wrapping
/// the metadata store, lock manager, and pristine store used by every
/// higher-level operation.
pub struct WcContext {
    store: Arc<Store>,
    lock: LockManager,
    pristine: FsPristineStore,
}

impl WcContext {
    /// Open the administrative area rooted at `wcroot`, creating it if it
    /// doesn't yet exist, and the pristine blob store rooted at
    /// `pristine_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Db`] if the metadata store can't be opened, or
    /// [`WcError::Pristine`] if the pristine directory can't be prepared.
    pub fn open(wcroot: &Path, pristine_dir: &Path) -> Result<Self> {
        let store = Registry.open(wcroot)?;
        let pristine = FsPristineStore::open(pristine_dir)?;
        let lock = LockManager::new(Arc::clone(&store));
        Ok(Self { store, lock, pristine })
    }

    /// The wcroot-relative metadata store, for crates that need direct
    /// access beyond what this facade exposes.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The pristine blob store.
    #[must_use]
    pub fn pristine(&self) -> &FsPristineStore {
        &self.pristine
    }

    /// Resolve `path`'s fully merged BASE/WORKING/ACTUAL attributes.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::boundary`] with [`WcErrorCode::WcPathNotFound`]
    /// if `path` is not recorded in either layer.
    pub fn read_info(&self, path: &Path) -> Result<NodeInfo> {
        self.store.read_info(path).map_err(|_| WcError::boundary(WcErrorCode::WcPathNotFound, path))
    }

    /// Walk upward to find the repository identity covering `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Db`] on any underlying database failure.
    pub fn scan_base_repos(&self, path: &Path) -> Result<BaseRepos> {
        Ok(self.store.scan_base_repos(path)?)
    }

    /// Find the root of the contiguous WORKING-addition chain covering
    /// `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Db`] on any underlying database failure.
    pub fn scan_addition(&self, path: &Path) -> Result<AdditionScan> {
        Ok(self.store.scan_addition(path)?)
    }

    /// Find the nearest WORKING deletion root covering `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Db`] on any underlying database failure.
    pub fn scan_deletion(&self, path: &Path) -> Result<DeletionScan> {
        Ok(self.store.scan_deletion(path)?)
    }

    /// Fold a successful commit of `path` into the metadata store.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Db`] on any underlying database failure.
    pub fn global_commit(&self, path: &Path, new_revision: i64, changed: ChangeInfo) -> Result<()> {
        Ok(self.store.global_commit(path, new_revision, changed)?)
    }

    /// Acquire the write lock anchored at (or above) `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`WcError::boundary`] with [`WcErrorCode::WcLocked`] if
    /// the anchor is already held by another owner.
    pub fn acquire_write_lock(&self, path: &Path) -> Result<std::path::PathBuf> {
        self.lock.acquire_write_lock(path).map_err(|e| match e {
            wc_lock::LockError::Locked(p) => WcError::boundary(WcErrorCode::WcLocked, &p),
            other => WcError::Lock(other),
        })
    }

    /// Release the write lock held at `anchor`, preserving it if the work
    /// queue is still non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Lock`] on any underlying failure.
    pub fn release_write_lock(&self, anchor: &Path) -> Result<LockState> {
        Ok(self.lock.release_write_lock(anchor)?)
    }

    /// Acquire the lock covering `path`, run `func`, drain the work queue,
    /// and release, composing every failure rather than discarding any.
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Composite`] if more than one step failed, or the
    /// single underlying error otherwise.
    pub fn call_with_write_lock<T>(&self, path: &Path, func: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        let anchor = self.acquire_write_lock(path)?;
        debug!(anchor = %anchor.display(), "acquired write lock");

        let outcome = func(&anchor).and_then(|value| {
            let executor = Executor::new(&self.store, &self.pristine);
            executor.wq_run(None)?;
            Ok(value)
        });
        let release = self.release_write_lock(&anchor);

        match (outcome, release) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(release_err)) => {
                error!(anchor = %anchor.display(), error = %release_err, "lock release failed after successful operation");
                Err(release_err)
            }
            (Err(func_err), Ok(_)) => Err(func_err),
            (Err(func_err), Err(release_err)) => {
                error!(anchor = %anchor.display(), "both the operation and lock release failed");
                Err(WcError::Composite(vec![func_err, release_err]))
            }
        }
    }

    /// Drive `inner` through the ambient-depth filter rooted at `anchor`,
    /// targeting `target` beneath it (empty if `anchor` is itself the
    /// full edit target).
    ///
    /// # Errors
    ///
    /// Returns [`WcError::Editor`] if the drive fails.
    pub fn run_editor(
        &self,
        anchor: impl Into<String>,
        target: impl Into<String>,
        inner: &mut dyn DeltaEditor,
        drive: impl FnOnce(&mut dyn DeltaEditor) -> wc_editor::Result<()>,
    ) -> Result<()> {
        let mut filtered = DepthFilterEditor::new(inner, &self.store, anchor, target);
        drive(&mut filtered)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wc_db::{BaseNodeSpec, Depth, Props, ReposIdentity};
    use wc_editor::{DirToken, FileToken, NoopWindowHandler, WindowHandler};

    fn repos() -> ReposIdentity {
        ReposIdentity { root_url: "https://example.invalid/repo".to_string(), uuid: "11111111-1111-1111-1111-111111111111".to_string() }
    }

    fn spec() -> BaseNodeSpec {
        BaseNodeSpec {
            revision: 3,
            repos: repos(),
            repos_relpath: "trunk".to_string(),
            changed: ChangeInfo { rev: 3, date: 1_700_000_000_000, author: Some("alice".to_string()) },
        }
    }

    fn context(wcroot: &Path) -> (WcContext, tempfile::TempDir) {
        let pristine_dir = tempfile::tempdir().unwrap();
        let ctx = WcContext::open(wcroot, pristine_dir.path()).unwrap();
        (ctx, pristine_dir)
    }

    #[test]
    fn read_info_on_missing_path_reports_boundary_code() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _pristine) = context(dir.path());

        let err = ctx.read_info(Path::new("missing.txt")).unwrap_err();
        assert!(matches!(err, WcError::Boundary { code: WcErrorCode::WcPathNotFound, .. }));
    }

    #[test]
    fn acquire_and_release_restores_not_held_state() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _pristine) = context(dir.path());
        ctx.store.base_add_directory(Path::new(""), spec(), Depth::Infinity, &Props::new(), &[]).unwrap();

        let anchor = ctx.acquire_write_lock(Path::new("")).unwrap();
        assert_eq!(ctx.release_write_lock(&anchor).unwrap(), LockState::NotHeld);
    }

    #[test]
    fn double_acquire_reports_wc_locked_boundary_code() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _pristine) = context(dir.path());
        ctx.store.base_add_directory(Path::new(""), spec(), Depth::Infinity, &Props::new(), &[]).unwrap();

        ctx.store.wclock_set(Path::new(""), "other-owner").unwrap();
        let err = ctx.acquire_write_lock(Path::new("")).unwrap_err();
        assert!(matches!(err, WcError::Boundary { code: WcErrorCode::WcLocked, .. }));
    }

    #[test]
    fn call_with_write_lock_drains_the_work_queue_before_releasing() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _pristine) = context(dir.path());
        ctx.store.base_add_directory(Path::new(""), spec(), Depth::Infinity, &Props::new(), &[]).unwrap();

        let result: Result<()> = ctx.call_with_write_lock(Path::new(""), |_anchor| {
            ctx.store.wq_add(&wc_db::Skel::list([wc_db::Skel::atom("file-remove"), wc_db::Skel::atom("does-not-exist.txt")]))?;
            Ok(())
        });

        result.unwrap();
        assert_eq!(ctx.store.wq_len().unwrap(), 0);
    }

    struct NullEditor;

    impl DeltaEditor for NullEditor {
        fn set_target_revision(&mut self, _revision: i64) -> wc_editor::Result<()> {
            Ok(())
        }
        fn open_root(&mut self, _base_revision: i64) -> wc_editor::Result<DirToken> {
            Ok(DirToken(0))
        }
        fn delete_entry(&mut self, _path: &str, _revision: i64, _parent: DirToken) -> wc_editor::Result<()> {
            Ok(())
        }
        fn add_directory(&mut self, _path: &str, _parent: DirToken, _copyfrom: Option<(&str, i64)>) -> wc_editor::Result<DirToken> {
            Ok(DirToken(1))
        }
        fn open_directory(&mut self, _path: &str, _parent: DirToken, _base_revision: i64) -> wc_editor::Result<DirToken> {
            Ok(DirToken(1))
        }
        fn change_dir_prop(&mut self, _dir: DirToken, _name: &str, _value: Option<&[u8]>) -> wc_editor::Result<()> {
            Ok(())
        }
        fn close_directory(&mut self, _dir: DirToken) -> wc_editor::Result<()> {
            Ok(())
        }
        fn absent_directory(&mut self, _path: &str, _parent: DirToken) -> wc_editor::Result<()> {
            Ok(())
        }
        fn add_file(&mut self, _path: &str, _parent: DirToken, _copyfrom: Option<(&str, i64)>) -> wc_editor::Result<FileToken> {
            Ok(FileToken(0))
        }
        fn open_file(&mut self, _path: &str, _parent: DirToken, _base_revision: i64) -> wc_editor::Result<FileToken> {
            Ok(FileToken(0))
        }
        fn apply_textdelta(&mut self, _file: FileToken, _base_checksum: Option<&str>) -> wc_editor::Result<Box<dyn WindowHandler + '_>> {
            Ok(Box::new(NoopWindowHandler))
        }
        fn change_file_prop(&mut self, _file: FileToken, _name: &str, _value: Option<&[u8]>) -> wc_editor::Result<()> {
            Ok(())
        }
        fn close_file(&mut self, _file: FileToken, _text_checksum: Option<&str>) -> wc_editor::Result<()> {
            Ok(())
        }
        fn absent_file(&mut self, _path: &str, _parent: DirToken) -> wc_editor::Result<()> {
            Ok(())
        }
        fn close_edit(&mut self) -> wc_editor::Result<()> {
            Ok(())
        }
        fn abort_edit(&mut self) -> wc_editor::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn run_editor_drives_the_depth_filtered_inner_editor() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _pristine) = context(dir.path());

        let mut inner = NullEditor;
        ctx.run_editor("", "", &mut inner, |editor| {
            let root = editor.open_root(0)?;
            editor.close_directory(root)?;
            editor.close_edit()
        })
        .unwrap();
    }
}
