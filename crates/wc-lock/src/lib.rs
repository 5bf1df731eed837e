// SPDX-License-Identifier: Apache-2.0
//! Scoped write-lock protocol over a working copy subtree: anchor
//! selection, recursive directory locking, and the empty-queue release
//! gate that lets a crashed process's pending work survive a restart.
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use wc_db::{DbError, Kind, Store};

/// Errors raised by the lock manager.
#[derive(Debug, Error)]
pub enum LockError {
    /// A target directory is already locked by another holder.
    #[error("wc locked: {0}")]
    Locked(PathBuf),
    /// A mutation was attempted without first acquiring the lock.
    #[error("wc not locked: {0}")]
    NotLocked(PathBuf),
    /// The underlying metadata store failed.
    #[error("wc-lock db error: {0}")]
    Db(#[from] DbError),
    /// More than one failure occurred in the same operation (e.g. the
    /// guarded function failed and releasing the lock afterward also
    /// failed); every failure is preserved rather than dropping all but
    /// one.
    #[error("multiple wc-lock failures: {0:?}")]
    Composite(Vec<LockError>),
}

/// Result alias for lock manager operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// The state of a lock holder at one anchor, per the protocol's state
/// machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock held.
    NotHeld,
    /// Lock held, no pending work items.
    Held,
    /// Lock held solely because the work queue is non-empty.
    HeldPreservedForWq,
}

fn next_owner_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("pid:{}:seq:{seq}", std::process::id())
}

/// Acquires and releases scoped write locks over a wcroot, backed by a
/// shared [`wc_db::Store`].
pub struct LockManager {
    store: Arc<Store>,
}

impl LockManager {
    /// Wrap an already-open metadata store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Determine the anchor for `path`: the parent directory if it shares
    /// the same repository branch as `path`, else `path` itself.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Db`] on any underlying database failure.
    pub fn anchor_for(&self, path: &Path) -> Result<PathBuf> {
        let Some(parent) = path.parent() else {
            return Ok(path.to_path_buf());
        };
        if parent == Path::new("") && path != Path::new("") {
            // `path` is a top-level entry; its parent is the wcroot itself,
            // which is always the anchor for anything beneath it.
            return Ok(parent.to_path_buf());
        }

        match (self.store.scan_base_repos(parent), self.store.scan_base_repos(path)) {
            (Ok(par), Ok(node)) if par.repos == node.repos && node.repos_relpath.starts_with(&format!("{}/", par.repos_relpath)) => {
                Ok(parent.to_path_buf())
            }
            _ => Ok(path.to_path_buf()),
        }
    }

    /// Acquire the write lock on the anchor covering `path`, plus every
    /// directory beneath it, rolling back the partial acquisition on any
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Locked`] if any target directory is already
    /// held by a different owner.
    pub fn acquire_write_lock(&self, path: &Path) -> Result<PathBuf> {
        let anchor = self.anchor_for(path)?;
        let dirs = self.collect_directories(&anchor)?;
        let token = next_owner_token();

        let mut acquired = Vec::with_capacity(dirs.len());
        for dir in &dirs {
            if self.store.wclock_set(dir, &token).is_ok() {
                acquired.push(dir.clone());
            } else {
                for done in &acquired {
                    if let Err(e) = self.store.wclock_remove(done) {
                        warn!(path = %done.display(), error = %e, "failed to roll back partial lock acquisition");
                    }
                }
                return Err(LockError::Locked(dir.clone()));
            }
        }

        debug!(anchor = %anchor.display(), dirs = dirs.len(), "acquired write lock");
        Ok(anchor)
    }

    /// Release the write lock held at `anchor`, unless the work queue is
    /// non-empty, in which case it is preserved for a later cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Db`] on any underlying database failure.
    pub fn release_write_lock(&self, anchor: &Path) -> Result<LockState> {
        if self.store.wq_len()? > 0 {
            debug!(anchor = %anchor.display(), "preserving lock: work queue not empty");
            return Ok(LockState::HeldPreservedForWq);
        }

        for dir in self.collect_directories(anchor)? {
            self.store.wclock_remove(&dir)?;
        }
        Ok(LockState::NotHeld)
    }

    /// Verify the caller holds the write lock at `path` before a mutation.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotLocked`] if `path` is not currently locked
    /// by `owner_token`.
    pub fn require_own_lock(&self, path: &Path, owner_token: &str) -> Result<()> {
        if self.store.temp_own_lock(path, owner_token)? {
            Ok(())
        } else {
            Err(LockError::NotLocked(path.to_path_buf()))
        }
    }

    /// The current lock state at `anchor`, independent of ownership.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Db`] on any underlying database failure.
    pub fn state(&self, anchor: &Path) -> Result<LockState> {
        if !self.store.wclocked(anchor)? {
            return Ok(LockState::NotHeld);
        }
        if self.store.wq_len()? > 0 {
            Ok(LockState::HeldPreservedForWq)
        } else {
            Ok(LockState::Held)
        }
    }

    /// Acquire the anchor lock covering `path`, run `func`, and release on
    /// every exit path, composing a release failure with `func`'s error
    /// rather than discarding either.
    ///
    /// # Errors
    ///
    /// Returns whatever `func` or lock acquisition/release returned; both
    /// failures are reported via [`LockError::Composite`] if they both
    /// occur.
    pub fn call_with_write_lock<T>(&self, path: &Path, func: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        let anchor = self.acquire_write_lock(path)?;
        let outcome = func(&anchor);
        let release = self.release_write_lock(&anchor);

        match (outcome, release) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(func_err), Ok(_)) => Err(func_err),
            (Err(func_err), Err(release_err)) => Err(LockError::Composite(vec![func_err, release_err])),
        }
    }

    /// Recursively list `root` and every BASE-recorded directory beneath
    /// it, depth-first. WORKING-only (not-yet-committed) directories are
    /// not locked separately: they gain no independent administrative area
    /// until a commit promotes them into BASE.
    fn collect_directories(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut out = vec![root.to_path_buf()];
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for name in self.store.base_get_children(&dir)? {
                let child = dir.join(&name);
                if matches!(self.store.base_get_info(&child), Ok(info) if info.kind == Kind::Dir) {
                    out.push(child.clone());
                    stack.push(child);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wc_db::{BaseNodeSpec, ChangeInfo, Depth, Presence, ReposIdentity, Skel};

    fn repos() -> ReposIdentity {
        ReposIdentity {
            root_url: "https://example.invalid/repo".to_string(),
            uuid: "11111111-1111-1111-1111-111111111111".to_string(),
        }
    }

    fn spec(relpath: &str) -> BaseNodeSpec {
        BaseNodeSpec {
            revision: 4,
            repos: repos(),
            repos_relpath: relpath.to_string(),
            changed: ChangeInfo {
                rev: 4,
                date: 1_700_000_000_000,
                author: Some("alice".to_string()),
            },
        }
    }

    fn manager_with_tree(dir: &Path) -> LockManager {
        let store = Arc::new(Store::open(dir).unwrap());
        let props = BTreeMap::new();
        store.base_add_directory(Path::new(""), spec("trunk"), Depth::Infinity, &props, &[]).unwrap();
        store.base_add_directory(Path::new("sub"), spec("trunk/sub"), Depth::Infinity, &props, &[]).unwrap();
        store.base_add_file(Path::new("sub/a.txt"), spec("trunk/sub/a.txt"), "hash", None, &props, &[]).unwrap();
        LockManager::new(store)
    }

    #[test]
    fn acquire_locks_root_and_descendant_directories() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_tree(dir.path());

        let anchor = manager.acquire_write_lock(Path::new("sub/a.txt")).unwrap();
        assert_eq!(anchor, Path::new("sub"));
        assert_eq!(manager.state(Path::new("sub")).unwrap(), LockState::Held);
    }

    #[test]
    fn acquire_fails_and_rolls_back_when_already_locked() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_tree(dir.path());

        manager.store.wclock_set(Path::new("sub"), "other-owner").unwrap();
        let err = manager.acquire_write_lock(Path::new("sub/a.txt")).unwrap_err();
        assert!(matches!(err, LockError::Locked(_)));
        // The root wasn't left locked by our failed attempt.
        assert!(!manager.store.wclocked(Path::new("")).unwrap());
    }

    #[test]
    fn release_with_empty_queue_clears_lock() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_tree(dir.path());

        let anchor = manager.acquire_write_lock(Path::new("sub")).unwrap();
        let state = manager.release_write_lock(&anchor).unwrap();
        assert_eq!(state, LockState::NotHeld);
    }

    #[test]
    fn release_with_pending_work_preserves_lock() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_tree(dir.path());

        let anchor = manager.acquire_write_lock(Path::new("sub")).unwrap();
        manager.store.wq_add(&Skel::atom("file-remove")).unwrap();

        let state = manager.release_write_lock(&anchor).unwrap();
        assert_eq!(state, LockState::HeldPreservedForWq);
        assert!(manager.store.wclocked(&anchor).unwrap());
    }

    #[test]
    fn call_with_write_lock_releases_on_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_tree(dir.path());

        let result = manager.call_with_write_lock(Path::new("sub"), |_anchor| Ok(42));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(manager.state(Path::new("sub")).unwrap(), LockState::NotHeld);

        let result: Result<()> = manager.call_with_write_lock(Path::new("sub"), |_anchor| Err(LockError::NotLocked(PathBuf::from("x"))));
        assert!(result.is_err());
        assert_eq!(manager.state(Path::new("sub")).unwrap(), LockState::NotHeld);
    }

    #[test]
    fn anchor_for_switched_child_is_the_child_itself() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_tree(dir.path());
        // "switched" node: repos_relpath does not continue the parent's.
        manager
            .store
            .base_add_absent_node(Path::new("sub/switched"), spec("branches/other"), wc_db::Kind::Dir, Presence::Excluded)
            .unwrap();

        let anchor = manager.anchor_for(Path::new("sub/switched")).unwrap();
        assert_eq!(anchor, Path::new("sub/switched"));
    }
}
