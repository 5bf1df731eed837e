// SPDX-License-Identifier: Apache-2.0
//! Process-wide registry of open [`Store`] handles, keyed by canonicalized
//! wcroot path.
//!
//! Repeated opens of the same working copy within a process share one
//! `Store`/connection rather than racing two SQLite handles against the
//! same file. Entries are held weakly: once every `Arc<Store>` a caller
//! holds is dropped, the next `open` for that path creates a fresh `Store`
//! rather than resurrecting a half-torn-down one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::{Result, Store};

type Map = HashMap<PathBuf, Weak<Store>>;

fn global() -> &'static Mutex<Map> {
    static REGISTRY: OnceLock<Mutex<Map>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Handle onto the process-wide open-databases registry.
///
/// This is a zero-sized facade; all state lives behind the module-level
/// `OnceLock`. Constructing a `Registry` never fails and never allocates.
#[derive(Debug, Default, Clone, Copy)]
pub struct Registry;

impl Registry {
    /// Open (or return the already-open, shared) store for `wcroot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the wcroot's administrative database cannot be
    /// opened or its schema is unreadable.
    pub fn open(self, wcroot: &Path) -> Result<Arc<Store>> {
        let key = canonical_key(wcroot);
        let mut map = lock(global());
        if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        let store = Arc::new(Store::open(wcroot)?);
        map.insert(key, Arc::downgrade(&store));
        Ok(store)
    }

    /// Number of wcroots currently tracked, including entries whose last
    /// strong reference has already been dropped but not yet swept.
    pub fn tracked_count(self) -> usize {
        lock(global()).len()
    }

    /// Drop any entries whose `Store` has no remaining strong references.
    pub fn sweep(self) {
        lock(global()).retain(|_, weak| weak.strong_count() > 0);
    }
}

fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn lock(mutex: &Mutex<Map>) -> std::sync::MutexGuard<'_, Map> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
