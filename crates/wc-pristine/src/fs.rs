// SPDX-License-Identifier: Apache-2.0
//! Filesystem-backed pristine store: SHA-1-sharded blob area plus a flat
//! text index for the legacy MD5 cross-map.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};
use wc_stream::FileStream;

use crate::{CheckMode, CheckResult, Md5Digest, PristineError, Result, Sha1Digest};

const BLOBS_DIR: &str = "blobs";
const TMP_DIR: &str = "tmp";
const INDEX_FILE: &str = "md5-index";

#[derive(Default)]
struct Index {
    md5_to_sha1: HashMap<Md5Digest, Sha1Digest>,
    sha1_to_md5: HashMap<Sha1Digest, Md5Digest>,
}

impl Index {
    fn insert(&mut self, md5: Md5Digest, sha1: Sha1Digest) {
        self.md5_to_sha1.insert(md5, sha1);
        self.sha1_to_md5.insert(sha1, md5);
    }

    fn remove_sha1(&mut self, sha1: &Sha1Digest) {
        if let Some(md5) = self.sha1_to_md5.remove(sha1) {
            self.md5_to_sha1.remove(&md5);
        }
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        for (md5, sha1) in &self.md5_to_sha1 {
            out.push_str(&md5.to_string());
            out.push(' ');
            out.push_str(&sha1.to_string());
            out.push('\n');
        }
        out
    }

    fn parse(text: &str) -> Result<Self> {
        let mut index = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let md5_hex = parts
                .next()
                .ok_or_else(|| PristineError::IndexCorrupt(format!("line {lineno}: missing md5")))?;
            let sha1_hex = parts
                .next()
                .ok_or_else(|| PristineError::IndexCorrupt(format!("line {lineno}: missing sha1")))?;
            let md5 = Md5Digest::from_hex(md5_hex)
                .ok_or_else(|| PristineError::IndexCorrupt(format!("line {lineno}: bad md5 hex")))?;
            let sha1 = Sha1Digest::from_hex(sha1_hex)
                .ok_or_else(|| PristineError::IndexCorrupt(format!("line {lineno}: bad sha1 hex")))?;
            index.insert(md5, sha1);
        }
        Ok(index)
    }
}

/// A filesystem-backed, SHA-1-keyed pristine blob store.
///
/// Blobs live under `<root>/blobs/<shard>/<hex>`, sharded two hex characters
/// deep. `install` expects its caller to have already written the candidate
/// bytes to a path returned by [`FsPristineStore::get_tempdir`] so the final
/// rename stays on one filesystem and is therefore atomic.
///
/// Removal is *not* reference-counted by this store: the metadata store is
/// the only component that knows whether a hash is still referenced, so
/// callers must confirm that before calling [`FsPristineStore::remove`].
pub struct FsPristineStore {
    root: PathBuf,
    index: Mutex<Index>,
}

impl FsPristineStore {
    /// Open (creating if necessary) a pristine store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PristineError::Io`] if the directory layout cannot be
    /// created, or [`PristineError::IndexCorrupt`] if an existing index file
    /// cannot be parsed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(BLOBS_DIR))?;
        fs::create_dir_all(root.join(TMP_DIR))?;
        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            let text = fs::read_to_string(&index_path)?;
            Index::parse(&text)?
        } else {
            Index::default()
        };
        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    fn blob_path(&self, sha1: &Sha1Digest) -> PathBuf {
        self.root.join(BLOBS_DIR).join(sha1.shard()).join(sha1.to_string())
    }

    /// Absolute path a blob would live at. Does not guarantee the blob
    /// exists; callers wanting that guarantee should call
    /// [`FsPristineStore::check`] first.
    pub fn get_path(&self, sha1: &Sha1Digest) -> PathBuf {
        self.blob_path(sha1)
    }

    /// Open a readable stream over the blob's content.
    ///
    /// # Errors
    ///
    /// Returns [`PristineError::NotFound`] if no blob is stored under `sha1`.
    pub fn read(&self, sha1: &Sha1Digest) -> Result<FileStream> {
        let path = self.blob_path(sha1);
        FileStream::open_read(&path).map_err(|_| PristineError::NotFound(*sha1))
    }

    /// A directory co-located with the blob area such that a file written
    /// there can be atomically renamed into place by [`FsPristineStore::install`].
    pub fn get_tempdir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Adopt `temp_path` (previously written under [`FsPristineStore::get_tempdir`])
    /// as the blob for `sha1`, recording `md5` as an auxiliary cross-map entry.
    ///
    /// # Errors
    ///
    /// Returns [`PristineError::HashMismatch`] if the file's actual content
    /// does not hash to `sha1`, leaving the temp file in place. Returns
    /// [`PristineError::Io`] on any filesystem failure.
    pub fn install(&self, temp_path: &Path, sha1: Sha1Digest, md5: Option<Md5Digest>) -> Result<()> {
        let mut file = File::open(temp_path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let computed = Sha1Digest::of(&bytes);
        if computed != sha1 {
            return Err(PristineError::HashMismatch {
                expected: sha1,
                computed,
            });
        }
        let dest = self.blob_path(&sha1);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        rename_atomic(temp_path, &dest)?;
        if let Some(md5) = md5 {
            let mut index = index_lock(&self.index);
            index.insert(md5, sha1);
            self.persist_index(&index)?;
        }
        debug!(sha1 = %sha1, "installed pristine blob");
        Ok(())
    }

    /// Look up the MD5 cross-map entry for `sha1`, if one was recorded.
    pub fn get_md5(&self, sha1: &Sha1Digest) -> Option<Md5Digest> {
        index_lock(&self.index).sha1_to_md5.get(sha1).copied()
    }

    /// Look up the SHA-1 cross-map entry for `md5`, if one was recorded.
    pub fn get_sha1(&self, md5: &Md5Digest) -> Option<Sha1Digest> {
        index_lock(&self.index).md5_to_sha1.get(md5).copied()
    }

    /// Remove the blob stored under `sha1` and any cross-map entries that
    /// point at it.
    ///
    /// Callers are responsible for confirming no metadata row still
    /// references `sha1` before calling this; the store itself has no view
    /// of the metadata store.
    ///
    /// # Errors
    ///
    /// Returns [`PristineError::Io`] if the blob file exists but cannot be
    /// removed. Removing an already-absent blob is not an error.
    pub fn remove(&self, sha1: &Sha1Digest) -> Result<()> {
        let path = self.blob_path(sha1);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let mut index = index_lock(&self.index);
        index.remove_sha1(sha1);
        self.persist_index(&index)?;
        Ok(())
    }

    /// Verify presence/integrity of the blob under `sha1` to the depth
    /// requested by `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`PristineError::Io`] on any I/O failure other than the blob
    /// being absent (absence is reported as [`CheckResult::Missing`]).
    pub fn check(&self, sha1: &Sha1Digest, mode: CheckMode) -> Result<CheckResult> {
        let path = self.blob_path(sha1);
        match mode {
            CheckMode::Exists | CheckMode::BatchExists | CheckMode::ExpectedUsable => {
                match fs::metadata(&path) {
                    Ok(meta) if mode == CheckMode::ExpectedUsable => {
                        if meta.len() == 0 {
                            Ok(CheckResult::Corrupt)
                        } else {
                            Ok(CheckResult::Ok)
                        }
                    }
                    Ok(_) => Ok(CheckResult::Ok),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CheckResult::Missing),
                    Err(e) => Err(e.into()),
                }
            }
            CheckMode::FullHash => {
                let bytes = match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Ok(CheckResult::Missing)
                    }
                    Err(e) => return Err(e.into()),
                };
                if Sha1Digest::of(&bytes) == *sha1 {
                    Ok(CheckResult::Ok)
                } else {
                    Ok(CheckResult::Corrupt)
                }
            }
        }
    }

    /// Run [`FsPristineStore::check`] with [`CheckMode::BatchExists`] over
    /// many hashes in one pass.
    ///
    /// # Errors
    ///
    /// Returns [`PristineError::Io`] if any underlying stat fails for a
    /// reason other than the file being absent.
    pub fn check_batch(&self, hashes: &[Sha1Digest]) -> Result<Vec<(Sha1Digest, CheckResult)>> {
        hashes
            .iter()
            .map(|h| self.check(h, CheckMode::BatchExists).map(|r| (*h, r)))
            .collect()
    }

    /// Attempt to reconcile the on-disk blob with its expected hash.
    ///
    /// If the content re-hashes correctly, returns [`CheckResult::Ok`]
    /// unchanged. Otherwise the inconsistent blob (and any cross-map entries
    /// pointing at it) is removed and the pre-repair state is returned.
    ///
    /// # Errors
    ///
    /// Returns [`PristineError::Io`] if removal of an inconsistent blob
    /// fails.
    pub fn repair(&self, sha1: &Sha1Digest) -> Result<CheckResult> {
        let result = self.check(sha1, CheckMode::FullHash)?;
        if result != CheckResult::Ok {
            warn!(sha1 = %sha1, ?result, "repairing inconsistent pristine record");
            self.remove(sha1)?;
        }
        Ok(result)
    }

    fn persist_index(&self, index: &Index) -> Result<()> {
        let tmp = self.get_tempdir().join(format!("index-{}.tmp", std::process::id()));
        fs::write(&tmp, index.to_text())?;
        rename_atomic(&tmp, &self.root.join(INDEX_FILE))?;
        Ok(())
    }
}

fn index_lock(index: &Mutex<Index>) -> std::sync::MutexGuard<'_, Index> {
    index.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn rename_atomic(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// `EXDEV` ("cross-device link"), returned by `rename(2)` when source and
/// destination are on different filesystems. Hardcoded rather than pulled
/// from a libc binding since it is stable across all Unix targets this store
/// runs on; Windows never returns it.
const fn libc_exdev() -> i32 {
    18
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write_temp(store: &FsPristineStore, contents: &[u8]) -> PathBuf {
        let path = store.get_tempdir().join("candidate");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn install_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let contents = b"pristine text contents";
        let sha1 = Sha1Digest::of(contents);
        let temp = write_temp(&store, contents);
        store.install(&temp, sha1, None).unwrap();

        let mut stream = store.read(&sha1).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 8];
        loop {
            let n = wc_stream::Stream::read(&mut stream, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, contents);
    }

    #[test]
    fn install_rejects_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let temp = write_temp(&store, b"actual content");
        let wrong = Sha1Digest::of(b"not the actual content");
        let err = store.install(&temp, wrong, None).unwrap_err();
        assert!(matches!(err, PristineError::HashMismatch { .. }));
    }

    #[test]
    fn md5_cross_map_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let contents = b"legacy lookup target";
        let sha1 = Sha1Digest::of(contents);
        let md5 = Md5Digest::of(contents);
        let temp = write_temp(&store, contents);
        store.install(&temp, sha1, Some(md5)).unwrap();

        assert_eq!(store.get_md5(&sha1), Some(md5));
        assert_eq!(store.get_sha1(&md5), Some(sha1));
    }

    #[test]
    fn cross_map_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let contents = b"persisted across reopen";
        let sha1 = Sha1Digest::of(contents);
        let md5 = Md5Digest::of(contents);
        {
            let store = FsPristineStore::open(dir.path()).unwrap();
            let temp = write_temp(&store, contents);
            store.install(&temp, sha1, Some(md5)).unwrap();
        }
        let reopened = FsPristineStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get_sha1(&md5), Some(sha1));
    }

    #[test]
    fn check_reports_missing_for_unknown_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let missing = Sha1Digest::of(b"never installed");
        assert_eq!(store.check(&missing, CheckMode::Exists).unwrap(), CheckResult::Missing);
        assert_eq!(store.check(&missing, CheckMode::FullHash).unwrap(), CheckResult::Missing);
    }

    #[test]
    fn check_full_hash_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let contents = b"will be corrupted on disk";
        let sha1 = Sha1Digest::of(contents);
        let temp = write_temp(&store, contents);
        store.install(&temp, sha1, None).unwrap();

        fs::write(store.get_path(&sha1), b"tampered bytes").unwrap();
        assert_eq!(store.check(&sha1, CheckMode::Exists).unwrap(), CheckResult::Ok);
        assert_eq!(store.check(&sha1, CheckMode::FullHash).unwrap(), CheckResult::Corrupt);
    }

    #[test]
    fn repair_removes_corrupt_blob_and_cross_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let contents = b"will be corrupted then repaired";
        let sha1 = Sha1Digest::of(contents);
        let md5 = Md5Digest::of(contents);
        let temp = write_temp(&store, contents);
        store.install(&temp, sha1, Some(md5)).unwrap();

        fs::write(store.get_path(&sha1), b"tampered").unwrap();
        let result = store.repair(&sha1).unwrap();
        assert_eq!(result, CheckResult::Corrupt);
        assert_eq!(store.check(&sha1, CheckMode::Exists).unwrap(), CheckResult::Missing);
        assert_eq!(store.get_sha1(&md5), None);
    }

    #[test]
    fn remove_is_idempotent_on_absent_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let sha1 = Sha1Digest::of(b"never installed either");
        store.remove(&sha1).unwrap();
        store.remove(&sha1).unwrap();
    }

    #[test]
    fn batch_check_reports_each_hash_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPristineStore::open(dir.path()).unwrap();
        let present = b"present blob";
        let sha1_present = Sha1Digest::of(present);
        let temp = write_temp(&store, present);
        store.install(&temp, sha1_present, None).unwrap();
        let sha1_missing = Sha1Digest::of(b"absent blob");

        let results = store.check_batch(&[sha1_present, sha1_missing]).unwrap();
        assert_eq!(results[0], (sha1_present, CheckResult::Ok));
        assert_eq!(results[1], (sha1_missing, CheckResult::Missing));
    }
}
