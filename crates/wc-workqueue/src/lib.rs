// SPDX-License-Identifier: Apache-2.0
//! The work queue executor: dispatches deferred, crash-safe mutations
//! recorded by [`wc_db::Store::wq_add`] against the filesystem and the
//! pristine store.
//!
//! Items are skel lists whose head atom names the operation and whose tail
//! atoms are its arguments (see module docs on each handler below). Every
//! handler is idempotent: a handler that moves or removes a file treats
//! "already gone" as success, since a prior run may have completed the same
//! step before a crash interrupted the queue.
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(unsafe_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;
use wc_db::{BaseInfo, ChangeInfo, DbError, Skel, Store};
use wc_pristine::{FsPristineStore, PristineError, Sha1Digest};
use wc_stream::{Eol, FileStream, Stream, StreamError};

/// Property key this crate uses to mark a working file executable. Mirrors
/// the key convention the BASE/WORKING property maps already use elsewhere
/// in the engine.
const PROP_EXECUTABLE: &str = "executable";
/// Property key marking a node as needing a repository lock before edits.
const PROP_NEEDS_LOCK: &str = "needs-lock";
/// Property key marking a file's pristine content as a symlink target
/// rather than literal text; `file-install` materializes it as a
/// symlink-like representation instead of a plain file.
const PROP_SPECIAL: &str = "special";
/// Property key naming the line-ending convention `file-install` rewrites
/// the working file to: `native`, `LF`, `CR`, or `CRLF`.
const PROP_EOL_STYLE: &str = "eol-style";
/// Property key listing (space-separated) which `$Keyword$` markers
/// `file-install` expands in the working file.
const PROP_KEYWORDS: &str = "keywords";

/// Errors raised while executing the work queue.
#[derive(Debug, Error)]
pub enum WorkQueueError {
    /// The metadata store failed.
    #[error("work queue db error: {0}")]
    Db(#[from] DbError),
    /// The pristine blob store failed.
    #[error("work queue pristine error: {0}")]
    Pristine(#[from] PristineError),
    /// A stream copy/translation step failed.
    #[error("work queue stream error: {0}")]
    Stream(#[from] StreamError),
    /// Filesystem I/O outside the stream abstraction failed.
    #[error("work queue io error: {0}")]
    Io(#[from] std::io::Error),
    /// A work item named an operation this build does not recognize.
    #[error("unknown work queue operation: {0}")]
    UnknownOp(String),
    /// A work item's argument list did not match its operation's arity or
    /// shape.
    #[error("malformed work queue item for {op}: {detail}")]
    Malformed {
        /// The operation whose arguments were malformed.
        op: String,
        /// What was wrong with them.
        detail: String,
    },
    /// The cancel callback requested the run stop between items.
    #[error("work queue run cancelled")]
    Cancelled,
}

/// Result alias for work queue operations.
pub type Result<T> = std::result::Result<T, WorkQueueError>;

fn malformed(op: &str, detail: impl Into<String>) -> WorkQueueError {
    WorkQueueError::Malformed {
        op: op.to_string(),
        detail: detail.into(),
    }
}

fn arg_str<'a>(op: &str, args: &'a [Skel], index: usize) -> Result<&'a str> {
    args.get(index)
        .and_then(Skel::as_str)
        .ok_or_else(|| malformed(op, format!("missing or non-string argument {index}")))
}

fn arg_opt_str(args: &[Skel], index: usize) -> Option<&str> {
    args.get(index).and_then(Skel::as_str)
}

fn arg_i64(op: &str, args: &[Skel], index: usize) -> Result<i64> {
    arg_str(op, args, index)?.parse().map_err(|_| malformed(op, format!("argument {index} is not an integer")))
}

fn arg_bool(args: &[Skel], index: usize) -> bool {
    arg_opt_str(args, index) == Some("1")
}

/// Executes work items against a wcroot's metadata store and pristine blob
/// store.
pub struct Executor<'a> {
    store: &'a Store,
    pristine: &'a FsPristineStore,
}

impl<'a> Executor<'a> {
    /// Build an executor over an already-open store and pristine area.
    #[must_use]
    pub fn new(store: &'a Store, pristine: &'a FsPristineStore) -> Self {
        Self { store, pristine }
    }

    /// Run every pending item in FIFO order, honoring `cancel` between
    /// items. An unknown operation or a handler error aborts the run
    /// immediately, leaving the failing item (and everything after it) on
    /// the queue for a later retry.
    ///
    /// # Errors
    ///
    /// Returns the first handler failure, or [`WorkQueueError::Cancelled`]
    /// if `cancel` requests a stop before the next item.
    pub fn wq_run(&self, cancel: Option<&dyn Fn() -> bool>) -> Result<()> {
        loop {
            if cancel.is_some_and(|c| c()) {
                return Err(WorkQueueError::Cancelled);
            }
            let Some((id, item)) = self.store.wq_fetch()? else {
                return Ok(());
            };
            self.dispatch(&item)?;
            self.store.wq_completed(id)?;
        }
    }

    fn dispatch(&self, item: &Skel) -> Result<()> {
        let Some(parts) = item.as_list() else {
            return Err(malformed("<item>", "work item is not a list"));
        };
        let (op, args) = parts.split_first().ok_or_else(|| malformed("<item>", "empty work item"))?;
        let op = op.as_str().ok_or_else(|| malformed("<item>", "leading atom is not a string"))?;

        debug!(op, "executing work item");
        match op {
            "revert" => self.revert(args),
            "prep-rev-files" => self.prep_rev_files(args),
            "killme" => self.killme(args),
            "loggy" => self.loggy(args),
            "deletion-postcommit" => self.deletion_postcommit(args),
            "postcommit" => self.postcommit(args),
            "delete" => self.delete(args),
            "file-install" => self.file_install(args),
            "file-remove" => self.file_remove(args),
            "sync-file-flags" => self.sync_file_flags(args),
            "prej-install" => self.prej_install(args),
            "write-old-props" => self.write_old_props(args),
            "record-fileinfo" => self.record_fileinfo(args),
            "install-properties" => self.install_properties(args),
            other => Err(WorkQueueError::UnknownOp(other.to_string())),
        }
    }

    fn wc_path(&self, relpath: &str) -> PathBuf {
        self.store.root().join(relpath)
    }

    /// `revert path replaced? magic-prop-changed? use-commit-times?`
    ///
    /// Clears the pending WORKING/ACTUAL state and, if a BASE text exists,
    /// re-materializes it; a pure local add has no BASE text, so its
    /// working file is removed instead.
    fn revert(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("revert", args, 0)?;
        let use_commit_times = arg_bool(args, 3);
        let path = Path::new(relpath);

        match self.store.base_get_info(path) {
            Ok(info) if info.checksum.is_some() => {
                self.materialize_from_pristine(path, info.checksum.as_deref(), use_commit_times.then_some(info.changed.date))?;
            }
            _ => remove_file_tolerant(&self.wc_path(relpath))?,
        }

        self.store.op_revert(path)?;
        Ok(())
    }

    /// `prep-rev-files path`
    ///
    /// Copies the current BASE text aside to a `.svn-revert` sibling so a
    /// later `revert` of a replacement can restore it.
    fn prep_rev_files(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("prep-rev-files", args, 0)?;
        let path = Path::new(relpath);
        let Ok(info) = self.store.base_get_info(path) else {
            return Ok(());
        };
        let Some(checksum) = info.checksum.as_deref() else {
            return Ok(());
        };
        let dest = revert_sibling(&self.wc_path(relpath));
        self.copy_pristine_to(checksum, &dest)
    }

    /// `killme dir-path adm-only?`
    ///
    /// Removes a directory's administrative area (and, unless `adm-only?`,
    /// its working files), leaving a `not_present` BASE marker if the
    /// directory's own revision had outgrown its parent's.
    fn killme(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("killme", args, 0)?;
        let adm_only = arg_bool(args, 1);
        let path = Path::new(relpath);

        let dir_info = self.store.base_get_info(path).ok();
        let parent_info = parent_relpath(relpath).and_then(|parent| self.store.base_get_info(Path::new(&parent)).ok());

        if !adm_only {
            if let Err(e) = std::fs::remove_dir_all(self.wc_path(relpath)) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        self.store.base_remove(path)?;

        if let Some(dir) = dir_info {
            let outgrew_parent = parent_info.is_none_or(|parent| dir.revision > parent.revision);
            if outgrew_parent {
                if let (Some(repos), Some(repos_relpath)) = (dir.repos, dir.repos_relpath) {
                    let spec = wc_db::BaseNodeSpec {
                        revision: dir.revision,
                        repos,
                        repos_relpath,
                        changed: dir.changed,
                    };
                    self.store.base_add_absent_node(path, spec, dir.kind, wc_db::Presence::NotPresent)?;
                }
            }
        }
        Ok(())
    }

    /// `loggy adm-path log-skel`
    ///
    /// Legacy compatibility shim: this build never wrote the historical XML
    /// log format, so a "loggy" item's payload is itself a skel list of
    /// work items, replayed in order.
    fn loggy(&self, args: &[Skel]) -> Result<()> {
        let blob = arg_str("loggy", args, 1)?;
        let script = Skel::parse(blob).map_err(|_| malformed("loggy", "payload is not a valid skel"))?;
        let Some(items) = script.as_list() else {
            return Err(malformed("loggy", "payload is not a skel list"));
        };
        for item in items {
            self.dispatch(item)?;
        }
        Ok(())
    }

    /// `deletion-postcommit path new-rev no-unlock?`
    ///
    /// After a committed delete, drops the node from version control,
    /// leaving a `not_present` marker if the new revision outgrew the
    /// parent's.
    fn deletion_postcommit(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("deletion-postcommit", args, 0)?;
        let new_rev = arg_i64("deletion-postcommit", args, 1)?;
        let no_unlock = arg_bool(args, 2);
        let path = Path::new(relpath);

        let info = self.store.base_get_info(path).ok();
        let parent_info = parent_relpath(relpath).and_then(|parent| self.store.base_get_info(Path::new(&parent)).ok());
        self.store.base_remove(path)?;

        if let Some(info) = info {
            let outgrew_parent = parent_info.is_none_or(|parent| new_rev > parent.revision);
            if outgrew_parent {
                if let (Some(repos), Some(repos_relpath)) = (info.repos, info.repos_relpath) {
                    let spec = wc_db::BaseNodeSpec {
                        revision: new_rev,
                        repos,
                        repos_relpath,
                        changed: info.changed,
                    };
                    self.store.base_add_absent_node(path, spec, info.kind, wc_db::Presence::NotPresent)?;
                }
            }
        }

        if !no_unlock {
            let _ = self.store.lock_remove(path);
        }
        Ok(())
    }

    /// `postcommit path new-rev new-date [author] [checksum] [dav-cache]
    /// keep-changelist? [tmp-text-base]`
    ///
    /// Collapses WORKING/ACTUAL into BASE at the new revision, installing
    /// the just-committed text from its pristine temp location if given.
    fn postcommit(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("postcommit", args, 0)?;
        let new_rev = arg_i64("postcommit", args, 1)?;
        let new_date = arg_i64("postcommit", args, 2)?;
        let author = arg_opt_str(args, 3).map(str::to_string);
        let keep_changelist = arg_bool(args, 6);
        let tmp_text_base = arg_opt_str(args, 7);
        let path = Path::new(relpath);

        self.store.global_commit(
            path,
            new_rev,
            ChangeInfo {
                rev: new_rev,
                date: new_date,
                author,
            },
        )?;

        if let Some(tmp) = tmp_text_base {
            let bytes = std::fs::read(tmp)?;
            let sha1 = Sha1Digest::of(&bytes);
            self.pristine.install(Path::new(tmp), sha1, None)?;
            self.materialize_from_pristine(path, Some(&sha1.to_string()), None)?;
        }

        if !keep_changelist {
            self.store.op_set_changelist(path, None)?;
        }
        Ok(())
    }

    /// `delete path kind was-added? was-copied? was-replaced?`
    ///
    /// Finalizes filesystem bookkeeping for a local delete: a plain delete
    /// (not a replace) removes the working file; a replace leaves it, since
    /// the replacement's content takes its place.
    fn delete(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("delete", args, 0)?;
        let kind = arg_str("delete", args, 1)?;
        let was_replaced = arg_bool(args, 4);
        if kind == "file" && !was_replaced {
            remove_file_tolerant(&self.wc_path(relpath))?;
        }
        Ok(())
    }

    /// `file-install path use-commit-times? record-fileinfo? [source-path]`
    ///
    /// Re-materializes the working file from `source-path` (if given) or
    /// from the pristine store. A `special`-propertied node is written as a
    /// symlink-like representation of its pristine target text rather than
    /// a plain-text copy; otherwise the content is rewritten through the
    /// `eol-style`/`keywords` translation whenever either property is set.
    fn file_install(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("file-install", args, 0)?;
        let use_commit_times = arg_bool(args, 1);
        let record = arg_bool(args, 2);
        let source = arg_opt_str(args, 3);
        let path = Path::new(relpath);
        let dest = self.wc_path(relpath);
        let info = self.store.base_get_info(path).ok();
        let props = self.store.base_get_props(path).unwrap_or_default();

        if props.contains_key(PROP_SPECIAL) {
            let target = self.read_install_source(source, info.as_ref())?;
            install_special(&target_text(&target), &dest)?;
        } else {
            let eol = props.get(PROP_EOL_STYLE).and_then(|v| std::str::from_utf8(v).ok()).and_then(parse_eol_style);
            let keywords = parse_keywords(props.get(PROP_KEYWORDS));
            if eol.is_none() && keywords.is_empty() {
                if let Some(source) = source {
                    copy_file(Path::new(source), &dest)?;
                } else {
                    let info = info.as_ref().ok_or_else(|| malformed("file-install", "no source path and no pristine info"))?;
                    self.materialize_from_pristine(path, info.checksum.as_deref(), None)?;
                }
            } else {
                let mut reader = self.open_install_source(source, info.as_ref())?;
                let mut writer = FileStream::create_write(&dest)?;
                translate(&mut reader, &mut writer, eol, &keywords, info.as_ref(), relpath)?;
                writer.close()?;
            }
        }

        if use_commit_times {
            if let Some(date) = info.as_ref().map(|info| info.changed.date) {
                set_mtime(&dest, date)?;
            }
        }

        self.sync_flags(path, &dest)?;

        if record {
            self.record_stat(relpath, &dest)?;
        }
        Ok(())
    }

    /// Open the content `file-install` should read from: an explicit source
    /// path, or the pristine blob named by `info`'s checksum.
    fn open_install_source(&self, source: Option<&str>, info: Option<&BaseInfo>) -> Result<FileStream> {
        if let Some(source) = source {
            return Ok(FileStream::open_read(Path::new(source))?);
        }
        let checksum = info.and_then(|info| info.checksum.as_deref()).ok_or_else(|| malformed("file-install", "no source path and no pristine checksum"))?;
        let sha1 = Sha1Digest::from_hex(checksum).ok_or_else(|| malformed("file-install", "checksum is not valid hex"))?;
        Ok(self.pristine.read(&sha1)?)
    }

    /// Read the full content `file-install` should materialize, for the
    /// `special` path where the content is a symlink target rather than a
    /// stream to translate line-by-line.
    fn read_install_source(&self, source: Option<&str>, info: Option<&BaseInfo>) -> Result<Vec<u8>> {
        if let Some(source) = source {
            return Ok(std::fs::read(source)?);
        }
        let checksum = info.and_then(|info| info.checksum.as_deref()).ok_or_else(|| malformed("file-install", "no source path and no pristine checksum"))?;
        let sha1 = Sha1Digest::from_hex(checksum).ok_or_else(|| malformed("file-install", "checksum is not valid hex"))?;
        let mut reader = self.pristine.read(&sha1)?;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        Ok(buf)
    }

    /// `file-remove path`
    fn file_remove(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("file-remove", args, 0)?;
        remove_file_tolerant(&self.wc_path(relpath))
    }

    /// `sync-file-flags path`
    fn sync_file_flags(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("sync-file-flags", args, 0)?;
        let path = Path::new(relpath);
        self.sync_flags(path, &self.wc_path(relpath))
    }

    /// `prej-install path conflict-skel`
    ///
    /// Writes a human-readable property-reject file next to `path`.
    fn prej_install(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("prej-install", args, 0)?;
        let conflict = args.get(1).ok_or_else(|| malformed("prej-install", "missing conflict skel"))?;
        let prej_path = prej_sibling(&self.wc_path(relpath));
        let tmp = prej_path.with_extension("prej.tmp");
        std::fs::write(&tmp, describe_conflict(conflict))?;
        std::fs::rename(&tmp, &prej_path)?;
        Ok(())
    }

    /// `write-old-props props-path [props]`
    ///
    /// Writes a legacy property file, or removes it if no payload is given.
    fn write_old_props(&self, args: &[Skel]) -> Result<()> {
        let props_path = arg_str("write-old-props", args, 0)?;
        let path = self.wc_path(props_path);
        match args.get(1) {
            Some(props) => std::fs::write(path, props.encode())?,
            None => remove_file_tolerant(&path)?,
        }
        Ok(())
    }

    /// `record-fileinfo path`
    fn record_fileinfo(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("record-fileinfo", args, 0)?;
        let path = self.wc_path(relpath);
        if path.exists() {
            self.record_stat(relpath, &path)?;
        }
        Ok(())
    }

    /// `install-properties path [base-props] [actual-props]` (legacy)
    fn install_properties(&self, args: &[Skel]) -> Result<()> {
        let relpath = arg_str("install-properties", args, 0)?;
        let path = Path::new(relpath);
        if let Some(base_props) = args.get(1).and_then(Skel::as_list) {
            let props = decode_prop_list(base_props);
            self.store.op_set_props(path, &props)?;
        }
        Ok(())
    }

    fn sync_flags(&self, path: &Path, dest: &Path) -> Result<()> {
        let props = self.store.base_get_props(path).or_else(|_| self.store.base_get_props(path)).unwrap_or_default();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            if dest.exists() {
                let executable = props.contains_key(PROP_EXECUTABLE);
                let read_only = props.contains_key(PROP_NEEDS_LOCK);
                let mut perms = std::fs::metadata(dest)?.permissions();
                let base = if read_only { 0o444 } else { 0o644 };
                perms.set_mode(if executable { base | 0o111 } else { base });
                std::fs::set_permissions(dest, perms)?;
            }
        }
        Ok(())
    }

    fn record_stat(&self, relpath: &str, path: &Path) -> Result<()> {
        let meta = std::fs::metadata(path)?;
        let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        self.store.op_record_fileinfo(Path::new(relpath), size, mtime)?;
        Ok(())
    }

    fn materialize_from_pristine(&self, dest_path: &Path, checksum: Option<&str>, commit_date: Option<i64>) -> Result<()> {
        let Some(checksum) = checksum else {
            return Ok(());
        };
        let dest = self.store.root().join(dest_path);
        self.copy_pristine_to(checksum, &dest)?;
        if let Some(date) = commit_date {
            set_mtime(&dest, date)?;
        }
        Ok(())
    }

    fn copy_pristine_to(&self, checksum: &str, dest: &Path) -> Result<()> {
        let sha1 = Sha1Digest::from_hex(checksum).ok_or_else(|| malformed("<pristine>", "checksum is not valid hex"))?;
        let mut reader = self.pristine.read(&sha1)?;
        let mut writer = FileStream::create_write(dest)?;
        wc_stream::copy(&mut reader, &mut writer, None)?;
        Ok(())
    }
}

fn parent_relpath(relpath: &str) -> Option<String> {
    if relpath.is_empty() {
        return None;
    }
    Some(relpath.rsplit_once('/').map_or(String::new(), |(parent, _)| parent.to_string()))
}

fn decode_prop_list(items: &[Skel]) -> wc_db::Props {
    let mut props = wc_db::Props::new();
    for pair in items {
        if let Some([key, value]) = pair.as_list() {
            if let Some(key) = key.as_str() {
                if let Some(value) = value.as_atom() {
                    props.insert(key.to_string(), value.to_vec());
                }
            }
        }
    }
    props
}

fn describe_conflict(conflict: &Skel) -> String {
    format!("{}\n", conflict.encode())
}

fn revert_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".svn-revert");
    path.with_file_name(name)
}

fn prej_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".prej");
    path.with_file_name(name)
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    let mut reader = FileStream::open_read(source)?;
    let mut writer = FileStream::create_write(dest)?;
    wc_stream::copy(&mut reader, &mut writer, None)?;
    Ok(())
}

/// The line-ending convention an `eol-style` property value selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EolStyle {
    Native,
    Lf,
    Cr,
    CrLf,
}

fn parse_eol_style(value: &str) -> Option<EolStyle> {
    match value {
        "native" => Some(EolStyle::Native),
        "LF" => Some(EolStyle::Lf),
        "CR" => Some(EolStyle::Cr),
        "CRLF" => Some(EolStyle::CrLf),
        _ => None,
    }
}

fn eol_bytes(style: EolStyle) -> &'static [u8] {
    match style {
        EolStyle::Cr => b"\r",
        EolStyle::CrLf => b"\r\n",
        EolStyle::Native if cfg!(windows) => b"\r\n",
        EolStyle::Lf | EolStyle::Native => b"\n",
    }
}

fn parse_keywords(value: Option<&Vec<u8>>) -> Vec<String> {
    let Some(text) = value.and_then(|v| std::str::from_utf8(v).ok()) else {
        return Vec::new();
    };
    text.split_whitespace().map(str::to_string).collect()
}

/// Pristine content of a `special` node is its symlink target, optionally
/// with a trailing line terminator; strip it before use.
fn target_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches(['\n', '\r']).to_string()
}

fn install_special(target: &str, dest: &Path) -> Result<()> {
    remove_file_tolerant(dest)?;
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, dest)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(dest, target.as_bytes())?;
    }
    Ok(())
}

/// Rewrite `reader` into `writer` line by line, substituting `$Keyword$`
/// markers and normalizing line terminators to `eol` (or leaving them as
/// `\n`, the pristine store's canonical line ending, when only keyword
/// substitution was requested).
fn translate(
    reader: &mut dyn Stream,
    writer: &mut dyn Stream,
    eol: Option<EolStyle>,
    keywords: &[String],
    info: Option<&BaseInfo>,
    relpath: &str,
) -> Result<()> {
    let terminator = eol.map_or(&b"\n"[..], eol_bytes);
    let transform = |line: Vec<u8>| expand_keywords(line, keywords, info, relpath);
    let transform_ref: Option<&wc_stream::LineTransformer<'_>> = if keywords.is_empty() { None } else { Some(&transform) };
    loop {
        let (line, eof) = reader.readline(Eol::Detect, None, transform_ref)?;
        if eof && line.is_empty() {
            break;
        }
        writer.write(&line)?;
        if eof {
            break;
        }
        writer.write(terminator)?;
    }
    Ok(())
}

fn expand_keywords(line: Vec<u8>, keywords: &[String], info: Option<&BaseInfo>, relpath: &str) -> Vec<u8> {
    let Ok(text) = String::from_utf8(line.clone()) else {
        return line;
    };
    let mut out = text;
    for keyword in keywords {
        if let Some(expansion) = keyword_expansion(keyword, info, relpath) {
            out = substitute_keyword(&out, keyword, &expansion);
        }
    }
    out.into_bytes()
}

/// Values `$Id$`/`$Revision$`/`$Author$`/`$Date$` expand to. Timestamps are
/// rendered as raw Unix-epoch milliseconds; no date-formatting crate is
/// part of this workspace's dependency stack.
fn keyword_expansion(keyword: &str, info: Option<&BaseInfo>, relpath: &str) -> Option<String> {
    let revision = info.map_or(-1, |info| info.revision);
    let author = info.and_then(|info| info.changed.author.as_deref()).unwrap_or("(no author)");
    let date = info.map_or(0, |info| info.changed.date);
    match keyword {
        "Id" => Some(format!("{relpath} {revision} {date} {author}")),
        "Revision" => Some(revision.to_string()),
        "Author" => Some(author.to_string()),
        "Date" => Some(date.to_string()),
        _ => None,
    }
}

/// Replace every `$Keyword$` (unexpanded) or `$Keyword: ...$` (already
/// expanded) marker with `$Keyword: expansion $`.
fn substitute_keyword(line: &str, keyword: &str, expansion: &str) -> String {
    let marker = format!("${keyword}");
    let mut result = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find(marker.as_str()) {
        result.push_str(&rest[..pos]);
        let after_marker = &rest[pos + marker.len()..];
        if let Some(end) = after_marker.find('$') {
            let _ = write!(result, "${keyword}: {expansion} $");
            rest = &after_marker[end + 1..];
        } else {
            result.push_str(&marker);
            rest = after_marker;
        }
    }
    result.push_str(rest);
    result
}

fn remove_file_tolerant(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn set_mtime(path: &Path, unix_seconds: i64) -> Result<()> {
    let time = if unix_seconds >= 0 {
        UNIX_EPOCH + Duration::from_secs(unix_seconds.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_secs(unix_seconds.unsigned_abs())
    };
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(time)?;
    Ok(())
}
