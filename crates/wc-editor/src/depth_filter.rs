// SPDX-License-Identifier: Apache-2.0
//! The ambient-depth filter: wraps an inner [`DeltaEditor`] and drops
//! calls for paths the working copy has excluded or that lie beyond a
//! directory's recorded depth, so a server unaware of local depth
//! restrictions can still drive a full update.

use std::collections::HashMap;
use std::path::Path;

use wc_db::{Depth, Presence, Store};

use crate::editor::{DeltaEditor, DirToken, FileToken, NoopWindowHandler, WindowHandler};
use crate::{EditorError, Result};

fn depth_rank(depth: Depth) -> u8 {
    match depth {
        Depth::Empty => 0,
        Depth::Files => 1,
        Depth::Immediates => 2,
        Depth::Infinity => 3,
        Depth::Exclude => 4,
        Depth::Unknown => 5,
    }
}

fn presence_hidden(presence: Presence) -> bool {
    matches!(presence, Presence::Absent | Presence::NotPresent | Presence::Excluded)
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[derive(Clone, Debug)]
struct DirState {
    relpath: String,
    ambient_depth: Depth,
    ambiently_excluded: bool,
    inner: Option<DirToken>,
}

#[derive(Clone, Copy)]
struct FileState {
    ambiently_excluded: bool,
    inner: Option<FileToken>,
}

/// Wraps an inner delta editor, filtering out calls that fall below a
/// directory's ambient depth or inside an administratively excluded
/// subtree.
///
/// Construct one per editor drive. `anchor` is the wcroot-relative
/// directory the drive is rooted at; `target` is the single path segment
/// under `anchor` the drive is actually updating, or empty when the
/// anchor itself is fully targeted.
pub struct DepthFilterEditor<'a> {
    inner: &'a mut dyn DeltaEditor,
    store: &'a Store,
    anchor: String,
    target: String,
    next_token: u64,
    dirs: HashMap<DirToken, DirState>,
    files: HashMap<FileToken, FileState>,
}

impl<'a> DepthFilterEditor<'a> {
    /// Wrap `inner`, consulting `store` for ambient depth and presence.
    #[must_use]
    pub fn new(inner: &'a mut dyn DeltaEditor, store: &'a Store, anchor: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            inner,
            store,
            anchor: anchor.into(),
            target: target.into(),
            next_token: 0,
            dirs: HashMap::new(),
            files: HashMap::new(),
        }
    }

    fn alloc_dir_token(&mut self) -> DirToken {
        let token = DirToken(self.next_token);
        self.next_token += 1;
        token
    }

    fn alloc_file_token(&mut self) -> FileToken {
        let token = FileToken(self.next_token);
        self.next_token += 1;
        token
    }

    fn dir_state(&self, token: DirToken) -> Result<DirState> {
        self.dirs.get(&token).cloned().ok_or(EditorError::UnknownBaton)
    }

    fn file_state(&self, token: FileToken) -> Result<FileState> {
        self.files.get(&token).copied().ok_or(EditorError::UnknownBaton)
    }

    fn target_relpath(&self) -> String {
        if self.target.is_empty() {
            self.anchor.clone()
        } else {
            join(&self.anchor, &self.target)
        }
    }

    /// Insert an excluded child baton. Per the baton-reuse optimization, no
    /// metadata is consulted: an excluded parent's children are excluded
    /// unconditionally, so the only state a child baton needs is the flag
    /// itself and the (dead) relpath for diagnostics.
    fn excluded_dir(&mut self, relpath: String) -> DirToken {
        let token = self.alloc_dir_token();
        self.dirs.insert(
            token,
            DirState {
                relpath,
                ambient_depth: Depth::Exclude,
                ambiently_excluded: true,
                inner: None,
            },
        );
        token
    }

    fn excluded_file(&mut self) -> FileToken {
        let token = self.alloc_file_token();
        self.files.insert(token, FileState { ambiently_excluded: true, inner: None });
        token
    }
}

impl DeltaEditor for DepthFilterEditor<'_> {
    fn set_target_revision(&mut self, revision: i64) -> Result<()> {
        self.inner.set_target_revision(revision)
    }

    fn open_root(&mut self, base_revision: i64) -> Result<DirToken> {
        let ambient_depth = if self.target.is_empty() {
            self.store.base_get_info(Path::new(&self.anchor)).map_or(Depth::Unknown, |info| info.depth)
        } else {
            Depth::Unknown
        };
        let inner = self.inner.open_root(base_revision)?;
        let token = self.alloc_dir_token();
        self.dirs.insert(
            token,
            DirState {
                relpath: self.anchor.clone(),
                ambient_depth,
                ambiently_excluded: false,
                inner: Some(inner),
            },
        );
        Ok(token)
    }

    fn delete_entry(&mut self, path: &str, revision: i64, parent: DirToken) -> Result<()> {
        let pdir = self.dir_state(parent)?;
        if pdir.ambiently_excluded {
            return Ok(());
        }
        if depth_rank(pdir.ambient_depth) < depth_rank(Depth::Immediates) {
            let child_relpath = join(&pdir.relpath, path);
            let hidden = match self.store.base_get_info(Path::new(&child_relpath)) {
                Ok(info) => presence_hidden(info.presence),
                Err(_) => true,
            };
            if hidden {
                return Ok(());
            }
        }
        let Some(inner_parent) = pdir.inner else {
            return Ok(());
        };
        self.inner.delete_entry(path, revision, inner_parent)
    }

    fn add_directory(&mut self, path: &str, parent: DirToken, copyfrom: Option<(&str, i64)>) -> Result<DirToken> {
        let pdir = self.dir_state(parent)?;
        let child_relpath = join(&pdir.relpath, path);
        if pdir.ambiently_excluded {
            return Ok(self.excluded_dir(child_relpath));
        }

        let target_relpath = self.target_relpath();
        let is_target = !self.target.is_empty() && child_relpath == target_relpath;
        let child_depth = if is_target {
            Depth::Infinity
        } else if depth_rank(pdir.ambient_depth) < depth_rank(Depth::Immediates) {
            // `empty`/`files` record no directory children at all; a
            // directory appearing here isn't part of the ambient tree
            // unless it's the explicit edit target handled above.
            return Ok(self.excluded_dir(child_relpath));
        } else if pdir.ambient_depth == Depth::Immediates {
            Depth::Empty
        } else {
            Depth::Infinity
        };

        let Some(inner_parent) = pdir.inner else {
            return Err(EditorError::UnknownBaton);
        };
        let inner_token = self.inner.add_directory(path, inner_parent, copyfrom)?;
        let token = self.alloc_dir_token();
        self.dirs.insert(
            token,
            DirState {
                relpath: child_relpath,
                ambient_depth: child_depth,
                ambiently_excluded: false,
                inner: Some(inner_token),
            },
        );
        Ok(token)
    }

    fn open_directory(&mut self, path: &str, parent: DirToken, base_revision: i64) -> Result<DirToken> {
        let pdir = self.dir_state(parent)?;
        let child_relpath = join(&pdir.relpath, path);
        if pdir.ambiently_excluded {
            return Ok(self.excluded_dir(child_relpath));
        }

        let (depth, hidden) = match self.store.base_get_info(Path::new(&child_relpath)) {
            Ok(info) => (info.depth, presence_hidden(info.presence)),
            Err(_) => (Depth::Unknown, true),
        };
        if hidden {
            return Ok(self.excluded_dir(child_relpath));
        }

        let Some(inner_parent) = pdir.inner else {
            return Err(EditorError::UnknownBaton);
        };
        let inner_token = self.inner.open_directory(path, inner_parent, base_revision)?;
        let token = self.alloc_dir_token();
        self.dirs.insert(
            token,
            DirState {
                relpath: child_relpath,
                ambient_depth: depth,
                ambiently_excluded: false,
                inner: Some(inner_token),
            },
        );
        Ok(token)
    }

    fn change_dir_prop(&mut self, dir: DirToken, name: &str, value: Option<&[u8]>) -> Result<()> {
        let d = self.dir_state(dir)?;
        if d.ambiently_excluded {
            return Ok(());
        }
        self.inner.change_dir_prop(d.inner.ok_or(EditorError::UnknownBaton)?, name, value)
    }

    fn close_directory(&mut self, dir: DirToken) -> Result<()> {
        let d = self.dirs.remove(&dir).ok_or(EditorError::UnknownBaton)?;
        if d.ambiently_excluded {
            return Ok(());
        }
        self.inner.close_directory(d.inner.ok_or(EditorError::UnknownBaton)?)
    }

    fn absent_directory(&mut self, path: &str, parent: DirToken) -> Result<()> {
        let pdir = self.dir_state(parent)?;
        if pdir.ambiently_excluded {
            return Ok(());
        }
        self.inner.absent_directory(path, pdir.inner.ok_or(EditorError::UnknownBaton)?)
    }

    fn add_file(&mut self, path: &str, parent: DirToken, copyfrom: Option<(&str, i64)>) -> Result<FileToken> {
        let pdir = self.dir_state(parent)?;
        let child_relpath = join(&pdir.relpath, path);
        let excluded = pdir.ambiently_excluded
            || (pdir.ambient_depth == Depth::Empty && self.store.base_get_info(Path::new(&child_relpath)).is_err());
        if excluded {
            return Ok(self.excluded_file());
        }

        let inner_token = self.inner.add_file(path, pdir.inner.ok_or(EditorError::UnknownBaton)?, copyfrom)?;
        let token = self.alloc_file_token();
        self.files.insert(token, FileState { ambiently_excluded: false, inner: Some(inner_token) });
        Ok(token)
    }

    fn open_file(&mut self, path: &str, parent: DirToken, base_revision: i64) -> Result<FileToken> {
        let pdir = self.dir_state(parent)?;
        let child_relpath = join(&pdir.relpath, path);
        let excluded = pdir.ambiently_excluded
            || (pdir.ambient_depth == Depth::Empty && self.store.base_get_info(Path::new(&child_relpath)).is_err());
        if excluded {
            return Ok(self.excluded_file());
        }

        let inner_token = self.inner.open_file(path, pdir.inner.ok_or(EditorError::UnknownBaton)?, base_revision)?;
        let token = self.alloc_file_token();
        self.files.insert(token, FileState { ambiently_excluded: false, inner: Some(inner_token) });
        Ok(token)
    }

    fn apply_textdelta(&mut self, file: FileToken, base_checksum: Option<&str>) -> Result<Box<dyn WindowHandler + '_>> {
        let f = self.file_state(file)?;
        if f.ambiently_excluded {
            return Ok(Box::new(NoopWindowHandler));
        }
        self.inner.apply_textdelta(f.inner.ok_or(EditorError::UnknownBaton)?, base_checksum)
    }

    fn change_file_prop(&mut self, file: FileToken, name: &str, value: Option<&[u8]>) -> Result<()> {
        let f = self.file_state(file)?;
        if f.ambiently_excluded {
            return Ok(());
        }
        self.inner.change_file_prop(f.inner.ok_or(EditorError::UnknownBaton)?, name, value)
    }

    fn close_file(&mut self, file: FileToken, text_checksum: Option<&str>) -> Result<()> {
        let f = self.files.remove(&file).ok_or(EditorError::UnknownBaton)?;
        if f.ambiently_excluded {
            return Ok(());
        }
        self.inner.close_file(f.inner.ok_or(EditorError::UnknownBaton)?, text_checksum)
    }

    fn absent_file(&mut self, path: &str, parent: DirToken) -> Result<()> {
        let pdir = self.dir_state(parent)?;
        if pdir.ambiently_excluded {
            return Ok(());
        }
        self.inner.absent_file(path, pdir.inner.ok_or(EditorError::UnknownBaton)?)
    }

    fn close_edit(&mut self) -> Result<()> {
        self.inner.close_edit()
    }

    fn abort_edit(&mut self) -> Result<()> {
        self.inner.abort_edit()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;

    use wc_db::{BaseNodeSpec, ChangeInfo, Depth, Props, ReposIdentity, Store};

    use super::*;

    /// Records every call it receives, in order, as a plain string log —
    /// enough to assert forwarding/dropping behavior without a real
    /// consumer.
    #[derive(Default)]
    struct RecordingEditor {
        calls: RefCell<Vec<String>>,
        next: RefCell<u64>,
    }

    impl RecordingEditor {
        fn log(&self, call: impl Into<String>) {
            self.calls.borrow_mut().push(call.into());
        }

        fn fresh_dir(&self) -> DirToken {
            let mut next = self.next.borrow_mut();
            let token = DirToken(*next);
            *next += 1;
            token
        }

        fn fresh_file(&self) -> FileToken {
            let mut next = self.next.borrow_mut();
            let token = FileToken(*next);
            *next += 1;
            token
        }
    }

    struct WindowRecorder<'a>(&'a RecordingEditor);

    impl WindowHandler for WindowRecorder<'_> {
        fn apply_window(&mut self, window: Option<&[u8]>) -> Result<()> {
            self.0.log(format!("apply_window({})", window.is_some()));
            Ok(())
        }
    }

    impl DeltaEditor for RecordingEditor {
        fn set_target_revision(&mut self, revision: i64) -> Result<()> {
            self.log(format!("set_target_revision({revision})"));
            Ok(())
        }

        fn open_root(&mut self, _base_revision: i64) -> Result<DirToken> {
            self.log("open_root");
            Ok(self.fresh_dir())
        }

        fn delete_entry(&mut self, path: &str, _revision: i64, _parent: DirToken) -> Result<()> {
            self.log(format!("delete_entry({path})"));
            Ok(())
        }

        fn add_directory(&mut self, path: &str, _parent: DirToken, _copyfrom: Option<(&str, i64)>) -> Result<DirToken> {
            self.log(format!("add_directory({path})"));
            Ok(self.fresh_dir())
        }

        fn open_directory(&mut self, path: &str, _parent: DirToken, _base_revision: i64) -> Result<DirToken> {
            self.log(format!("open_directory({path})"));
            Ok(self.fresh_dir())
        }

        fn change_dir_prop(&mut self, _dir: DirToken, name: &str, _value: Option<&[u8]>) -> Result<()> {
            self.log(format!("change_dir_prop({name})"));
            Ok(())
        }

        fn close_directory(&mut self, _dir: DirToken) -> Result<()> {
            self.log("close_directory");
            Ok(())
        }

        fn absent_directory(&mut self, path: &str, _parent: DirToken) -> Result<()> {
            self.log(format!("absent_directory({path})"));
            Ok(())
        }

        fn add_file(&mut self, path: &str, _parent: DirToken, _copyfrom: Option<(&str, i64)>) -> Result<FileToken> {
            self.log(format!("add_file({path})"));
            Ok(self.fresh_file())
        }

        fn open_file(&mut self, path: &str, _parent: DirToken, _base_revision: i64) -> Result<FileToken> {
            self.log(format!("open_file({path})"));
            Ok(self.fresh_file())
        }

        fn apply_textdelta(&mut self, _file: FileToken, _base_checksum: Option<&str>) -> Result<Box<dyn WindowHandler + '_>> {
            self.log("apply_textdelta");
            Ok(Box::new(WindowRecorder(self)))
        }

        fn change_file_prop(&mut self, _file: FileToken, name: &str, _value: Option<&[u8]>) -> Result<()> {
            self.log(format!("change_file_prop({name})"));
            Ok(())
        }

        fn close_file(&mut self, _file: FileToken, _text_checksum: Option<&str>) -> Result<()> {
            self.log("close_file");
            Ok(())
        }

        fn absent_file(&mut self, path: &str, _parent: DirToken) -> Result<()> {
            self.log(format!("absent_file({path})"));
            Ok(())
        }

        fn close_edit(&mut self) -> Result<()> {
            self.log("close_edit");
            Ok(())
        }

        fn abort_edit(&mut self) -> Result<()> {
            self.log("abort_edit");
            Ok(())
        }
    }

    fn repos() -> ReposIdentity {
        ReposIdentity { root_url: "https://example.invalid/repo".to_string(), uuid: "11111111-1111-1111-1111-111111111111".to_string() }
    }

    fn spec(relpath: &str) -> BaseNodeSpec {
        BaseNodeSpec {
            revision: 5,
            repos: repos(),
            repos_relpath: relpath.to_string(),
            changed: ChangeInfo { rev: 5, date: 1_700_000_000_000, author: Some("alice".to_string()) },
        }
    }

    #[test]
    fn depth_empty_root_forwards_only_open_root_and_close_edit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.base_add_directory(Path::new("R"), spec("trunk/R"), Depth::Empty, &Props::new(), &[]).unwrap();

        let mut recorder = RecordingEditor::default();
        let mut filter = DepthFilterEditor::new(&mut recorder, &store, "R", "");

        let root = filter.open_root(5).unwrap();
        let sub = filter.add_directory("sub", root, None).unwrap();
        let file = filter.add_file("f", sub, None).unwrap();
        let mut handler = filter.apply_textdelta(file, None).unwrap();
        handler.apply_window(Some(b"data")).unwrap();
        handler.apply_window(None).unwrap();
        drop(handler);
        filter.change_file_prop(file, "svn:eol-style", None).unwrap();
        filter.close_file(file, None).unwrap();
        filter.close_directory(sub).unwrap();
        filter.close_edit().unwrap();

        assert_eq!(*recorder.calls.borrow(), vec!["open_root".to_string(), "close_edit".to_string()]);
    }

    #[test]
    fn add_directory_at_target_gets_infinity_under_files_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.base_add_directory(Path::new("A"), spec("trunk/A"), Depth::Files, &Props::new(), &[]).unwrap();

        let mut recorder = RecordingEditor::default();
        let mut filter = DepthFilterEditor::new(&mut recorder, &store, "A", "T");

        let root = filter.open_root(5).unwrap();
        let target_dir = filter.add_directory("T", root, None).unwrap();
        let grandchild = filter.add_directory("T/inner", target_dir, None).unwrap();
        filter.close_directory(grandchild).unwrap();
        filter.close_directory(target_dir).unwrap();

        assert_eq!(
            *recorder.calls.borrow(),
            vec![
                "open_root".to_string(),
                "add_directory(T)".to_string(),
                "add_directory(T/inner)".to_string(),
                "close_directory".to_string(),
                "close_directory".to_string(),
            ]
        );
    }

    #[test]
    fn excluded_subtree_swallows_every_descendant_call() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.base_add_directory(Path::new("R"), spec("trunk/R"), Depth::Infinity, &Props::new(), &[]).unwrap();
        store
            .base_add_absent_node(Path::new("R/hidden"), spec("trunk/R/hidden"), wc_db::Kind::Dir, wc_db::Presence::Excluded)
            .unwrap();

        let mut recorder = RecordingEditor::default();
        let mut filter = DepthFilterEditor::new(&mut recorder, &store, "R", "");

        let root = filter.open_root(5).unwrap();
        let hidden = filter.open_directory("hidden", root, 5).unwrap();
        let child = filter.add_directory("hidden/nested", hidden, None).unwrap();
        let file = filter.add_file("hidden/nested/f", child, None).unwrap();
        let mut handler = filter.apply_textdelta(file, None).unwrap();
        handler.apply_window(Some(b"ignored")).unwrap();
        drop(handler);
        filter.change_file_prop(file, "prop", Some(b"v")).unwrap();
        filter.close_file(file, None).unwrap();
        filter.close_directory(child).unwrap();
        filter.close_directory(hidden).unwrap();
        filter.close_edit().unwrap();

        assert_eq!(*recorder.calls.borrow(), vec!["open_root".to_string(), "close_edit".to_string()]);
    }

    #[test]
    fn empty_depth_parent_excludes_unrecorded_file_but_admits_recorded_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.base_add_directory(Path::new("R"), spec("trunk/R"), Depth::Empty, &Props::new(), &[]).unwrap();
        store.base_add_file(Path::new("R/known.txt"), spec("trunk/R/known.txt"), "hash", None, &Props::new(), &[]).unwrap();

        let mut recorder = RecordingEditor::default();
        let mut filter = DepthFilterEditor::new(&mut recorder, &store, "R", "");

        let root = filter.open_root(5).unwrap();
        let known = filter.open_file("known.txt", root, 5).unwrap();
        filter.close_file(known, None).unwrap();
        let unknown = filter.add_file("new.txt", root, None).unwrap();
        filter.close_file(unknown, None).unwrap();

        assert_eq!(
            *recorder.calls.borrow(),
            vec!["open_root".to_string(), "open_file(known.txt)".to_string(), "close_file".to_string()]
        );
    }

    #[test]
    fn delete_entry_below_immediates_drops_unknown_node_but_forwards_known_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.base_add_directory(Path::new("R"), spec("trunk/R"), Depth::Files, &Props::new(), &[]).unwrap();
        store.base_add_file(Path::new("R/known.txt"), spec("trunk/R/known.txt"), "hash", None, &Props::new(), &[]).unwrap();

        let mut recorder = RecordingEditor::default();
        let mut filter = DepthFilterEditor::new(&mut recorder, &store, "R", "");

        let root = filter.open_root(5).unwrap();
        filter.delete_entry("gone.txt", 4, root).unwrap();
        filter.delete_entry("known.txt", 4, root).unwrap();

        assert_eq!(*recorder.calls.borrow(), vec!["open_root".to_string(), "delete_entry(known.txt)".to_string()]);
    }

    #[test]
    fn unknown_token_is_reported_rather_than_silently_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut recorder = RecordingEditor::default();
        let filter = DepthFilterEditor::new(&mut recorder, &store, "", "");
        let err = filter.dir_state(DirToken(999)).unwrap_err();
        assert!(matches!(err, EditorError::UnknownBaton));
    }
}
