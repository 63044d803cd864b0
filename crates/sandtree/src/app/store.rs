//! The tree store: canonical in-memory snapshot and its structural edits.
//!
//! Every successful edit publishes a new [`Tree`]. Only the directories on the
//! path from the root to the edited entry are rebuilt; every other subtree is
//! shared with the previous snapshot through its `Arc`, so holders of an older
//! snapshot keep seeing it unchanged.

use std::sync::Arc;

use crate::domain::errors::TreeError;
use crate::domain::model::{Directory, Entry, EntryKind, FileEntry, Tree};
use crate::domain::path::{self, ParentPath};

/// Describes a completed store mutation. Derived state is recomputed from
/// these, once per mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// The whole tree was replaced by a bulk load.
    Loaded,
    Created { path: String, kind: EntryKind },
    Updated { path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },
    Activated { path: Option<String> },
}

/// Owns the current [`Tree`] snapshot and the edit selection.
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    tree: Arc<Tree>,
    active_path: Option<String>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(tree: Tree) -> Self {
        Self {
            tree: Arc::new(tree),
            active_path: None,
        }
    }

    /// Cheap handle on the current snapshot.
    pub fn snapshot(&self) -> Arc<Tree> {
        Arc::clone(&self.tree)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn resolve(&self, path: &str) -> Result<&Arc<Entry>, TreeError> {
        path::resolve(&self.tree, path)
    }

    /// Replace the whole tree (persisted snapshot or sandbox walk). Clears the
    /// edit selection.
    pub fn load(&mut self, tree: Tree) -> TreeEvent {
        self.tree = Arc::new(tree);
        self.active_path = None;
        TreeEvent::Loaded
    }

    /// Create an empty entry named `name` under `parent`.
    ///
    /// Missing intermediate directories of `parent` are created. A name that
    /// already exists under the parent is rejected for files and directories
    /// alike.
    pub fn add_entry(
        &mut self,
        parent: impl Into<ParentPath>,
        name: &str,
        kind: EntryKind,
    ) -> Result<TreeEvent, TreeError> {
        let parent = parent.into();
        path::validate_name(name)?;

        let created = parent.child(name);
        let root = with_inserted(self.tree.root(), "", &parent.segments(), name, kind)?;
        self.tree = Arc::new(Tree::from_root(root));

        tracing::debug!(path = %created, %kind, "entry created");
        Ok(TreeEvent::Created {
            path: created,
            kind,
        })
    }

    /// Replace the contents of the file at `path`.
    pub fn update_file(
        &mut self,
        path: &str,
        contents: impl Into<String>,
    ) -> Result<TreeEvent, TreeError> {
        let full = path::normalize(path);
        let parts = path::segments(&full);
        let Some((name, parents)) = parts.split_last() else {
            return Err(TreeError::not_found(full));
        };

        let contents = contents.into();
        let root = rewrite_parent(self.tree.root(), parents, &full, |dir| {
            match dir.get(name).map(Arc::as_ref) {
                Some(Entry::File(_)) => {}
                Some(Entry::Directory(_)) => {
                    return Err(TreeError::wrong_kind(full.clone(), EntryKind::File));
                }
                None => return Err(TreeError::not_found(full.clone())),
            }
            let mut next = dir.clone();
            next.children_mut()
                .insert((*name).to_owned(), Arc::new(Entry::file(contents)));
            Ok(next)
        })?;
        self.tree = Arc::new(Tree::from_root(root));

        Ok(TreeEvent::Updated { path: full })
    }

    /// Remove the entry at `path` together with its subtree.
    ///
    /// Deleting something that is already gone is tolerated: a warning is
    /// logged, the snapshot is left as is and `None` is returned.
    pub fn delete_entry(&mut self, path: &str) -> Option<TreeEvent> {
        let full = path::normalize(path);
        let parts = path::segments(&full);
        let (name, parents) = parts.split_last()?;

        let result = rewrite_parent(self.tree.root(), parents, &full, |dir| {
            if !dir.contains(name) {
                return Err(TreeError::not_found(full.clone()));
            }
            let mut next = dir.clone();
            next.children_mut().shift_remove(*name);
            Ok(next)
        });

        match result {
            Ok(root) => {
                self.tree = Arc::new(Tree::from_root(root));
                Some(TreeEvent::Deleted { path: full })
            }
            Err(err) => {
                tracing::warn!(path = %full, error = %err, "delete of missing entry ignored");
                None
            }
        }
    }

    /// Rename the entry at `path` in place, keeping its position among its
    /// siblings. The edit selection follows the rename.
    pub fn rename_entry(&mut self, path: &str, new_name: &str) -> Result<TreeEvent, TreeError> {
        path::validate_name(new_name)?;
        let full = path::normalize(path);
        let parts = path::segments(&full);
        let Some((name, parents)) = parts.split_last() else {
            return Err(TreeError::not_found(full));
        };

        let target = match path::parent_of(&full) {
            Some(parent) => path::join(&parent, new_name),
            None => new_name.to_owned(),
        };

        let root = rewrite_parent(self.tree.root(), parents, &full, |dir| {
            if !dir.contains(name) {
                return Err(TreeError::not_found(full.clone()));
            }
            if *name == new_name {
                return Ok(dir.clone());
            }
            if dir.contains(new_name) {
                return Err(TreeError::AlreadyExists {
                    path: target.clone(),
                });
            }
            let children = dir
                .children()
                .iter()
                .map(|(key, entry)| {
                    let key = if key.as_str() == *name {
                        new_name
                    } else {
                        key.as_str()
                    };
                    (key.to_owned(), Arc::clone(entry))
                })
                .collect();
            Ok(Directory::from_children(children))
        })?;
        self.tree = Arc::new(Tree::from_root(root));

        if let Some(active) = self.active_path.as_deref()
            && let Some(rebased) = path::rebase(active, &full, &target)
        {
            self.active_path = Some(rebased);
        }

        Ok(TreeEvent::Renamed {
            from: full,
            to: target,
        })
    }

    /// Set the edit selection. No existence check is made here; readers that
    /// dereference it treat a dangling path as "no active file".
    pub fn set_active(&mut self, target: Option<&str>) -> TreeEvent {
        self.active_path = target.map(path::normalize).filter(|p| !p.is_empty());
        TreeEvent::Activated {
            path: self.active_path.clone(),
        }
    }

    pub fn active_path(&self) -> Option<&str> {
        self.active_path.as_deref()
    }

    /// The active file, if the active path still names a file.
    pub fn active_file(&self) -> Option<&FileEntry> {
        let active = self.active_path.as_deref()?;
        self.resolve(active).ok()?.as_file()
    }
}

/// Rebuild `dir` with `name` inserted below `parents`, creating missing
/// intermediate directories.
fn with_inserted(
    dir: &Directory,
    prefix: &str,
    parents: &[&str],
    name: &str,
    kind: EntryKind,
) -> Result<Directory, TreeError> {
    let Some((head, rest)) = parents.split_first() else {
        if dir.contains(name) {
            return Err(TreeError::AlreadyExists {
                path: path::join(prefix, name),
            });
        }
        let mut next = dir.clone();
        next.insert(name, Entry::empty(kind));
        return Ok(next);
    };

    let here = path::join(prefix, head);
    let child = match dir.get(head).map(Arc::as_ref) {
        Some(Entry::Directory(sub)) => with_inserted(sub, &here, rest, name, kind)?,
        None => with_inserted(&Directory::new(), &here, rest, name, kind)?,
        Some(Entry::File(_)) => return Err(TreeError::wrong_kind(here, EntryKind::Directory)),
    };

    let mut next = dir.clone();
    next.children_mut()
        .insert((*head).to_owned(), Arc::new(Entry::Directory(child)));
    Ok(next)
}

/// Walk existing directories named by `parents`, apply `edit` to the last one
/// and rebuild only the ancestor chain.
fn rewrite_parent<F>(
    dir: &Directory,
    parents: &[&str],
    full: &str,
    edit: F,
) -> Result<Directory, TreeError>
where
    F: FnOnce(&Directory) -> Result<Directory, TreeError>,
{
    let Some((head, rest)) = parents.split_first() else {
        return edit(dir);
    };
    let Some(Entry::Directory(sub)) = dir.get(head).map(Arc::as_ref) else {
        return Err(TreeError::not_found(full));
    };

    let child = rewrite_parent(sub, rest, full, edit)?;
    let mut next = dir.clone();
    next.children_mut()
        .insert((*head).to_owned(), Arc::new(Entry::Directory(child)));
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(store: &TreeStore, path: &str) -> String {
        store
            .resolve(path)
            .unwrap()
            .as_file()
            .unwrap()
            .contents
            .clone()
    }

    #[test]
    fn add_update_delete_scenario() {
        let mut store = TreeStore::new();

        store.add_entry("root", "app.js", EntryKind::File).unwrap();
        store.update_file("/app.js", "console.log(1)").unwrap();
        assert_eq!(contents(&store, "/app.js"), "console.log(1)");

        store.add_entry("root", "src", EntryKind::Directory).unwrap();
        store.add_entry("src", "index.js", EntryKind::File).unwrap();
        assert_eq!(contents(&store, "/src/index.js"), "");

        let event = store.delete_entry("/src").unwrap();
        assert_eq!(event, TreeEvent::Deleted { path: "src".into() });
        assert!(matches!(
            store.resolve("/src/index.js"),
            Err(TreeError::NotFound { .. })
        ));
        assert!(store.resolve("/src").is_err());
    }

    #[test]
    fn add_creates_missing_parents() {
        let mut store = TreeStore::new();
        let event = store
            .add_entry("src/components/ui", "Button.jsx", EntryKind::File)
            .unwrap();
        assert_eq!(
            event,
            TreeEvent::Created {
                path: "src/components/ui/Button.jsx".into(),
                kind: EntryKind::File,
            }
        );
        assert!(
            store
                .resolve("src/components")
                .unwrap()
                .as_directory()
                .is_some()
        );
    }

    #[test]
    fn add_rejects_collisions_for_every_kind() {
        let mut store = TreeStore::new();
        store.add_entry("root", "src", EntryKind::Directory).unwrap();
        store.add_entry("src", "main.js", EntryKind::File).unwrap();
        let before = store.snapshot();

        let err = store.add_entry("root", "src", EntryKind::Directory).unwrap_err();
        assert_eq!(err, TreeError::AlreadyExists { path: "src".into() });
        let err = store.add_entry("root", "src", EntryKind::File).unwrap_err();
        assert_eq!(err, TreeError::AlreadyExists { path: "src".into() });
        let err = store.add_entry("src", "main.js", EntryKind::Directory).unwrap_err();
        assert_eq!(
            err,
            TreeError::AlreadyExists {
                path: "src/main.js".into()
            }
        );

        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn add_through_a_file_is_wrong_kind() {
        let mut store = TreeStore::new();
        store.add_entry("root", "app.js", EntryKind::File).unwrap();
        let err = store.add_entry("app.js", "inner", EntryKind::File).unwrap_err();
        assert_eq!(
            err,
            TreeError::WrongKind {
                path: "app.js".into(),
                expected: EntryKind::Directory,
            }
        );
    }

    #[test]
    fn add_rejects_invalid_names() {
        let mut store = TreeStore::new();
        for name in ["", "  ", ".", "..", "a/b"] {
            assert!(matches!(
                store.add_entry("root", name, EntryKind::File),
                Err(TreeError::InvalidName { .. })
            ));
        }
        assert!(store.tree().is_empty());
    }

    #[test]
    fn update_reports_missing_and_directories() {
        let mut store = TreeStore::new();
        store.add_entry("root", "src", EntryKind::Directory).unwrap();

        assert_eq!(
            store.update_file("src", "x").unwrap_err(),
            TreeError::WrongKind {
                path: "src".into(),
                expected: EntryKind::File,
            }
        );
        assert_eq!(
            store.update_file("src/missing.js", "x").unwrap_err(),
            TreeError::NotFound {
                path: "src/missing.js".into()
            }
        );
        assert!(store.update_file("nope/missing.js", "x").is_err());
    }

    #[test]
    fn update_shares_untouched_subtrees() {
        let mut store = TreeStore::new();
        store.add_entry("src", "main.js", EntryKind::File).unwrap();
        store.add_entry("src", "util.js", EntryKind::File).unwrap();
        store.add_entry("public", "favicon.svg", EntryKind::File).unwrap();
        store.add_entry("root", "README.md", EntryKind::File).unwrap();

        let before = store.snapshot();
        store.update_file("src/main.js", "export {}").unwrap();
        let after = store.snapshot();

        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(
            before.root().get("public").unwrap(),
            after.root().get("public").unwrap()
        ));
        assert!(Arc::ptr_eq(
            before.root().get("README.md").unwrap(),
            after.root().get("README.md").unwrap()
        ));
        let old_src = before.root().get("src").unwrap().as_directory().unwrap();
        let new_src = after.root().get("src").unwrap().as_directory().unwrap();
        assert!(Arc::ptr_eq(
            old_src.get("util.js").unwrap(),
            new_src.get("util.js").unwrap()
        ));

        // The previous snapshot is unchanged.
        let old_main = old_src.get("main.js").unwrap().as_file().unwrap();
        assert_eq!(old_main.contents, "");
        assert_eq!(contents(&store, "src/main.js"), "export {}");
    }

    #[test]
    fn delete_missing_is_a_noop() {
        let mut store = TreeStore::new();
        store.add_entry("root", "app.js", EntryKind::File).unwrap();
        let before = store.snapshot();

        assert!(store.delete_entry("ghost.js").is_none());
        assert!(store.delete_entry("app.js/inner").is_none());
        assert!(store.delete_entry("").is_none());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn delete_keeps_sibling_order() {
        let mut store = TreeStore::new();
        for name in ["a.js", "b.js", "c.js"] {
            store.add_entry("root", name, EntryKind::File).unwrap();
        }
        store.delete_entry("b.js");
        let names: Vec<_> = store.tree().root().iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a.js", "c.js"]);
    }

    #[test]
    fn rename_keeps_position_and_moves_selection() {
        let mut store = TreeStore::new();
        store.add_entry("root", "index.html", EntryKind::File).unwrap();
        store.add_entry("src", "main.js", EntryKind::File).unwrap();
        store.add_entry("root", "package.json", EntryKind::File).unwrap();
        store.set_active(Some("src/main.js"));

        let event = store.rename_entry("src", "lib").unwrap();
        assert_eq!(
            event,
            TreeEvent::Renamed {
                from: "src".into(),
                to: "lib".into(),
            }
        );
        let names: Vec<_> = store.tree().root().iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["index.html", "lib", "package.json"]);
        assert_eq!(store.active_path(), Some("lib/main.js"));
        assert!(store.active_file().is_some());
    }

    #[test]
    fn rename_rejects_collisions() {
        let mut store = TreeStore::new();
        store.add_entry("root", "a.js", EntryKind::File).unwrap();
        store.add_entry("root", "b.js", EntryKind::File).unwrap();
        assert_eq!(
            store.rename_entry("a.js", "b.js").unwrap_err(),
            TreeError::AlreadyExists { path: "b.js".into() }
        );
        assert!(matches!(
            store.rename_entry("ghost.js", "c.js"),
            Err(TreeError::NotFound { .. })
        ));
    }

    #[test]
    fn dangling_active_path_reads_as_none() {
        let mut store = TreeStore::new();
        store.add_entry("root", "src", EntryKind::Directory).unwrap();

        store.set_active(Some("ghost.js"));
        assert_eq!(store.active_path(), Some("ghost.js"));
        assert!(store.active_file().is_none());

        store.set_active(Some("src"));
        assert!(store.active_file().is_none());

        store.set_active(None);
        assert_eq!(store.active_path(), None);
    }

    #[test]
    fn load_replaces_tree_and_clears_selection() {
        let mut store = TreeStore::new();
        store.add_entry("root", "a.js", EntryKind::File).unwrap();
        store.set_active(Some("a.js"));

        let tree = Tree::from_root(Directory::new().with_file("b.js", "b"));
        assert_eq!(store.load(tree), TreeEvent::Loaded);
        assert_eq!(store.active_path(), None);
        assert_eq!(contents(&store, "b.js"), "b");
    }
}
