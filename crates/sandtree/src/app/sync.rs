//! Mirrors tree edits into the sandbox file system and walks it back.

use std::sync::Arc;

use crate::app::store::TreeEvent;
use crate::domain::errors::SandboxError;
use crate::domain::model::{Directory, Entry, EntryKind, Tree, strip_nul};
use crate::domain::path;
use crate::infra::sandbox::{DirEntryKind, Sandbox};

/// Sync adapter rooted at the project mount point.
///
/// Mirror calls are best effort: a failure is logged and dropped, and never
/// feeds back into the tree store.
#[derive(Clone)]
pub struct SandboxSync {
    sandbox: Arc<dyn Sandbox>,
    mount_point: String,
}

impl SandboxSync {
    pub fn new(sandbox: Arc<dyn Sandbox>, mount_point: impl Into<String>) -> Self {
        Self {
            sandbox,
            mount_point: mount_point.into(),
        }
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Absolute sandbox path of a tree path.
    pub fn sandbox_path(&self, tree_path: &str) -> String {
        let mount = path::normalize(&self.mount_point);
        format!("/{}", path::join(&mount, tree_path))
    }

    pub async fn mirror_create(&self, tree_path: &str, kind: EntryKind) {
        let target = self.sandbox_path(tree_path);
        let result = match kind {
            EntryKind::Directory => self.sandbox.mkdir(&target, true).await,
            EntryKind::File => self.write_with_parents(tree_path, Vec::new()).await,
        };
        log_failure("create", &target, result);
    }

    pub async fn mirror_write(&self, tree_path: &str, contents: &str) {
        let target = self.sandbox_path(tree_path);
        let result = self
            .sandbox
            .write_file(&target, contents.as_bytes().to_vec())
            .await;
        log_failure("write", &target, result);
    }

    pub async fn mirror_delete(&self, tree_path: &str) {
        let target = self.sandbox_path(tree_path);
        let result = self.sandbox.remove(&target, true).await;
        log_failure("delete", &target, result);
    }

    /// Move `from` to `to` inside the sandbox, so files the store never saw
    /// travel along. When the sandbox has no `from`, `to` is written from the
    /// snapshot instead.
    pub async fn mirror_rename(&self, from: &str, to: &str, snapshot: &Tree) {
        let source = self.sandbox_path(from);
        let target = self.sandbox_path(to);
        let Err(err) = self.sandbox.rename(&source, &target).await else {
            return;
        };
        tracing::debug!(from = %source, to = %target, error = %err, "sandbox rename failed; rewriting");
        let result = match path::resolve(snapshot, to) {
            Ok(entry) => self.write_entry(to, entry).await,
            Err(err) => Err(SandboxError::failed("rename", to, err)),
        };
        log_failure("rename", &target, result);
    }

    /// Translate one store event into the matching mirror call.
    pub async fn apply(&self, event: &TreeEvent, snapshot: &Tree) {
        match event {
            TreeEvent::Created { path, kind } => self.mirror_create(path, *kind).await,
            TreeEvent::Updated { path } => match path::resolve(snapshot, path) {
                Ok(entry) => match entry.as_file() {
                    Some(file) => self.mirror_write(path, &file.contents).await,
                    None => tracing::warn!(%path, "updated entry is not a file; not mirrored"),
                },
                Err(err) => tracing::warn!(%path, error = %err, "updated entry vanished"),
            },
            TreeEvent::Deleted { path } => self.mirror_delete(path).await,
            TreeEvent::Renamed { from, to } => self.mirror_rename(from, to, snapshot).await,
            TreeEvent::Loaded | TreeEvent::Activated { .. } => {}
        }
    }

    /// Replace whatever is mounted with `tree`.
    pub async fn mount(&self, tree: &Tree) -> Result<(), SandboxError> {
        let root = self.sandbox_path("");
        if let Err(err) = self.sandbox.remove(&root, true).await {
            tracing::debug!(path = %root, error = %err, "no previous mount to remove");
        }
        self.sandbox.mkdir(&root, true).await?;
        self.sandbox.mount(tree, &root).await?;
        tracing::info!(path = %root, entries = tree.entry_count(), "tree mounted");
        Ok(())
    }

    /// Walk the mount point into a fresh tree.
    pub async fn snapshot(&self) -> Result<Tree, SandboxError> {
        snapshot_from_sandbox(self.sandbox.as_ref(), &self.sandbox_path("")).await
    }

    async fn write_with_parents(&self, tree_path: &str, bytes: Vec<u8>) -> Result<(), SandboxError> {
        if let Some(parent) = path::parent_of(tree_path) {
            self.sandbox.mkdir(&self.sandbox_path(&parent), true).await?;
        }
        self.sandbox
            .write_file(&self.sandbox_path(tree_path), bytes)
            .await
    }

    async fn write_entry(&self, tree_path: &str, entry: &Entry) -> Result<(), SandboxError> {
        // Directories are written depth-first with an explicit stack.
        let mut pending = vec![(tree_path.to_owned(), entry)];
        while let Some((current, entry)) = pending.pop() {
            match entry {
                Entry::File(file) => {
                    self.write_with_parents(&current, file.contents.as_bytes().to_vec())
                        .await?;
                }
                Entry::Directory(dir) => {
                    self.sandbox.mkdir(&self.sandbox_path(&current), true).await?;
                    for (name, child) in dir.iter().rev() {
                        pending.push((path::join(&current, name), child.as_ref()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn log_failure(op: &str, target: &str, result: Result<(), SandboxError>) {
    if let Err(err) = result {
        tracing::warn!(op, path = %target, error = %err, "sandbox mirror failed");
    }
}

/// Recursively read `root` into a tree.
///
/// File contents have U+0000 stripped. Entries that are neither files nor
/// directories are skipped.
pub async fn snapshot_from_sandbox(sandbox: &dyn Sandbox, root: &str) -> Result<Tree, SandboxError> {
    Ok(Tree::from_root(read_directory(sandbox, root.to_owned()).await?))
}

fn read_directory<'a>(
    sandbox: &'a dyn Sandbox,
    dir: String,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Directory, SandboxError>> + Send + 'a>>
{
    Box::pin(async move {
        let mut out = Directory::new();
        for info in sandbox.read_dir(&dir).await? {
            let child = format!("{}/{}", dir.trim_end_matches('/'), info.name);
            match info.kind {
                DirEntryKind::File => {
                    let text = sandbox.read_file(&child).await?;
                    let clean = strip_nul(&text);
                    if clean.len() != text.len() {
                        tracing::warn!(path = %child, "null characters removed from file contents");
                    }
                    out.insert(info.name, Entry::file(clean.into_owned()));
                }
                DirEntryKind::Directory => {
                    let sub = read_directory(sandbox, child).await?;
                    out.insert(info.name, Entry::Directory(sub));
                }
                DirEntryKind::Other => {
                    tracing::debug!(path = %child, "skipping special file");
                }
            }
        }
        Ok(out)
    })
}
