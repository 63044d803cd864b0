//! Editing session: the tree store plus everything derived from it.
//!
//! Each user action goes through the store first. The resulting event then
//! updates the tabs and the explorer, and is queued for the sandbox mirror.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::app::explorer::{ExplorerRow, ExplorerState};
use crate::app::store::{TreeEvent, TreeStore};
use crate::app::sync::SandboxSync;
use crate::app::tabs::{Reassign, TabsController};
use crate::domain::errors::TreeError;
use crate::domain::model::{Entry, EntryKind, Tree};
use crate::domain::path;
use crate::infra::templates::{TemplateRecord, TemplateStore};

/// Installed dependencies are reproducible from the manifest and never saved.
const DEPENDENCY_DIR: &str = "node_modules";

/// Work serialized on the mirror worker.
enum MirrorCommand {
    Apply(TreeEvent, Arc<Tree>),
    Flush(oneshot::Sender<()>),
}

/// Sync adapter plus the worker applying queued events in order.
struct MirrorQueue {
    sync: SandboxSync,
    tx: mpsc::UnboundedSender<MirrorCommand>,
    worker: JoinHandle<()>,
}

impl MirrorQueue {
    fn start(sync: SandboxSync) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .context("attaching a sandbox requires a tokio runtime")?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker_sync = sync.clone();
        let worker = handle.spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    MirrorCommand::Apply(event, snapshot) => {
                        worker_sync.apply(&event, &snapshot).await;
                    }
                    MirrorCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Ok(Self { sync, tx, worker })
    }
}

pub struct Workspace {
    store: TreeStore,
    tabs: TabsController,
    explorer: ExplorerState,
    templates: Arc<dyn TemplateStore>,
    template: Option<TemplateRecord>,
    mirror: Option<MirrorQueue>,
}

impl Workspace {
    pub fn new(templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            store: TreeStore::new(),
            tabs: TabsController::new(),
            explorer: ExplorerState::new(),
            templates,
            template: None,
            mirror: None,
        }
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn tree(&self) -> &Tree {
        self.store.tree()
    }

    pub fn tabs(&self) -> &TabsController {
        &self.tabs
    }

    pub fn explorer(&self) -> &ExplorerState {
        &self.explorer
    }

    pub fn template(&self) -> Option<&TemplateRecord> {
        self.template.as_ref()
    }

    pub fn active_path(&self) -> Option<&str> {
        self.store.active_path()
    }

    pub fn visible_rows(&self) -> Vec<ExplorerRow> {
        self.explorer.visible_rows(self.store.tree())
    }

    /// Create an entry inside the explorer's active directory.
    pub fn create(&mut self, name: &str, kind: EntryKind) -> Result<String, TreeError> {
        let event = self
            .store
            .add_entry(self.explorer.insertion_parent(), name, kind)?;
        let created = match &event {
            TreeEvent::Created { path, .. } => path.clone(),
            _ => path::normalize(name),
        };
        self.dispatch(event);
        Ok(created)
    }

    /// Click on an entry: directories become the insertion target and toggle,
    /// files become the active tab.
    pub fn open(&mut self, target: &str) -> Result<(), TreeError> {
        let is_directory = matches!(self.store.resolve(target)?.as_ref(), Entry::Directory(_));
        if is_directory {
            self.explorer.select_directory(target);
            return Ok(());
        }
        self.explorer.select_file();
        let event = self.store.set_active(Some(target));
        self.dispatch(event);
        Ok(())
    }

    pub fn select_directory(&mut self, dir: &str) -> Result<(), TreeError> {
        match self.store.resolve(dir)?.as_ref() {
            Entry::Directory(_) => {
                self.explorer.select_directory(dir);
                Ok(())
            }
            Entry::File(_) => Err(TreeError::wrong_kind(
                path::normalize(dir),
                EntryKind::Directory,
            )),
        }
    }

    pub fn close_tab(&mut self, target: &str) {
        if let Some(reassign) = self.tabs.close(target) {
            self.reassign(reassign);
        }
    }

    /// Replace the contents of the active file. Returns `false` when no file
    /// is active.
    pub fn edit_active(&mut self, contents: &str) -> Result<bool, TreeError> {
        let Some(active) = self.store.active_path().map(str::to_owned) else {
            return Ok(false);
        };
        if self.store.active_file().is_none() {
            return Ok(false);
        }
        self.update_file(&active, contents)?;
        Ok(true)
    }

    pub fn update_file(&mut self, target: &str, contents: &str) -> Result<(), TreeError> {
        let event = self.store.update_file(target, contents)?;
        self.dispatch(event);
        Ok(())
    }

    /// Delete `target` and its subtree. Returns `false` when it did not exist.
    pub fn delete(&mut self, target: &str) -> bool {
        let Some(event) = self.store.delete_entry(target) else {
            return false;
        };
        self.dispatch(event);
        true
    }

    pub fn rename(&mut self, target: &str, new_name: &str) -> Result<String, TreeError> {
        let event = self.store.rename_entry(target, new_name)?;
        let renamed = match &event {
            TreeEvent::Renamed { from, to } if from == to => return Ok(to.clone()),
            TreeEvent::Renamed { to, .. } => to.clone(),
            _ => path::normalize(target),
        };
        self.dispatch(event);
        Ok(renamed)
    }

    /// Replace the tree wholesale, e.g. after walking the sandbox.
    pub fn load_tree(&mut self, tree: Tree) {
        let event = self.store.load(tree);
        self.dispatch(event);
    }

    /// Fetch a template and make its tree the session tree.
    pub async fn load(&mut self, id: &str) -> Result<&TemplateRecord> {
        let record = self
            .templates
            .fetch(id)
            .await
            .with_context(|| format!("failed to load template {id}"))?;
        self.load_tree(record.materialize());
        if !record.kind.is_tree() {
            let entry = record.kind.entry_file();
            if let Err(err) = self.open(entry) {
                tracing::warn!(%entry, error = %err, "entry file missing from template");
            }
        }
        tracing::info!(id = %record.id, kind = %record.kind, "template loaded");
        Ok(self.template.insert(record))
    }

    /// Persist the session into its template.
    ///
    /// Tree templates are re-read from the sandbox when one is attached, so
    /// files written by processes (installs, generators) are captured too.
    pub async fn save(&mut self) -> Result<&TemplateRecord> {
        let kind = self
            .template
            .as_ref()
            .map(|record| record.kind)
            .ok_or_else(|| anyhow!("no template loaded"))?;

        let mut content = None;
        let mut tree = None;
        if kind.is_tree() {
            tree = Some(without_dependencies(self.saved_tree().await));
        } else {
            content = self.entry_file_contents(kind.entry_file());
        }

        let record = self
            .template
            .as_mut()
            .ok_or_else(|| anyhow!("no template loaded"))?;
        if tree.is_some() {
            record.file_system_tree = tree;
        }
        if content.is_some() {
            record.content = content;
        }
        record.touch();
        self.templates
            .upsert(record)
            .await
            .with_context(|| format!("failed to save template {}", record.id))?;
        tracing::info!(id = %record.id, "template saved");
        Ok(record)
    }

    /// Start mirroring edits into the sandbox behind `sync`.
    pub fn attach_sandbox(&mut self, sync: SandboxSync) -> Result<()> {
        if self.mirror.is_some() {
            tracing::warn!("replacing the attached sandbox");
        }
        self.mirror = Some(MirrorQueue::start(sync)?);
        Ok(())
    }

    /// Stop mirroring once every queued event has been applied.
    pub async fn detach_sandbox(&mut self) -> Option<SandboxSync> {
        let MirrorQueue { sync, tx, worker } = self.mirror.take()?;
        drop(tx);
        if let Err(err) = worker.await {
            tracing::warn!(error = %err, "mirror worker ended abnormally");
        }
        Some(sync)
    }

    pub fn sync(&self) -> Option<&SandboxSync> {
        self.mirror.as_ref().map(|mirror| &mirror.sync)
    }

    /// Wait until every event queued so far has reached the sandbox.
    pub async fn flush_mirrors(&self) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if mirror.tx.send(MirrorCommand::Flush(done)).is_err() {
            return;
        }
        let _ = wait.await;
    }

    fn dispatch(&mut self, event: TreeEvent) {
        let snapshot = self.store.snapshot();
        self.explorer.apply(&event, &snapshot);
        let reassign = self.tabs.apply(&event, &snapshot);

        if let TreeEvent::Deleted { path: removed } = &event {
            let dangling = self
                .store
                .active_path()
                .is_some_and(|active| path::is_within(active, removed));
            if dangling && reassign.is_none() {
                self.store.set_active(None);
            }
        }

        self.enqueue(event, snapshot);
        if let Some(reassign) = reassign {
            self.reassign(reassign);
        }
    }

    fn reassign(&mut self, reassign: Reassign) {
        let event = self.store.set_active(reassign.path.as_deref());
        let snapshot = self.store.snapshot();
        self.tabs.apply(&event, &snapshot);
    }

    fn enqueue(&self, event: TreeEvent, snapshot: Arc<Tree>) {
        if matches!(event, TreeEvent::Activated { .. } | TreeEvent::Loaded) {
            return;
        }
        let Some(mirror) = &self.mirror else {
            tracing::trace!(?event, "no sandbox attached; edit not mirrored");
            return;
        };
        if mirror.tx.send(MirrorCommand::Apply(event, snapshot)).is_err() {
            tracing::warn!("mirror worker stopped; edit not mirrored");
        }
    }

    async fn saved_tree(&self) -> Tree {
        let Some(mirror) = &self.mirror else {
            return self.store.tree().clone();
        };
        self.flush_mirrors().await;
        match mirror.sync.snapshot().await {
            Ok(tree) => tree,
            Err(err) => {
                tracing::warn!(error = %err, "sandbox walk failed; saving the in-memory tree");
                self.store.tree().clone()
            }
        }
    }

    /// Only the entry file is persisted for single-file templates; other
    /// files created in the session are scratch.
    fn entry_file_contents(&self, entry_file: &str) -> Option<String> {
        match self.store.resolve(entry_file).map(|entry| entry.as_file()) {
            Ok(Some(file)) => Some(file.contents.clone()),
            _ => {
                tracing::warn!(%entry_file, "entry file missing; keeping saved contents");
                None
            }
        }
    }
}

fn without_dependencies(tree: Tree) -> Tree {
    let mut root = tree.into_root();
    root.children_mut().shift_remove(DEPENDENCY_DIR);
    Tree::from_root(root)
}
