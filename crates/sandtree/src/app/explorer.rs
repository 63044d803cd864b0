//! Explorer state: insertion directory, expanded folders and visible rows.

use std::collections::BTreeSet;

use crate::app::store::TreeEvent;
use crate::domain::model::{Directory, Entry, EntryKind, Tree};
use crate::domain::path::{self, ParentPath};

/// Folder expanded by default after a project is loaded.
const DEFAULT_EXPANDED: &str = "src";

/// One displayable line of the explorer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerRow {
    pub path: String,
    pub name: String,
    pub depth: usize,
    pub kind: EntryKind,
    pub expanded: bool,
}

/// Navigable state of the file explorer.
#[derive(Debug, Clone, Default)]
pub struct ExplorerState {
    expanded: BTreeSet<String>,
    active_directory: Option<String>,
}

impl ExplorerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory new entries are created in.
    pub fn insertion_parent(&self) -> ParentPath {
        match &self.active_directory {
            Some(dir) => ParentPath::Dir(dir.clone()),
            None => ParentPath::Root,
        }
    }

    pub fn active_directory(&self) -> Option<&str> {
        self.active_directory.as_deref()
    }

    /// Clicking a directory makes it the insertion target and toggles it.
    pub fn select_directory(&mut self, dir: &str) {
        let dir = path::normalize(dir);
        self.toggle(&dir);
        self.active_directory = (!dir.is_empty()).then_some(dir);
    }

    /// Clicking a file resets the insertion target to the root.
    pub fn select_file(&mut self) {
        self.active_directory = None;
    }

    pub fn toggle(&mut self, dir: &str) {
        let dir = path::normalize(dir);
        if !self.expanded.remove(&dir) {
            self.expanded.insert(dir);
        }
    }

    pub fn expand(&mut self, dir: &str) {
        self.expanded.insert(path::normalize(dir));
    }

    pub fn is_expanded(&self, dir: &str) -> bool {
        self.expanded.contains(&path::normalize(dir))
    }

    /// Recompute explorer state for one store event.
    pub fn apply(&mut self, event: &TreeEvent, tree: &Tree) {
        match event {
            TreeEvent::Loaded => {
                self.expanded.clear();
                self.active_directory = None;
                let has_default = path::resolve(tree, DEFAULT_EXPANDED)
                    .is_ok_and(|entry| entry.as_directory().is_some());
                if has_default {
                    self.expanded.insert(DEFAULT_EXPANDED.to_owned());
                }
            }
            TreeEvent::Deleted { path } => {
                self.expanded.retain(|dir| !path::is_within(dir, path));
                if self
                    .active_directory
                    .as_deref()
                    .is_some_and(|dir| path::is_within(dir, path))
                {
                    self.active_directory = None;
                }
            }
            TreeEvent::Renamed { from, to } => {
                self.expanded = self
                    .expanded
                    .iter()
                    .map(|dir| path::rebase(dir, from, to).unwrap_or_else(|| dir.clone()))
                    .collect();
                if let Some(dir) = self.active_directory.as_deref()
                    && let Some(rebased) = path::rebase(dir, from, to)
                {
                    self.active_directory = Some(rebased);
                }
            }
            TreeEvent::Created {
                path,
                kind: EntryKind::File,
            } => {
                // Reveal the new file.
                if let Some(parent) = path::parent_of(path) {
                    self.expand_ancestors(&parent);
                }
            }
            TreeEvent::Created { .. } | TreeEvent::Updated { .. } | TreeEvent::Activated { .. } => {}
        }
    }

    /// Rows to display, depth-first in insertion order, descending only into
    /// expanded directories.
    pub fn visible_rows(&self, tree: &Tree) -> Vec<ExplorerRow> {
        let mut rows = Vec::new();
        self.push_rows(tree.root(), "", 0, &mut rows);
        rows
    }

    fn push_rows(&self, dir: &Directory, prefix: &str, depth: usize, rows: &mut Vec<ExplorerRow>) {
        for (name, entry) in dir.iter() {
            let full = path::join(prefix, name);
            match entry.as_ref() {
                Entry::File(_) => rows.push(ExplorerRow {
                    path: full,
                    name: name.to_owned(),
                    depth,
                    kind: EntryKind::File,
                    expanded: false,
                }),
                Entry::Directory(sub) => {
                    let expanded = self.expanded.contains(&full);
                    rows.push(ExplorerRow {
                        path: full.clone(),
                        name: name.to_owned(),
                        depth,
                        kind: EntryKind::Directory,
                        expanded,
                    });
                    if expanded {
                        self.push_rows(sub, &full, depth + 1, rows);
                    }
                }
            }
        }
    }

    fn expand_ancestors(&mut self, dir: &str) {
        let parts = path::segments(dir);
        for len in 1..=parts.len() {
            self.expanded.insert(parts[..len].join("/"));
        }
    }
}

/// Render rows as an indented plain-text listing.
pub fn render_rows(rows: &[ExplorerRow]) -> String {
    rows.iter()
        .map(|row| {
            let marker = match (row.kind, row.expanded) {
                (EntryKind::Directory, true) => "v ",
                (EntryKind::Directory, false) => "> ",
                (EntryKind::File, _) => "  ",
            };
            format!("{}{marker}{}", "  ".repeat(row.depth), row.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
