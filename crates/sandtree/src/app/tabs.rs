//! Open editor tabs and the active file, derived from store events.

use crate::app::store::TreeEvent;
use crate::domain::model::Tree;
use crate::domain::path;

/// New edit selection chosen by the controller after a tab disappeared.
/// The caller pushes it back into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassign {
    pub path: Option<String>,
}

/// Tracks which files are open as tabs (first-opened order) and which one is
/// active.
#[derive(Debug, Default, Clone)]
pub struct TabsController {
    open: Vec<String>,
    active: Option<String>,
}

impl TabsController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_tabs(&self) -> &[String] {
        &self.open
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn is_open(&self, target: &str) -> bool {
        let target = path::normalize(target);
        self.open.iter().any(|tab| *tab == target)
    }

    /// Recompute tab state for one store event.
    ///
    /// Returns a [`Reassign`] when the active file went away and another tab
    /// (or nothing) must become active.
    pub fn apply(&mut self, event: &TreeEvent, tree: &Tree) -> Option<Reassign> {
        match event {
            TreeEvent::Activated { path } => {
                self.activate(path.as_deref(), tree);
                None
            }
            TreeEvent::Deleted { path } => self.remove_within(path),
            TreeEvent::Renamed { from, to } => {
                for tab in &mut self.open {
                    if let Some(rebased) = path::rebase(tab, from, to) {
                        *tab = rebased;
                    }
                }
                if let Some(active) = self.active.as_deref()
                    && let Some(rebased) = path::rebase(active, from, to)
                {
                    self.active = Some(rebased);
                }
                None
            }
            TreeEvent::Loaded => {
                self.open.clear();
                self.active = None;
                None
            }
            TreeEvent::Created { .. } | TreeEvent::Updated { .. } => None,
        }
    }

    /// Close the tab for `target`.
    ///
    /// Closing the active tab activates its right neighbour, or the new last
    /// tab when it was the rightmost one, or nothing when no tab is left.
    pub fn close(&mut self, target: &str) -> Option<Reassign> {
        let target = path::normalize(target);
        let index = self.open.iter().position(|tab| *tab == target)?;
        self.open.remove(index);

        if self.active.as_deref() != Some(target.as_str()) {
            return None;
        }

        let next = self
            .open
            .get(index)
            .or_else(|| self.open.last())
            .cloned();
        self.active = next.clone();
        Some(Reassign { path: next })
    }

    fn activate(&mut self, target: Option<&str>, tree: &Tree) {
        self.active = target.map(str::to_owned);
        let Some(target) = target else {
            return;
        };

        let is_file = path::resolve(tree, target)
            .map(|entry| entry.as_file().is_some())
            .unwrap_or(false);
        if is_file && !self.open.iter().any(|tab| tab == target) {
            self.open.push(target.to_owned());
        }
    }

    /// Drop every tab at or below `removed`, picking a surviving neighbour when
    /// the active tab was among them.
    fn remove_within(&mut self, removed: &str) -> Option<Reassign> {
        let active_index = self
            .active
            .as_deref()
            .and_then(|active| self.open.iter().position(|tab| tab == active));
        let active_removed = self
            .active
            .as_deref()
            .is_some_and(|active| path::is_within(active, removed));

        let survivors: Vec<(usize, String)> = self
            .open
            .drain(..)
            .enumerate()
            .filter(|(_, tab)| !path::is_within(tab, removed))
            .collect();

        let next = active_removed.then(|| {
            survivors
                .iter()
                .find(|(index, _)| active_index.is_some_and(|active| *index > active))
                .or_else(|| survivors.last())
                .map(|(_, tab)| tab.clone())
        });

        self.open = survivors.into_iter().map(|(_, tab)| tab).collect();

        let next = next?;
        self.active = next.clone();
        Some(Reassign { path: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Directory;

    fn tree() -> Tree {
        Tree::from_root(
            Directory::new()
                .with_file("A", "")
                .with_file("B", "")
                .with_file("C", "")
                .with_file("D", "")
                .with_dir(
                    "src",
                    Directory::new().with_file("main.js", "").with_file("app.js", ""),
                ),
        )
    }

    fn open_all(tabs: &mut TabsController, tree: &Tree, paths: &[&str]) {
        for path in paths {
            tabs.apply(
                &TreeEvent::Activated {
                    path: Some((*path).to_owned()),
                },
                tree,
            );
        }
    }

    fn activate(tabs: &mut TabsController, tree: &Tree, path: &str) {
        open_all(tabs, tree, &[path]);
    }

    #[test]
    fn activation_appends_files_once() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A", "B", "A", "src", "missing"]);
        assert_eq!(tabs.open_tabs(), ["A", "B"]);
        assert_eq!(tabs.active(), Some("missing"));
    }

    #[test]
    fn closing_middle_active_tab_activates_right_neighbour() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A", "B", "C", "D"]);
        activate(&mut tabs, &tree, "B");

        let change = tabs.close("B");
        assert_eq!(change, Some(Reassign { path: Some("C".into()) }));
        assert_eq!(tabs.open_tabs(), ["A", "C", "D"]);
        assert_eq!(tabs.active(), Some("C"));
    }

    #[test]
    fn closing_last_active_tab_falls_back_to_new_last() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A", "B", "C"]);

        let change = tabs.close("C");
        assert_eq!(change, Some(Reassign { path: Some("B".into()) }));
        assert_eq!(tabs.active(), Some("B"));
    }

    #[test]
    fn closing_only_tab_clears_active() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A"]);

        assert_eq!(tabs.close("A"), Some(Reassign { path: None }));
        assert!(tabs.is_empty());
        assert_eq!(tabs.active(), None);
    }

    #[test]
    fn closing_inactive_tab_keeps_active() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A", "B", "C"]);

        assert_eq!(tabs.close("A"), None);
        assert_eq!(tabs.active(), Some("C"));
        assert_eq!(tabs.close("missing"), None);
    }

    #[test]
    fn deleting_directory_drops_its_tabs() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A", "src/main.js", "src/app.js", "D"]);
        activate(&mut tabs, &tree, "src/main.js");

        let change = tabs.apply(&TreeEvent::Deleted { path: "src".into() }, &tree);
        assert_eq!(change, Some(Reassign { path: Some("D".into()) }));
        assert_eq!(tabs.open_tabs(), ["A", "D"]);
    }

    #[test]
    fn deleting_inactive_file_keeps_active() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A", "B"]);

        let change = tabs.apply(&TreeEvent::Deleted { path: "A".into() }, &tree);
        assert_eq!(change, None);
        assert_eq!(tabs.open_tabs(), ["B"]);
        assert_eq!(tabs.active(), Some("B"));
    }

    #[test]
    fn rename_rewrites_open_paths() {
        let tree = tree();
        let mut tabs = TabsController::new();
        open_all(&mut tabs, &tree, &["A", "src/main.js"]);

        tabs.apply(
            &TreeEvent::Renamed {
                from: "src".into(),
                to: "lib".into(),
            },
            &tree,
        );
        assert_eq!(tabs.open_tabs(), ["A", "lib/main.js"]);
        assert_eq!(tabs.active(), Some("lib/main.js"));
    }
}
