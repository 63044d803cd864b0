//! Slash-delimited logical paths and their resolution against a [`Tree`].

use std::sync::Arc;

use crate::domain::errors::TreeError;
use crate::domain::model::{Entry, Tree};

/// Sentinel accepted by callers to mean "insert at the top level".
pub const ROOT: &str = "root";

/// Split `path` on `/`, discarding empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Canonical form: segments joined by `/`, no leading or trailing slash.
pub fn normalize(path: &str) -> String {
    segments(path).join("/")
}

pub fn join(parent: &str, name: &str) -> String {
    let parent = normalize(parent);
    let name = normalize(name);
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name,
        (false, true) => parent,
        (false, false) => format!("{parent}/{name}"),
    }
}

/// Parent of a canonical path; `None` for root-level entries.
pub fn parent_of(path: &str) -> Option<String> {
    let normalized = normalize(path);
    normalized
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_owned())
}

/// Last segment of `path`.
pub fn file_name(path: &str) -> Option<&str> {
    segments(path).last().copied()
}

/// Whether `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    let path = segments(path);
    let ancestor = segments(ancestor);
    !ancestor.is_empty() && path.len() >= ancestor.len() && path[..ancestor.len()] == ancestor[..]
}

/// Rewrite `path` from under `from` to under `to`. Returns `None` when `path`
/// is not within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_within(path, from) {
        return None;
    }
    let rest = segments(path)[segments(from).len()..].join("/");
    if rest.is_empty() {
        Some(normalize(to))
    } else {
        Some(join(to, &rest))
    }
}

/// Where a new entry is inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentPath {
    Root,
    Dir(String),
}

impl ParentPath {
    /// Parse the caller-facing form: `"root"`, `""` and `"/"` mean the top level.
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize(raw);
        if normalized.is_empty() || normalized == ROOT {
            Self::Root
        } else {
            Self::Dir(normalized)
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::Root => Vec::new(),
            Self::Dir(path) => segments(path),
        }
    }

    pub fn child(&self, name: &str) -> String {
        match self {
            Self::Root => normalize(name),
            Self::Dir(path) => join(path, name),
        }
    }
}

impl From<&str> for ParentPath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Check that `name` can be a single child name: not blank, not `.` or `..`,
/// and free of `/` and U+0000.
pub fn validate_name(name: &str) -> Result<(), TreeError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0');
    if invalid {
        return Err(TreeError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Walk `tree` from the root following directory children named by `path`.
///
/// A missing segment, a file at a non-terminal segment, or an empty path all
/// resolve to [`TreeError::NotFound`].
pub fn resolve<'a>(tree: &'a Tree, path: &str) -> Result<&'a Arc<Entry>, TreeError> {
    let parts = segments(path);
    let Some((last, parents)) = parts.split_last() else {
        return Err(TreeError::not_found(path));
    };

    let mut dir = tree.root();
    for part in parents {
        match dir.get(part).map(Arc::as_ref) {
            Some(Entry::Directory(next)) => dir = next,
            Some(Entry::File(_)) | None => return Err(TreeError::not_found(normalize(path))),
        }
    }

    dir.get(last).ok_or_else(|| TreeError::not_found(normalize(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Directory;

    fn tree() -> Tree {
        Tree::from_root(
            Directory::new()
                .with_file("app.js", "console.log(1)")
                .with_dir("src", Directory::new().with_file("index.js", "")),
        )
    }

    #[test]
    fn segments_discard_empty_parts() {
        assert_eq!(segments("//src///index.js/"), vec!["src", "index.js"]);
        assert_eq!(normalize("/src/index.js"), "src/index.js");
        assert!(segments("").is_empty());
    }

    #[test]
    fn resolves_files_and_directories() {
        let tree = tree();
        assert!(resolve(&tree, "/app.js").unwrap().as_file().is_some());
        assert!(resolve(&tree, "src").unwrap().as_directory().is_some());
        assert_eq!(
            resolve(&tree, "src/index.js").unwrap().as_file().unwrap().contents,
            ""
        );
    }

    #[test]
    fn file_in_the_middle_is_not_found() {
        let tree = tree();
        assert_eq!(
            resolve(&tree, "app.js/inner"),
            Err(TreeError::not_found("app.js/inner"))
        );
        assert!(resolve(&tree, "missing/index.js").is_err());
        assert!(resolve(&tree, "").is_err());
    }

    #[test]
    fn resolve_is_deterministic() {
        let tree = tree();
        let first = resolve(&tree, "src/index.js").unwrap();
        let second = resolve(&tree, "src/index.js").unwrap();
        assert!(Arc::ptr_eq(first, second));
    }

    #[test]
    fn parent_path_parsing() {
        assert_eq!(ParentPath::parse("root"), ParentPath::Root);
        assert_eq!(ParentPath::parse("/"), ParentPath::Root);
        assert_eq!(ParentPath::parse("/src/"), ParentPath::Dir("src".into()));
        assert_eq!(ParentPath::Root.child("a.js"), "a.js");
        assert_eq!(ParentPath::parse("src").child("a.js"), "src/a.js");
    }

    #[test]
    fn prefix_helpers() {
        assert!(is_within("src/a/b.js", "src"));
        assert!(is_within("src", "src"));
        assert!(!is_within("srcs/a.js", "src"));
        assert_eq!(rebase("src/a/b.js", "src", "lib").as_deref(), Some("lib/a/b.js"));
        assert_eq!(rebase("src", "src", "lib").as_deref(), Some("lib"));
        assert_eq!(parent_of("src/a/b.js").as_deref(), Some("src/a"));
        assert_eq!(parent_of("b.js"), None);
    }
}
