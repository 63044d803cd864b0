//! Domain models for the project file tree.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::path;

/// Child mapping of a directory. Insertion order is kept for display stability.
pub type Children = IndexMap<String, Arc<Entry>>;

/// Discriminant of an [`Entry`], used when creating entries and in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Directory => f.write_str("directory"),
        }
    }
}

/// A node of the tree.
///
/// Serialized externally tagged, which is exactly the persisted wire shape:
/// `{"file": {"contents": "..."}}` or `{"directory": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entry {
    File(FileEntry),
    Directory(Directory),
}

impl Entry {
    pub fn file(contents: impl Into<String>) -> Self {
        Self::File(FileEntry::new(contents))
    }

    pub fn empty_directory() -> Self {
        Self::Directory(Directory::new())
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::File(_) => EntryKind::File,
            Self::Directory(_) => EntryKind::Directory,
        }
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Self::File(_) => None,
            Self::Directory(dir) => Some(dir),
        }
    }

    /// Empty entry of the requested kind, as created by the store.
    pub fn empty(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => Self::file(String::new()),
            EntryKind::Directory => Self::empty_directory(),
        }
    }
}

/// Text file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(serialize_with = "serialize_sanitized")]
    pub contents: String,
}

impl FileEntry {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

/// A directory: named children, unique among siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Directory {
    children: Children,
}

/// Child names are checked on the way in, so a loaded tree only holds entries
/// that paths can reach.
impl<'de> Deserialize<'de> for Directory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let children = Children::deserialize(deserializer)?;
        for name in children.keys() {
            path::validate_name(name).map_err(serde::de::Error::custom)?;
        }
        Ok(Self { children })
    }
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_children(children: Children) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Entry>> {
        self.children.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Arc<Entry>)> {
        self.children.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Insert or replace a child. Only used while building fresh directories;
    /// the store goes through its own collision checks.
    pub fn insert(&mut self, name: impl Into<String>, entry: Entry) {
        self.children.insert(name.into(), Arc::new(entry));
    }

    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.insert(name, Entry::file(contents));
        self
    }

    pub fn with_dir(mut self, name: impl Into<String>, dir: Directory) -> Self {
        self.insert(name, Entry::Directory(dir));
        self
    }

    pub(crate) fn children_mut(&mut self) -> &mut Children {
        &mut self.children
    }
}

/// The whole project tree: root-level names mapped to entries.
///
/// A `Tree` value is never mutated once published by the store; edits produce
/// a new value sharing untouched subtrees through `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    root: Directory,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: Directory) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub fn into_root(self) -> Directory {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Every file in depth-first, insertion order, keyed by canonical path.
    pub fn files(&self) -> Vec<(String, &FileEntry)> {
        let mut out = Vec::new();
        collect_files(&self.root, "", &mut out);
        out
    }

    /// Total number of entries (files and directories) in the tree.
    pub fn entry_count(&self) -> usize {
        fn count(dir: &Directory) -> usize {
            dir.iter()
                .map(|(_, entry)| match entry.as_ref() {
                    Entry::File(_) => 1,
                    Entry::Directory(sub) => 1 + count(sub),
                })
                .sum()
        }
        count(&self.root)
    }

    /// Serialize to the persisted JSON shape. U+0000 is stripped from contents.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

fn collect_files<'a>(dir: &'a Directory, prefix: &str, out: &mut Vec<(String, &'a FileEntry)>) {
    for (name, entry) in dir.iter() {
        let path = if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{prefix}/{name}")
        };
        match entry.as_ref() {
            Entry::File(file) => out.push((path, file)),
            Entry::Directory(sub) => collect_files(sub, &path, out),
        }
    }
}

/// Remove every U+0000 from `text`. The persistence store cannot hold them.
pub fn strip_nul(text: &str) -> Cow<'_, str> {
    if text.contains('\0') {
        Cow::Owned(text.replace('\0', ""))
    } else {
        Cow::Borrowed(text)
    }
}

fn serialize_sanitized<S: Serializer>(contents: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&strip_nul(contents))
}
