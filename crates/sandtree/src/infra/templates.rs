//! Template records and their persistence.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::model::{Directory, Tree};

const TEMPLATE_DIR: &str = "templates";

/// What kind of project a template holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Single `index.js` run with node.
    Javascript,
    /// Single `script.py`.
    Python,
    Express,
    /// Multi-file Vite + React project.
    Vite,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Python => "python",
            Self::Express => "express",
            Self::Vite => "vite",
        }
    }

    /// Whether the template persists a whole tree rather than one file.
    pub fn is_tree(self) -> bool {
        matches!(self, Self::Vite)
    }

    /// File name single-file templates are edited under.
    pub fn entry_file(self) -> &'static str {
        match self {
            Self::Python => "script.py",
            Self::Javascript | Self::Express | Self::Vite => "index.js",
        }
    }

    /// Content a freshly created template starts with.
    pub fn starter_content(self) -> Option<&'static str> {
        match self {
            Self::Javascript | Self::Express => Some("console.log('Hello, WebContainers!');"),
            Self::Python => Some("print('Hello WebContainers!')"),
            Self::Vite => None,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    #[default]
    Private,
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// A persisted project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "userId")]
    pub owner_id: String,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    #[serde(default)]
    pub privacy: Privacy,
    /// Text of single-file templates.
    #[serde(default)]
    pub content: Option<String>,
    /// Tree of multi-file templates.
    #[serde(default)]
    pub file_system_tree: Option<Tree>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TemplateRecord {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        kind: TemplateKind,
        privacy: Privacy,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: generate_id(now),
            name: name.into(),
            owner_id: owner_id.into(),
            kind,
            privacy,
            content: kind.starter_content().map(str::to_owned),
            file_system_tree: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The tree a session starts from.
    ///
    /// Tree templates yield their saved tree (empty when never saved);
    /// single-file templates yield one file holding `content`.
    pub fn materialize(&self) -> Tree {
        if self.kind.is_tree() {
            return self.file_system_tree.clone().unwrap_or_default();
        }
        let contents = self.content.clone().unwrap_or_default();
        Tree::from_root(Directory::new().with_file(self.kind.entry_file(), contents))
    }

    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Short, sortable, filesystem-safe identifier.
fn generate_id(now: OffsetDateTime) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed) & 0xffff;
    format!("{:x}{seq:04x}", now.unix_timestamp_nanos())
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {id} not found")]
    NotFound { id: String },
    #[error("invalid template id {id:?}")]
    InvalidId { id: String },
    #[error("template storage failed at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid template data in {}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence collaborator for template records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<TemplateRecord, TemplateError>;

    /// Insert or replace `record` keyed by its id.
    async fn upsert(&self, record: &TemplateRecord) -> Result<(), TemplateError>;

    /// Templates owned by `owner_id`, oldest first.
    async fn list(&self, owner_id: &str) -> Result<Vec<TemplateRecord>, TemplateError>;

    async fn delete(&self, id: &str) -> Result<(), TemplateError>;
}

/// Create and persist a new template with its starter content.
pub async fn create_template(
    store: &dyn TemplateStore,
    owner_id: &str,
    name: &str,
    kind: TemplateKind,
    privacy: Privacy,
) -> Result<TemplateRecord, TemplateError> {
    let record = TemplateRecord::new(owner_id, name, kind, privacy);
    store.upsert(&record).await?;
    tracing::info!(id = %record.id, %kind, "template created");
    Ok(record)
}

/// Stores every record as `<data_dir>/templates/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonTemplateStore {
    dir: PathBuf,
}

impl JsonTemplateStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(TEMPLATE_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, TemplateError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(TemplateError::InvalidId { id: id.to_owned() });
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_record(path: &Path) -> Result<TemplateRecord, TemplateError> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&data).map_err(|source| TemplateError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl TemplateStore for JsonTemplateStore {
    async fn fetch(&self, id: &str) -> Result<TemplateRecord, TemplateError> {
        let path = self.record_path(id)?;
        match Self::read_record(&path).await {
            Err(TemplateError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Err(TemplateError::NotFound { id: id.to_owned() })
            }
            other => other,
        }
    }

    async fn upsert(&self, record: &TemplateRecord) -> Result<(), TemplateError> {
        let path = self.record_path(&record.id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| TemplateError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let data = serde_json::to_string_pretty(record).map_err(|source| TemplateError::Json {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| TemplateError::Io { path, source })?;
        tracing::debug!(id = %record.id, "template saved");
        Ok(())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<TemplateRecord>, TemplateError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(TemplateError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| TemplateError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else {
                break;
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) if record.owner_id == owner_id => records.push(record),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "skipping unreadable template"),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<(), TemplateError> {
        let path = self.record_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(TemplateError::NotFound { id: id.to_owned() })
            }
            Err(source) => Err(TemplateError::Io { path, source }),
        }
    }
}
