//! Domain-specific errors.

use thiserror::Error;

use crate::domain::model::EntryKind;

/// Failures of structural tree operations.
///
/// These are surfaced synchronously to the caller; an operation that returns
/// one of them has left the previous snapshot untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("path not found: {path}")]
    NotFound { path: String },
    #[error("expected a {expected} at {path}")]
    WrongKind { path: String, expected: EntryKind },
    #[error("an entry named {path} already exists")]
    AlreadyExists { path: String },
    #[error("invalid entry name {name:?}")]
    InvalidName { name: String },
}

impl TreeError {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn wrong_kind(path: impl Into<String>, expected: EntryKind) -> Self {
        Self::WrongKind {
            path: path.into(),
            expected,
        }
    }
}

/// Failures reported at the sandbox boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// The runtime has not finished booting (or was torn down).
    #[error("sandbox is not available")]
    Unavailable,
    #[error("sandbox {op} failed for {path}: {message}")]
    OperationFailed {
        op: &'static str,
        path: String,
        message: String,
    },
}

impl SandboxError {
    pub fn failed(op: &'static str, path: impl Into<String>, message: impl ToString) -> Self {
        Self::OperationFailed {
            op,
            path: path.into(),
            message: message.to_string(),
        }
    }
}
