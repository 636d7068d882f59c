//! Error types for the repository and workpad engine.

use thiserror::Error;

/// Result type alias for git engine operations.
pub type GitResult<T> = Result<T, GitError>;

/// Errors raised by the repository and workpad engine.
#[derive(Error, Debug)]
pub enum GitError {
    /// Repository initialization from an archive or remote failed.
    /// The half-initialized directory has already been removed.
    #[error("failed to initialize repository: {0}")]
    RepositoryInitFailed(String),

    /// No repository with the given id exists.
    #[error("repository {0} not found")]
    RepositoryNotFound(String),

    /// No workpad with the given id exists.
    #[error("workpad {0} not found")]
    WorkpadNotFound(String),

    /// The workpad cannot be fast-forwarded onto trunk.
    #[error("cannot promote {id}: {reason}")]
    CannotPromote { id: String, reason: String },

    /// Workpad title failed validation.
    #[error("invalid workpad title: {0}")]
    InvalidTitle(String),

    /// A git subprocess exited with a failure status.
    #[error("git {operation} failed: {message}")]
    Command { operation: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GitError {
    /// Create an init-failure error.
    pub fn init_failed(detail: impl Into<String>) -> Self {
        Self::RepositoryInitFailed(detail.into())
    }

    /// Create a repository-not-found error.
    pub fn repository_not_found(id: impl Into<String>) -> Self {
        Self::RepositoryNotFound(id.into())
    }

    /// Create a workpad-not-found error.
    pub fn workpad_not_found(id: impl Into<String>) -> Self {
        Self::WorkpadNotFound(id.into())
    }

    /// Create a cannot-promote error.
    pub fn cannot_promote(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CannotPromote {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a git subprocess error.
    pub fn command(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
