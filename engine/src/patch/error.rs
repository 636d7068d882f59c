//! Error types for the patch engine.

use thiserror::Error;

use crate::git::GitError;

/// Result type alias for patch engine operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors raised by the patch engine.
#[derive(Error, Debug)]
pub enum PatchError {
    /// `git apply --check` refused the patch on the workpad branch.
    #[error("patch has conflicts: {0}")]
    Conflict(String),

    /// The patch was accepted by validation but failed to apply.
    #[error("failed to apply patch: {0}")]
    ApplyFailed(String),

    /// The validation machinery itself failed (not a conflict).
    #[error("patch validation error: {0}")]
    Validation(String),

    /// Underlying repository or workpad error.
    #[error(transparent)]
    Git(#[from] GitError),
}

impl PatchError {
    /// Create a conflict error.
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::Conflict(detail.into())
    }

    /// Create an apply-failure error.
    pub fn apply_failed(detail: impl Into<String>) -> Self {
        Self::ApplyFailed(detail.into())
    }

    /// Create a validation error.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }

    /// Whether this error is a patch conflict (as opposed to an
    /// infrastructure failure).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
