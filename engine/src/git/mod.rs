//! Repository and workpad engine.
//!
//! Trunk-based repositories with ephemeral workpads layered on top:
//! checkpoints are tags, promotion is fast-forward-only, and all durable
//! metadata lives in two crash-safe JSON files.

pub mod engine;
pub mod error;
pub mod runner;
pub mod types;
pub mod workpads;

pub use engine::{ArchiveExtractor, FileKind, FileNode, GitEngine};
pub use error::{GitError, GitResult};
pub use runner::GitRunner;
pub use types::{
    Checkpoint, Repository, SourceKind, TestStatus, Workpad, WorkpadSort, WorkpadStatus,
    DEFAULT_TRUNK_BRANCH, MAX_TITLE_LEN,
};
pub use workpads::{MergePreview, PadRef, WorkpadComparison};
