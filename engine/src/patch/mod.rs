//! Patch application and validation over workpads.
//!
//! Pure diff analysis lives in [`stats`]; everything here runs against a
//! workpad branch through the git engine. Validation is a dry run with
//! `git apply --check --whitespace=fix` in a scratch file inside `.git/`,
//! so the working tree is never dirtied by a rejected patch.

pub mod error;
pub mod stats;

pub use error::{PatchError, PatchResult};
pub use stats::{combine, split_by_file, validate_syntax};
pub use stats::{PatchComplexity, PatchStats, SyntaxReport};

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::git::{GitEngine, GitError};

/// Scratch file used for validation dry runs.
const VALIDATE_SCRATCH_FILE: &str = "workpad-validate.diff";

/// Advice attached to a patch preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    ManualResolutionRequired,
    SafeToApply,
    ReviewRecommended,
    CarefulReviewRequired,
}

impl Recommendation {
    /// Derive advice from stats and conflict state.
    pub fn for_patch(stats: &PatchStats, has_conflicts: bool) -> Self {
        if has_conflicts {
            return Self::ManualResolutionRequired;
        }
        match stats.complexity {
            PatchComplexity::Trivial | PatchComplexity::Simple => Self::SafeToApply,
            PatchComplexity::Moderate => Self::ReviewRecommended,
            PatchComplexity::Complex | PatchComplexity::VeryComplex => {
                Self::CarefulReviewRequired
            }
        }
    }

    /// One-line human explanation.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::ManualResolutionRequired => "MANUAL_RESOLUTION_REQUIRED - Patch has conflicts",
            Self::SafeToApply => "SAFE_TO_APPLY - Low complexity, low risk",
            Self::ReviewRecommended => "REVIEW_RECOMMENDED - Moderate complexity",
            Self::CarefulReviewRequired => {
                "CAREFUL_REVIEW_REQUIRED - High complexity, higher risk"
            }
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManualResolutionRequired => write!(f, "MANUAL_RESOLUTION_REQUIRED"),
            Self::SafeToApply => write!(f, "SAFE_TO_APPLY"),
            Self::ReviewRecommended => write!(f, "REVIEW_RECOMMENDED"),
            Self::CarefulReviewRequired => write!(f, "CAREFUL_REVIEW_REQUIRED"),
        }
    }
}

/// Analysis of a patch against a workpad, without applying it.
#[derive(Debug, Clone, Serialize)]
pub struct PatchPreview {
    pub pad_id: String,
    pub pad_title: String,
    pub can_apply: bool,
    pub has_conflicts: bool,
    pub conflict_files: Vec<String>,
    pub stats: PatchStats,
    pub recommendation: Recommendation,
}

/// Detailed conflict analysis.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub conflicting_files: Vec<String>,
    pub conflict_details: Vec<ConflictDetail>,
    pub can_apply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictDetail {
    pub file: String,
    pub reason: String,
}

/// Outcome of the interactive apply pipeline.
///
/// A tagged sum instead of error-driven control flow: every terminal state
/// of validate → preview → apply is its own variant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The patch was applied and a checkpoint created.
    Success {
        checkpoint_id: String,
        preview: PatchPreview,
    },
    /// Structural validation rejected the patch.
    InvalidSyntax { errors: Vec<String> },
    /// The patch does not apply cleanly to the workpad branch.
    HasConflicts { preview: PatchPreview },
    /// Dry run requested; nothing was applied.
    DryRun {
        preview: PatchPreview,
        would_succeed: bool,
    },
    /// Validation passed but the apply itself failed.
    ApplicationFailed {
        error: String,
        preview: PatchPreview,
    },
}

impl ApplyOutcome {
    /// Whether the pipeline ended with an applied checkpoint.
    pub fn applied(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Patch engine bound to a git engine for the duration of an operation.
pub struct PatchEngine<'g> {
    git: &'g mut GitEngine,
}

impl<'g> PatchEngine<'g> {
    pub fn new(git: &'g mut GitEngine) -> Self {
        Self { git }
    }

    /// Verify the patch applies cleanly to the workpad branch.
    ///
    /// Runs `git apply --check --whitespace=fix` against a scratch copy of
    /// the patch; the scratch file is removed on every path.
    pub fn validate(&mut self, pad_id: &str, patch: &str) -> PatchResult<()> {
        debug!("validating patch for workpad {pad_id}");

        let pad = self.git.require_workpad(pad_id)?.clone();
        let repo = self.git.require_repository(&pad.repo_id)?;
        let runner = self.git.runner_for(repo);
        let scratch = repo.path.join(".git").join(VALIDATE_SCRATCH_FILE);

        runner
            .checkout(&pad.branch_name)
            .map_err(|e| PatchError::validation(e.to_string()))?;

        std::fs::write(&scratch, patch).map_err(GitError::from)?;
        let checked = runner.apply(&scratch, true);
        if let Err(err) = std::fs::remove_file(&scratch) {
            warn!("failed to remove validation scratch file: {err}");
        }

        match checked {
            Ok(()) => {
                debug!("patch validation successful");
                Ok(())
            }
            Err(err) => {
                warn!("patch validation failed: {err}");
                Err(PatchError::conflict(err.to_string()))
            }
        }
    }

    /// Apply a patch to a workpad, creating the next checkpoint.
    pub fn apply(
        &mut self,
        pad_id: &str,
        patch: &str,
        message: Option<&str>,
        validate: bool,
    ) -> PatchResult<String> {
        info!("applying patch to workpad {pad_id} (validate={validate})");

        if validate {
            self.validate(pad_id, patch)?;
        }

        match self.git.apply_patch(pad_id, patch, message) {
            Ok(checkpoint_id) => {
                info!("patch applied successfully: {checkpoint_id}");
                Ok(checkpoint_id)
            }
            Err(err @ (GitError::WorkpadNotFound(_) | GitError::RepositoryNotFound(_))) => {
                Err(err.into())
            }
            Err(err) => Err(PatchError::apply_failed(err.to_string())),
        }
    }

    /// Files that prevent the patch from applying; empty when clean.
    pub fn detect_conflicts(&mut self, pad_id: &str, patch: &str) -> PatchResult<Vec<String>> {
        match self.validate(pad_id, patch) {
            Ok(()) => Ok(Vec::new()),
            Err(PatchError::Conflict(_)) => Ok(PatchStats::from_diff(patch).files_list),
            Err(err) => Err(err),
        }
    }

    /// Conflict analysis with per-file reasons.
    pub fn detect_conflicts_detailed(
        &mut self,
        pad_id: &str,
        patch: &str,
    ) -> PatchResult<ConflictReport> {
        match self.validate(pad_id, patch) {
            Ok(()) => Ok(ConflictReport {
                has_conflicts: false,
                conflicting_files: Vec::new(),
                conflict_details: Vec::new(),
                can_apply: true,
                error_message: None,
            }),
            Err(PatchError::Conflict(message)) => {
                let conflicting_files = PatchStats::from_diff(patch).files_list;
                let conflict_details = conflicting_files
                    .iter()
                    .map(|file| ConflictDetail {
                        file: file.clone(),
                        reason: "File modified in workpad or patch does not apply cleanly"
                            .to_string(),
                    })
                    .collect();
                Ok(ConflictReport {
                    has_conflicts: true,
                    conflicting_files,
                    conflict_details,
                    can_apply: false,
                    error_message: Some(message),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Analyze a patch against a workpad without applying it.
    pub fn preview(&mut self, pad_id: &str, patch: &str) -> PatchResult<PatchPreview> {
        info!("previewing patch for workpad {pad_id}");

        let stats = PatchStats::from_diff(patch);

        let (has_conflicts, conflict_files) = match self.validate(pad_id, patch) {
            Ok(()) => (false, Vec::new()),
            Err(PatchError::Conflict(_)) => (true, stats.files_list.clone()),
            Err(err) => return Err(err),
        };

        let pad_title = self
            .git
            .workpad(pad_id)
            .map(|pad| pad.title.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let recommendation = Recommendation::for_patch(&stats, has_conflicts);
        Ok(PatchPreview {
            pad_id: pad_id.to_string(),
            pad_title,
            can_apply: !has_conflicts,
            has_conflicts,
            conflict_files,
            stats,
            recommendation,
        })
    }

    /// Full pipeline: syntax check, preview, then apply unless dry-running.
    pub fn apply_interactive(
        &mut self,
        pad_id: &str,
        patch: &str,
        message: Option<&str>,
        dry_run: bool,
    ) -> PatchResult<ApplyOutcome> {
        let syntax = validate_syntax(patch);
        if !syntax.valid {
            return Ok(ApplyOutcome::InvalidSyntax {
                errors: syntax.errors,
            });
        }

        let preview = self.preview(pad_id, patch)?;
        if !preview.can_apply {
            return Ok(ApplyOutcome::HasConflicts { preview });
        }

        if dry_run {
            return Ok(ApplyOutcome::DryRun {
                preview,
                would_succeed: true,
            });
        }

        match self.apply(pad_id, patch, message, true) {
            Ok(checkpoint_id) => Ok(ApplyOutcome::Success {
                checkpoint_id,
                preview,
            }),
            Err(err) => Ok(ApplyOutcome::ApplicationFailed {
                error: err.to_string(),
                preview,
            }),
        }
    }

    /// Write new file contents on the workpad branch and return the diff
    /// they produce against HEAD.
    pub fn create_from_files(
        &mut self,
        pad_id: &str,
        file_changes: &BTreeMap<String, String>,
    ) -> PatchResult<String> {
        debug!("creating patch from {} file(s)", file_changes.len());

        let pad = self.git.require_workpad(pad_id)?.clone();
        let repo = self.git.require_repository(&pad.repo_id)?;
        let runner = self.git.runner_for(repo);
        runner.checkout(&pad.branch_name)?;

        for (path, content) in file_changes {
            let full_path = repo.path.join(path);
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent).map_err(GitError::from)?;
            }
            std::fs::write(&full_path, content).map_err(GitError::from)?;
        }

        let paths: Vec<&str> = file_changes.keys().map(String::as_str).collect();
        let diff = runner.diff_worktree("HEAD", &paths)?;
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(total: usize, files: usize) -> PatchStats {
        PatchStats {
            files_affected: files,
            files_list: (0..files).map(|i| format!("file{i}.rs")).collect(),
            additions: total,
            deletions: 0,
            total_changes: total,
            hunks: files,
            complexity: PatchComplexity::classify(total, files),
        }
    }

    #[test]
    fn test_recommendation_policy() {
        assert_eq!(
            Recommendation::for_patch(&stats_with(5, 1), true),
            Recommendation::ManualResolutionRequired
        );
        assert_eq!(
            Recommendation::for_patch(&stats_with(5, 1), false),
            Recommendation::SafeToApply
        );
        assert_eq!(
            Recommendation::for_patch(&stats_with(100, 5), false),
            Recommendation::ReviewRecommended
        );
        assert_eq!(
            Recommendation::for_patch(&stats_with(400, 15), false),
            Recommendation::CarefulReviewRequired
        );
        assert_eq!(
            Recommendation::for_patch(&stats_with(1000, 30), false),
            Recommendation::CarefulReviewRequired
        );
    }

    #[test]
    fn test_recommendation_display() {
        assert_eq!(
            Recommendation::SafeToApply.to_string(),
            "SAFE_TO_APPLY"
        );
        assert!(Recommendation::ManualResolutionRequired
            .summary()
            .contains("conflicts"));
    }

    #[test]
    fn test_apply_outcome_applied() {
        let outcome = ApplyOutcome::InvalidSyntax {
            errors: vec!["Patch is empty".to_string()],
        };
        assert!(!outcome.applied());
    }
}
