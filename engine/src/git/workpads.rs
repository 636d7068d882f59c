//! Workpad lifecycle: create, switch, checkpoint, promote, delete, inspect.
//!
//! A workpad's branch exists on disk exactly while its status is `active`.
//! Checkpoints are dense (`t1`, `t2`, ...) and never reused; promotion is
//! fast-forward-only and is the single path by which workpad content
//! reaches trunk.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::git::engine::GitEngine;
use crate::git::error::{GitError, GitResult};
use crate::git::runner::GitRunner;
use crate::git::types::{
    branch_name_for, generate_id, Checkpoint, TestStatus, Workpad, WorkpadSort, WorkpadStatus,
    MAX_TITLE_LEN,
};

/// Scratch file used while applying a patch; lives inside `.git/` so it
/// never shows up as an untracked change.
const PATCH_SCRATCH_FILE: &str = "workpad-patch.diff";

/// Summary of one side of a workpad comparison.
#[derive(Debug, Clone, Serialize)]
pub struct PadRef {
    pub id: String,
    pub title: String,
    pub branch: String,
}

/// Structured comparison between two workpads of the same repository.
#[derive(Debug, Clone, Serialize)]
pub struct WorkpadComparison {
    pub pad_a: PadRef,
    pub pad_b: PadRef,
    pub files_changed: usize,
    pub diff: String,
}

/// Dry-run view of promoting a workpad onto trunk.
#[derive(Debug, Clone, Serialize)]
pub struct MergePreview {
    pub pad_id: String,
    pub can_fast_forward: bool,
    pub commits_ahead: u32,
    pub commits_behind: u32,
    pub files_changed: usize,
    /// Files touched on both sides since the merge base. Empty when the
    /// merge is a fast-forward.
    pub conflicts: Vec<String>,
    pub ready_to_promote: bool,
}

impl GitEngine {
    /// Create a workpad branched from trunk HEAD.
    ///
    /// The title must be non-empty and at most [`MAX_TITLE_LEN`] characters.
    pub fn create_workpad(&mut self, repo_id: &str, title: &str) -> GitResult<String> {
        info!("creating workpad '{title}' in repo {repo_id}");

        if title.trim().is_empty() {
            return Err(GitError::InvalidTitle("workpad title is empty".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(GitError::InvalidTitle(format!(
                "workpad title exceeds {MAX_TITLE_LEN} characters"
            )));
        }

        let repo = self.require_repository(repo_id)?;
        let now = Utc::now();
        let pad_id = generate_id("pad");
        let branch_name = branch_name_for(title, now);

        let runner = self.runner_for(repo);
        runner.checkout(&repo.trunk_branch)?;
        runner.create_branch(&branch_name)?;
        debug!("created branch {branch_name}");

        let workpad = Workpad {
            id: pad_id.clone(),
            repo_id: repo_id.to_string(),
            title: title.to_string(),
            branch_name,
            created_at: now,
            checkpoints: Vec::new(),
            last_activity: now,
            status: WorkpadStatus::Active,
            test_status: None,
            last_commit: None,
        };
        self.workpads.insert(pad_id.clone(), workpad);
        if let Some(repo) = self.repositories.get_mut(repo_id) {
            repo.workpad_count = repo.workpad_count.saturating_add(1);
            repo.last_activity = now;
        }
        self.save_metadata()?;

        info!("workpad created: {pad_id}");
        Ok(pad_id)
    }

    /// Look up a workpad by id.
    pub fn workpad(&self, pad_id: &str) -> Option<&Workpad> {
        self.workpads.get(pad_id)
    }

    pub(crate) fn require_workpad(&self, pad_id: &str) -> GitResult<&Workpad> {
        self.workpads
            .get(pad_id)
            .ok_or_else(|| GitError::workpad_not_found(pad_id))
    }

    /// All workpads, optionally restricted to one repository.
    pub fn list_workpads(&self, repo_id: Option<&str>) -> Vec<&Workpad> {
        self.workpads
            .values()
            .filter(|pad| repo_id.is_none_or(|r| pad.repo_id == r))
            .collect()
    }

    /// Filtered, sorted workpad listing.
    pub fn list_workpads_filtered(
        &self,
        repo_id: Option<&str>,
        status: Option<WorkpadStatus>,
        sort_by: WorkpadSort,
        reverse: bool,
    ) -> Vec<&Workpad> {
        let mut pads: Vec<&Workpad> = self
            .workpads
            .values()
            .filter(|pad| repo_id.is_none_or(|r| pad.repo_id == r))
            .filter(|pad| status.is_none_or(|s| pad.status == s))
            .collect();

        match sort_by {
            WorkpadSort::Created => pads.sort_by_key(|pad| pad.created_at),
            WorkpadSort::Activity => pads.sort_by_key(|pad| pad.last_activity),
            WorkpadSort::Title => pads.sort_by(|a, b| a.title.cmp(&b.title)),
        }
        if reverse {
            pads.reverse();
        }
        pads
    }

    /// Check out a workpad's branch and touch its activity timestamp.
    pub fn switch_workpad(&mut self, pad_id: &str) -> GitResult<()> {
        let pad = self.require_workpad(pad_id)?;
        let repo = self.require_repository(&pad.repo_id)?;
        let runner = self.runner_for(repo);
        runner.checkout(&pad.branch_name)?;

        if let Some(pad) = self.workpads.get_mut(pad_id) {
            pad.last_activity = Utc::now();
        }
        self.save_metadata()?;
        debug!("switched to workpad {pad_id}");
        Ok(())
    }

    /// The workpad whose branch is currently checked out, if any.
    pub fn active_workpad(&self, repo_id: &str) -> GitResult<Option<&Workpad>> {
        let repo = self.require_repository(repo_id)?;
        let current = self.runner_for(repo).current_branch()?;
        Ok(self.workpads.values().find(|pad| {
            pad.repo_id == repo_id
                && pad.status == WorkpadStatus::Active
                && pad.branch_name == current
        }))
    }

    /// Record the latest test verdict for a workpad.
    pub fn set_test_status(&mut self, pad_id: &str, status: TestStatus) -> GitResult<()> {
        let pad = self
            .workpads
            .get_mut(pad_id)
            .ok_or_else(|| GitError::workpad_not_found(pad_id))?;
        pad.test_status = Some(status);
        pad.last_activity = Utc::now();
        self.save_metadata()
    }

    /// Apply a unified diff to a workpad and create the next checkpoint.
    ///
    /// The patch is materialized to a scratch file inside `.git/`, applied
    /// with `git apply --whitespace=fix`, committed (default message
    /// `Checkpoint <N>`), and tagged `<branch>@t<N>`. The scratch file is
    /// removed on success and failure.
    pub fn apply_patch(
        &mut self,
        pad_id: &str,
        patch: &str,
        message: Option<&str>,
    ) -> GitResult<String> {
        info!("applying patch to workpad {pad_id}");

        let pad = self.require_workpad(pad_id)?.clone();
        let repo = self.require_repository(&pad.repo_id)?;
        let runner = self.runner_for(repo);
        runner.checkout(&pad.branch_name)?;

        let scratch = repo.path.join(".git").join(PATCH_SCRATCH_FILE);
        std::fs::write(&scratch, patch)?;
        let applied = runner.apply(&scratch, false);
        if let Err(err) = std::fs::remove_file(&scratch) {
            warn!("failed to remove scratch patch file: {err}");
        }
        applied?;

        runner.add_all()?;
        let checkpoint_id = pad.next_checkpoint_id();
        let commit_message = match message {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => format!("Checkpoint {}", pad.checkpoints.len() + 1),
        };
        runner.commit(&commit_message)?;
        let commit_hash = runner.rev_parse("HEAD")?;
        runner.tag(&pad.checkpoint_tag(&checkpoint_id))?;

        let now = Utc::now();
        if let Some(pad) = self.workpads.get_mut(pad_id) {
            pad.checkpoints.push(checkpoint_id.clone());
            pad.last_activity = now;
            pad.last_commit = Some(commit_hash);
        }
        if let Some(repo) = self.repositories.get_mut(&pad.repo_id) {
            repo.last_activity = now;
        }
        self.save_metadata()?;

        info!("patch applied, checkpoint created: {checkpoint_id}");
        Ok(checkpoint_id)
    }

    /// Whether the workpad can fast-forward onto trunk.
    ///
    /// True exactly when the merge base of trunk and the pad equals trunk
    /// HEAD. Lookup or git failures report as not promotable.
    pub fn can_promote(&self, pad_id: &str) -> bool {
        match self.fast_forward_check(pad_id) {
            Ok(ok) => ok,
            Err(err) => {
                debug!("promotion check failed for {pad_id}: {err}");
                false
            }
        }
    }

    fn fast_forward_check(&self, pad_id: &str) -> GitResult<bool> {
        let pad = self.require_workpad(pad_id)?;
        if pad.status != WorkpadStatus::Active {
            return Ok(false);
        }
        let repo = self.require_repository(&pad.repo_id)?;
        let runner = self.runner_for(repo);
        let trunk_head = runner.rev_parse(&repo.trunk_branch)?;
        let merge_base = runner.merge_base(&repo.trunk_branch, &pad.branch_name)?;
        Ok(merge_base == trunk_head)
    }

    /// Fast-forward trunk to the workpad HEAD and retire the workpad.
    ///
    /// This is the promotion gate: it refuses with [`GitError::CannotPromote`]
    /// whenever trunk has diverged from the pad's base.
    pub fn promote_workpad(&mut self, pad_id: &str) -> GitResult<String> {
        info!("promoting workpad {pad_id}");

        let pad = self.require_workpad(pad_id)?.clone();
        if pad.status != WorkpadStatus::Active {
            return Err(GitError::cannot_promote(
                pad_id,
                format!("workpad is {}", pad.status),
            ));
        }
        if !self.fast_forward_check(pad_id)? {
            return Err(GitError::cannot_promote(
                pad_id,
                "not fast-forward-able, trunk has diverged",
            ));
        }

        let repo = self.require_repository(&pad.repo_id)?;
        let runner = self.runner_for(repo);
        runner.checkout(&repo.trunk_branch)?;
        runner.merge_ff_only(&pad.branch_name)?;
        let commit_hash = runner.rev_parse("HEAD")?;
        runner.delete_branch(&pad.branch_name, true)?;

        let now = Utc::now();
        if let Some(pad) = self.workpads.get_mut(pad_id) {
            pad.status = WorkpadStatus::Promoted;
            pad.last_activity = now;
        }
        if let Some(repo) = self.repositories.get_mut(&pad.repo_id) {
            repo.workpad_count = repo.workpad_count.saturating_sub(1);
            repo.last_activity = now;
        }
        self.save_metadata()?;

        info!("workpad promoted: {pad_id} -> {commit_hash}");
        Ok(commit_hash)
    }

    /// Delete a workpad's branch and mark the record deleted.
    ///
    /// The record is retained for audit. Without `force` a branch holding
    /// unmerged checkpoints is refused by git.
    pub fn delete_workpad(&mut self, pad_id: &str, force: bool) -> GitResult<()> {
        let pad = self.require_workpad(pad_id)?.clone();

        let was_active = pad.status == WorkpadStatus::Active;
        if was_active {
            let repo = self.require_repository(&pad.repo_id)?;
            let runner = self.runner_for(repo);
            runner.checkout(&repo.trunk_branch)?;
            runner.delete_branch(&pad.branch_name, force)?;
        }

        let now = Utc::now();
        if let Some(pad) = self.workpads.get_mut(pad_id) {
            pad.status = WorkpadStatus::Deleted;
            pad.last_activity = now;
        }
        if was_active {
            if let Some(repo) = self.repositories.get_mut(&pad.repo_id) {
                repo.workpad_count = repo.workpad_count.saturating_sub(1);
                repo.last_activity = now;
            }
        }
        self.save_metadata()?;

        info!("workpad deleted: {pad_id}");
        Ok(())
    }

    /// Unified diff of the workpad against a base (`trunk` by default).
    pub fn diff(&self, pad_id: &str, base: Option<&str>) -> GitResult<String> {
        let pad = self.require_workpad(pad_id)?;
        let repo = self.require_repository(&pad.repo_id)?;
        let runner = self.runner_for(repo);
        let base_ref = match base {
            None | Some("trunk") => repo.trunk_branch.as_str(),
            Some(other) => other,
        };
        runner.diff(base_ref, &pad.branch_name)
    }

    /// Structured diff between two workpads of the same repository.
    pub fn compare_workpads(&self, pad_a: &str, pad_b: &str) -> GitResult<WorkpadComparison> {
        let a = self.require_workpad(pad_a)?;
        let b = self.require_workpad(pad_b)?;
        if a.repo_id != b.repo_id {
            return Err(GitError::command(
                "compare",
                "workpads belong to different repositories",
            ));
        }

        let repo = self.require_repository(&a.repo_id)?;
        let runner = self.runner_for(repo);
        let diff = runner.diff(&a.branch_name, &b.branch_name)?;
        let files = runner.diff_name_only(&format!("{}..{}", a.branch_name, b.branch_name))?;

        Ok(WorkpadComparison {
            pad_a: PadRef {
                id: a.id.clone(),
                title: a.title.clone(),
                branch: a.branch_name.clone(),
            },
            pad_b: PadRef {
                id: b.id.clone(),
                title: b.title.clone(),
                branch: b.branch_name.clone(),
            },
            files_changed: files.len(),
            diff,
        })
    }

    /// Dry-run a promotion: ahead/behind counts, touched files, and the
    /// overlap that would conflict if trunk has moved.
    pub fn merge_preview(&self, pad_id: &str) -> GitResult<MergePreview> {
        let pad = self.require_workpad(pad_id)?;
        let repo = self.require_repository(&pad.repo_id)?;
        let runner = self.runner_for(repo);

        let ahead =
            runner.rev_list_count(&format!("{}..{}", repo.trunk_branch, pad.branch_name))?;
        let behind =
            runner.rev_list_count(&format!("{}..{}", pad.branch_name, repo.trunk_branch))?;
        let can_fast_forward = behind == 0;

        let files =
            runner.diff_name_only(&format!("{}...{}", repo.trunk_branch, pad.branch_name))?;

        let conflicts = if can_fast_forward {
            Vec::new()
        } else {
            let base = runner.merge_base(&repo.trunk_branch, &pad.branch_name)?;
            let trunk_side: HashSet<String> = runner
                .diff_name_only(&format!("{}..{}", base, repo.trunk_branch))?
                .into_iter()
                .collect();
            runner
                .diff_name_only(&format!("{}..{}", base, pad.branch_name))?
                .into_iter()
                .filter(|file| trunk_side.contains(file))
                .collect()
        };

        let tests_green = pad.test_status != Some(TestStatus::Red);
        let ready_to_promote = can_fast_forward && conflicts.is_empty() && tests_green;

        Ok(MergePreview {
            pad_id: pad_id.to_string(),
            can_fast_forward,
            commits_ahead: ahead,
            commits_behind: behind,
            files_changed: files.len(),
            conflicts,
            ready_to_promote,
        })
    }

    /// Delete workpads whose last activity is older than `days`, optionally
    /// restricted to one repository and one status. Returns the deleted ids.
    pub fn cleanup_workpads(
        &mut self,
        repo_id: Option<&str>,
        days: i64,
        status: Option<WorkpadStatus>,
    ) -> GitResult<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let candidates: Vec<String> = self
            .workpads
            .values()
            .filter(|pad| pad.status != WorkpadStatus::Deleted)
            .filter(|pad| repo_id.is_none_or(|r| pad.repo_id == r))
            .filter(|pad| status.is_none_or(|s| pad.status == s))
            .filter(|pad| pad.last_activity < cutoff)
            .map(|pad| pad.id.clone())
            .collect();

        let mut deleted = Vec::new();
        for pad_id in candidates {
            match self.delete_workpad(&pad_id, true) {
                Ok(()) => deleted.push(pad_id),
                Err(err) => warn!("cleanup failed to delete {pad_id}: {err}"),
            }
        }

        info!("cleanup removed {} workpad(s)", deleted.len());
        Ok(deleted)
    }

    /// Resolve every checkpoint of a workpad to its commit.
    ///
    /// Checkpoint tags outlive the workpad branch, so this also works for
    /// promoted pads.
    pub fn checkpoints(&self, pad_id: &str) -> GitResult<Vec<Checkpoint>> {
        let pad = self.require_workpad(pad_id)?;
        let repo = self.require_repository(&pad.repo_id)?;
        let runner: GitRunner = self.runner_for(repo);

        let mut checkpoints = Vec::with_capacity(pad.checkpoints.len());
        for checkpoint_id in &pad.checkpoints {
            let tag_name = pad.checkpoint_tag(checkpoint_id);
            let commit_hash = runner.rev_parse(&tag_name)?;
            let message = runner.commit_subject(&tag_name)?;
            let created_at = runner
                .commit_timestamp(&tag_name)
                .ok()
                .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                .map(|ts| ts.with_timezone(&Utc))
                .unwrap_or(pad.created_at);

            checkpoints.push(Checkpoint {
                id: checkpoint_id.clone(),
                pad_id: pad.id.clone(),
                tag_name,
                commit_hash,
                message,
                created_at,
            });
        }
        Ok(checkpoints)
    }
}
