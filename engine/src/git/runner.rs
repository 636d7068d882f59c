//! Thin subprocess wrapper around the `git` binary.
//!
//! Every repository operation in the engine goes through a [`GitRunner`]
//! bound to one working directory. Stdout is captured and trimmed; a
//! non-zero exit surfaces stderr in the error message.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::git::error::{GitError, GitResult};

/// Identity configured on every repository the engine initializes, so
/// commits never depend on ambient git configuration.
const COMMIT_USER_NAME: &str = "Workpad Engine";
const COMMIT_USER_EMAIL: &str = "engine@sologit.local";

/// Runs git commands inside a single working directory.
pub struct GitRunner {
    dir: PathBuf,
}

impl GitRunner {
    /// Create a runner for an existing repository directory.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Initialize a fresh repository in `dir` and return a runner for it.
    pub fn init(dir: impl AsRef<Path>) -> GitResult<Self> {
        let runner = Self::new(dir);
        runner.run(&["init"])?;
        runner.set_local_identity()?;
        Ok(runner)
    }

    /// Clone `url` into `dest` and return a runner for the clone.
    pub fn clone_into(url: &str, dest: &Path) -> GitResult<Self> {
        let dest_arg = dest.display().to_string();
        let output = Command::new("git")
            .args(["clone", url, &dest_arg])
            .output()
            .map_err(|e| GitError::command("clone", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::command("clone", stderr.trim().to_string()));
        }

        let runner = Self::new(dest);
        runner.set_local_identity()?;
        Ok(runner)
    }

    /// Run a git command and return trimmed stdout.
    pub fn run(&self, args: &[&str]) -> GitResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .map_err(|e| GitError::command("execute", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::command(args.join(" "), stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Set a deterministic local commit identity.
    pub fn set_local_identity(&self) -> GitResult<()> {
        self.run(&["config", "user.name", COMMIT_USER_NAME])?;
        self.run(&["config", "user.email", COMMIT_USER_EMAIL])?;
        Ok(())
    }

    /// Resolve a revision to its full commit hash.
    pub fn rev_parse(&self, rev: &str) -> GitResult<String> {
        self.run(&["rev-parse", rev])
    }

    /// Name of the currently checked-out branch.
    pub fn current_branch(&self) -> GitResult<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Check out an existing branch or revision.
    pub fn checkout(&self, rev: &str) -> GitResult<()> {
        self.run(&["checkout", rev])?;
        Ok(())
    }

    /// Create a branch at HEAD and check it out.
    pub fn create_branch(&self, name: &str) -> GitResult<()> {
        self.run(&["checkout", "-b", name])?;
        Ok(())
    }

    /// Delete a branch. `force` discards unmerged commits.
    pub fn delete_branch(&self, name: &str, force: bool) -> GitResult<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, name])?;
        Ok(())
    }

    /// Rename the current branch.
    pub fn rename_branch(&self, name: &str) -> GitResult<()> {
        self.run(&["branch", "-M", name])?;
        Ok(())
    }

    /// Stage every change in the working tree.
    pub fn add_all(&self) -> GitResult<()> {
        self.run(&["add", "-A"])?;
        Ok(())
    }

    /// Create a commit from the index.
    pub fn commit(&self, message: &str) -> GitResult<()> {
        self.run(&["commit", "-m", message])?;
        Ok(())
    }

    /// Create a lightweight tag at HEAD.
    pub fn tag(&self, name: &str) -> GitResult<()> {
        self.run(&["tag", name])?;
        Ok(())
    }

    /// Apply a patch file to the working tree, fixing whitespace errors.
    /// With `check_only` the tree is left untouched and only applicability
    /// is verified.
    pub fn apply(&self, patch_file: &Path, check_only: bool) -> GitResult<()> {
        let path_arg = patch_file.display().to_string();
        let mut args = vec!["apply"];
        if check_only {
            args.push("--check");
        }
        args.push("--whitespace=fix");
        args.push(&path_arg);
        self.run(&args)?;
        Ok(())
    }

    /// Fast-forward-only merge of `branch` into the current branch.
    pub fn merge_ff_only(&self, branch: &str) -> GitResult<()> {
        self.run(&["merge", "--ff-only", branch])?;
        Ok(())
    }

    /// Merge base of two revisions.
    pub fn merge_base(&self, a: &str, b: &str) -> GitResult<String> {
        self.run(&["merge-base", a, b])
    }

    /// Number of commits in a revision range (e.g. `main..pads/foo`).
    pub fn rev_list_count(&self, range: &str) -> GitResult<u32> {
        let output = self.run(&["rev-list", "--count", range])?;
        output
            .parse()
            .map_err(|_| GitError::command("rev-list", format!("unparseable count {output:?}")))
    }

    /// Unified diff between two revisions.
    pub fn diff(&self, base: &str, target: &str) -> GitResult<String> {
        self.run(&["diff", base, target])
    }

    /// Diff of the working tree against a revision, limited to `paths`.
    pub fn diff_worktree(&self, rev: &str, paths: &[&str]) -> GitResult<String> {
        let mut args = vec!["diff", rev, "--"];
        args.extend_from_slice(paths);
        self.run(&args)
    }

    /// File paths touched in a revision range.
    pub fn diff_name_only(&self, range: &str) -> GitResult<Vec<String>> {
        let output = self.run(&["diff", "--name-only", range])?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect())
    }

    /// Hard reset the current branch, index, and working tree.
    pub fn reset_hard(&self, rev: &str) -> GitResult<()> {
        self.run(&["reset", "--hard", rev])?;
        Ok(())
    }

    /// Subject line of a commit.
    pub fn commit_subject(&self, rev: &str) -> GitResult<String> {
        self.run(&["log", "-1", "--format=%s", rev])
    }

    /// Author timestamp of a commit in strict ISO-8601 form.
    pub fn commit_timestamp(&self, rev: &str) -> GitResult<String> {
        self.run(&["log", "-1", "--format=%aI", rev])
    }
}
