//! Pure unified-diff analysis: stats, complexity, splitting, combining.
//!
//! Nothing here touches a repository. Counting rules: additions are lines
//! starting with `+` excluding `+++`, deletions are lines starting with
//! `-` excluding `---`, hunks are lines starting with `@@`. File paths
//! come from `---`/`+++` headers with the `a/`/`b/` prefix stripped and
//! `/dev/null` excluded.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Size classification of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchComplexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl PatchComplexity {
    /// Bucket a patch by total changed lines and file count.
    pub fn classify(total_changes: usize, files_affected: usize) -> Self {
        if total_changes < 10 && files_affected == 1 {
            Self::Trivial
        } else if total_changes < 50 && files_affected <= 3 {
            Self::Simple
        } else if total_changes < 200 && files_affected <= 10 {
            Self::Moderate
        } else if total_changes < 500 && files_affected <= 20 {
            Self::Complex
        } else {
            Self::VeryComplex
        }
    }
}

impl std::fmt::Display for PatchComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
            Self::VeryComplex => write!(f, "very_complex"),
        }
    }
}

/// Line and file counts extracted from a unified diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchStats {
    pub files_affected: usize,
    /// Sorted list of touched paths.
    pub files_list: Vec<String>,
    pub additions: usize,
    pub deletions: usize,
    pub total_changes: usize,
    pub hunks: usize,
    pub complexity: PatchComplexity,
}

impl PatchStats {
    /// Parse a unified diff into counts.
    pub fn from_diff(patch: &str) -> Self {
        let mut files = BTreeSet::new();
        let mut additions = 0;
        let mut deletions = 0;
        let mut hunks = 0;

        for line in patch.lines() {
            if line.starts_with("@@") {
                hunks += 1;
            } else if line.starts_with('+') && !line.starts_with("+++") {
                additions += 1;
            } else if line.starts_with('-') && !line.starts_with("---") {
                deletions += 1;
            } else if line.starts_with("---") || line.starts_with("+++") {
                if let Some(path) = header_path(line) {
                    files.insert(path);
                }
            }
        }

        let total_changes = additions + deletions;
        let files_list: Vec<String> = files.into_iter().collect();
        let complexity = PatchComplexity::classify(total_changes, files_list.len());

        Self {
            files_affected: files_list.len(),
            files_list,
            additions,
            deletions,
            total_changes,
            hunks,
            complexity,
        }
    }
}

/// Extract the path from a `---`/`+++` header line, stripping `a/`/`b/`
/// prefixes and skipping `/dev/null`.
fn header_path(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let _marker = parts.next()?;
    let raw = parts.next()?;
    let path = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    if path.is_empty() || path == "/dev/null" {
        return None;
    }
    Some(path.to_string())
}

/// Structural validation report for a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Structurally validate a patch without touching a repository.
///
/// An empty patch is an error; a missing `diff --git` header and missing
/// hunk headers are warnings.
pub fn validate_syntax(patch: &str) -> SyntaxReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if patch.trim().is_empty() {
        errors.push("Patch is empty".to_string());
        return SyntaxReport {
            valid: false,
            errors,
            warnings,
        };
    }

    let mut has_diff_header = false;
    let mut has_hunks = false;
    for line in patch.lines() {
        if line.starts_with("diff --git") {
            has_diff_header = true;
        } else if line.starts_with("@@") {
            has_hunks = true;
        }
    }

    if !has_diff_header {
        warnings.push("No 'diff --git' header found".to_string());
    }
    if !has_hunks {
        warnings.push("No hunks found in patch".to_string());
    }

    SyntaxReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Split a multi-file patch at each `diff --git` boundary.
///
/// Returns `(path, sub-patch)` pairs in the order files appear. Lines
/// before the first `diff --git` header are dropped.
pub fn split_by_file(patch: &str) -> Vec<(String, String)> {
    let mut patches: Vec<(String, String)> = Vec::new();
    let mut current_file: Option<String> = None;
    let mut current_lines: Vec<&str> = Vec::new();

    for line in patch.lines() {
        if line.starts_with("diff --git") {
            if let Some(file) = current_file.take() {
                patches.push((file, current_lines.join("\n")));
            }
            current_lines = vec![line];
            current_file = diff_header_path(line);
        } else if current_file.is_some() {
            current_lines.push(line);
        }
    }
    if let Some(file) = current_file {
        patches.push((file, current_lines.join("\n")));
    }

    patches
}

/// Path named by a `diff --git a/X b/X` header.
fn diff_header_path(line: &str) -> Option<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let raw = parts[2];
    Some(raw.strip_prefix("a/").unwrap_or(raw).to_string())
}

/// Concatenate non-empty patches, separated by blank lines.
pub fn combine<S: AsRef<str>>(patches: &[S]) -> String {
    patches
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
