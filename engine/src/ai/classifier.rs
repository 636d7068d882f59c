//! Prompt complexity analysis.
//!
//! Scores a prompt plus optional repository context into bounded
//! [`ComplexityMetrics`] that drive tier selection in the router.

use serde::{Deserialize, Serialize};

use crate::patch::PatchStats;

/// Keywords that mark a task as security-sensitive.
const SECURITY_KEYWORDS: &[&str] = &[
    "auth",
    "authentication",
    "password",
    "token",
    "jwt",
    "crypto",
    "encrypt",
    "decrypt",
    "secret",
    "key",
    "security",
    "permission",
    "authorization",
    "oauth",
    "session",
    "cookie",
    "cors",
    "xss",
    "csrf",
    "sql",
];

/// Keywords that mark a task as architectural.
const ARCHITECTURE_KEYWORDS: &[&str] = &[
    "architecture",
    "design",
    "refactor",
    "restructure",
    "migrate",
    "framework",
    "pattern",
    "system",
    "database",
    "api design",
    "schema",
    "model",
    "interface",
];

/// Estimated patch sizes are capped here.
const PATCH_SIZE_CAP: u32 = 500;

/// Summary of a workpad diff fed into complexity analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub lines_changed: u32,
    pub files_changed: u32,
}

impl From<&PatchStats> for DiffSummary {
    fn from(stats: &PatchStats) -> Self {
        Self {
            lines_changed: stats.total_changes as u32,
            files_changed: stats.files_affected as u32,
        }
    }
}

/// Context handed to planning and complexity analysis.
#[derive(Debug, Clone, Default)]
pub struct RepoContext {
    /// Repository file listing shown to the planner (truncated to 20).
    pub file_tree: Vec<String>,
    pub recent_changes: Option<String>,
    pub language: Option<String>,
    /// Caller's estimate of how many files the task touches.
    pub file_count: Option<u32>,
    pub workpad_id: Option<String>,
    pub diff_summary: Option<DiffSummary>,
}

/// Bounded metrics describing how demanding a task looks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// Overall score in `[0, 1]`.
    pub score: f64,
    pub security_sensitive: bool,
    /// Estimated patch size in lines, capped at 500.
    pub estimated_patch_size: u32,
    pub file_count: u32,
    pub has_tests: bool,
    pub requires_architecture: bool,
}

impl std::fmt::Display for ComplexityMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "complexity(score={:.2}, security={}, patch_lines={}, files={})",
            self.score, self.security_sensitive, self.estimated_patch_size, self.file_count
        )
    }
}

/// Keyword- and size-driven complexity analysis.
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    /// Analyze a prompt with optional repository context.
    pub fn analyze(prompt: &str, context: &RepoContext) -> ComplexityMetrics {
        let prompt_lower = prompt.to_lowercase();

        let security_sensitive = SECURITY_KEYWORDS
            .iter()
            .any(|keyword| prompt_lower.contains(keyword));
        let requires_architecture = ARCHITECTURE_KEYWORDS
            .iter()
            .any(|keyword| prompt_lower.contains(keyword));

        let mut estimated_patch_size = Self::estimate_patch_size(&prompt_lower, prompt);
        let diff = context.diff_summary.unwrap_or_default();
        if diff.lines_changed > 0 {
            estimated_patch_size = estimated_patch_size.max(diff.lines_changed);
        }

        let mut file_count = context.file_count.unwrap_or(1);
        if diff.files_changed > 0 {
            file_count = file_count.max(diff.files_changed);
        }
        if prompt_lower.contains("multiple files") || prompt_lower.contains("several files") {
            file_count = file_count.max(3);
        }

        let has_tests = prompt_lower.contains("test") || prompt_lower.contains("spec");

        let mut score: f64 = 0.0;

        // Size contribution (0.0 to 0.3).
        if estimated_patch_size < 50 {
            // no contribution
        } else if estimated_patch_size < 100 {
            score += 0.1;
        } else if estimated_patch_size < 200 {
            score += 0.2;
        } else {
            score += 0.3;
        }

        // File-count contribution (0.0 to 0.2).
        score += (f64::from(file_count) * 0.05).min(0.2);

        if security_sensitive {
            score += 0.3;
        }
        if requires_architecture {
            score += 0.2;
        }

        // Repository context contribution (0.0 to 0.2).
        if diff.lines_changed > 200 {
            score += 0.1;
        }
        if diff.files_changed > 5 {
            score += 0.1;
        }

        let score = score.clamp(0.0, 1.0);

        ComplexityMetrics {
            score,
            security_sensitive,
            estimated_patch_size,
            file_count,
            has_tests,
            requires_architecture,
        }
    }

    /// Heuristic patch size: word count doubled, scaled by intent
    /// keywords, capped at [`PATCH_SIZE_CAP`].
    fn estimate_patch_size(prompt_lower: &str, prompt: &str) -> u32 {
        let mut size = prompt.split_whitespace().count() as f64 * 2.0;

        if ["add", "create", "implement", "new"]
            .iter()
            .any(|kw| prompt_lower.contains(kw))
        {
            size *= 1.5;
        }
        if ["refactor", "redesign", "restructure"]
            .iter()
            .any(|kw| prompt_lower.contains(kw))
        {
            size *= 2.0;
        }
        if prompt_lower.contains("simple") || prompt_lower.contains("quick") {
            size *= 0.5;
        }

        (size as u32).min(PATCH_SIZE_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_keywords_flag() {
        let metrics = ComplexityAnalyzer::analyze(
            "implement JWT authentication with secure password hashing",
            &RepoContext::default(),
        );
        assert!(metrics.security_sensitive);
        assert!(metrics.score >= 0.3);
    }

    #[test]
    fn test_architecture_flag() {
        let metrics =
            ComplexityAnalyzer::analyze("refactor the database schema", &RepoContext::default());
        assert!(metrics.requires_architecture);
    }

    #[test]
    fn test_plain_prompt_is_low_complexity() {
        let metrics = ComplexityAnalyzer::analyze("fix typo in greeting", &RepoContext::default());
        assert!(!metrics.security_sensitive);
        assert!(!metrics.requires_architecture);
        assert!(metrics.score < 0.3);
        assert_eq!(metrics.file_count, 1);
    }

    #[test]
    fn test_has_tests_detection() {
        assert!(
            ComplexityAnalyzer::analyze("add unit tests for parser", &RepoContext::default())
                .has_tests
        );
        assert!(
            !ComplexityAnalyzer::analyze("add parser feature", &RepoContext::default()).has_tests
        );
    }

    #[test]
    fn test_patch_size_modifiers() {
        // 4 words * 2 = 8, "quick" halves it.
        let metrics = ComplexityAnalyzer::analyze("quick rename of variable", &RepoContext::default());
        assert_eq!(metrics.estimated_patch_size, 4);

        // "refactor" doubles, long prompts cap at 500.
        let long_prompt = "refactor ".repeat(200);
        let metrics = ComplexityAnalyzer::analyze(&long_prompt, &RepoContext::default());
        assert_eq!(metrics.estimated_patch_size, 500);
    }

    #[test]
    fn test_multiple_files_raises_file_count() {
        let metrics = ComplexityAnalyzer::analyze(
            "update copyright across multiple files",
            &RepoContext::default(),
        );
        assert_eq!(metrics.file_count, 3);
    }

    #[test]
    fn test_context_overrides_take_max() {
        let context = RepoContext {
            file_count: Some(2),
            diff_summary: Some(DiffSummary {
                lines_changed: 450,
                files_changed: 8,
            }),
            ..RepoContext::default()
        };
        let metrics = ComplexityAnalyzer::analyze("touch up docs", &RepoContext::default());
        let with_context = ComplexityAnalyzer::analyze("touch up docs", &context);

        assert!(with_context.estimated_patch_size >= 450);
        assert_eq!(with_context.file_count, 8);
        assert!(with_context.score > metrics.score);
    }

    #[test]
    fn test_score_clamped_to_unit_interval() {
        let context = RepoContext {
            file_count: Some(40),
            diff_summary: Some(DiffSummary {
                lines_changed: 10_000,
                files_changed: 50,
            }),
            ..RepoContext::default()
        };
        let metrics = ComplexityAnalyzer::analyze(
            "refactor the authentication system architecture and migrate the database schema",
            &context,
        );
        assert!(metrics.score <= 1.0);
        assert!(metrics.score >= 0.0);
        assert_eq!(metrics.score, 1.0);
    }

    #[test]
    fn test_diff_summary_from_stats() {
        let patch = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1 +1,2 @@
 fn a() {}
+fn b() {}
";
        let stats = PatchStats::from_diff(patch);
        let summary = DiffSummary::from(&stats);
        assert_eq!(summary.lines_changed, 1);
        assert_eq!(summary.files_changed, 1);
    }
}
