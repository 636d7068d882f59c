//! Patch generation: plan-to-diff prompting and diff extraction.
//!
//! Model output rarely arrives as a clean unified diff, so extraction
//! walks a ladder: a fenced `diff` block, any fenced block, the suffix
//! starting at the first diff marker, and finally the raw content.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai::channel::{AiChannel, AiError, ChatMessage, ChatRequest, ChatResponse, DeploymentRef};
use crate::ai::planning::{CodePlan, FileAction};
use crate::ai::router::ModelEntry;
use crate::patch::PatchStats;

/// Existing file contents longer than this are truncated in the prompt.
const FILE_CONTENT_LIMIT: usize = 2_000;

const CODING_SYSTEM_PROMPT: &str = "\
You are an expert software developer working inside a workpad-based version control system.

Generate clean, well-structured code patches from implementation plans.

Guidelines:
1. Write idiomatic, readable code
2. Follow the existing style and conventions of the codebase
3. Handle errors appropriately
4. Keep the change testable
5. Output patches in unified diff format

Use `diff --git a/X b/X` headers with `---`/`+++` file markers and `@@` hunks.
For new files use /dev/null as the source side; for deletions use /dev/null as
the target side.

Only output the patch itself, with no explanatory text outside the diff.";

/// A generated code patch with its summary counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPatch {
    pub diff: String,
    pub files_changed: Vec<String>,
    pub additions: usize,
    pub deletions: usize,
    pub model: String,
    /// Generator's confidence in `[0, 1]`.
    pub confidence: f64,
}

impl std::fmt::Display for GeneratedPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "patch: {} file(s) changed, +{} -{} lines",
            self.files_changed.len(),
            self.additions,
            self.deletions
        )
    }
}

/// Patch plus the channel response that produced it.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub patch: GeneratedPatch,
    pub response: ChatResponse,
}

/// Generates code patches through the AI channel.
#[derive(Debug, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Ask the channel for a patch implementing `plan`.
    pub fn generate_patch(
        &self,
        channel: &dyn AiChannel,
        plan: &CodePlan,
        file_contents: Option<&BTreeMap<String, String>>,
        model: &ModelEntry,
        deployment: Option<DeploymentRef>,
    ) -> Result<GenerationOutcome, AiError> {
        info!("generating patch for: {}", plan.title);

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(CODING_SYSTEM_PROMPT),
                ChatMessage::user(build_generation_context(plan, file_contents)),
            ],
            model: model.name.clone(),
            max_tokens: model.max_tokens,
            temperature: model.temperature,
            deployment,
        };

        let response = channel.chat(&request)?;
        let patch = Self::patch_from_content(&response.content, &response.model, &model.name);
        info!("generated {patch}");

        Ok(GenerationOutcome { patch, response })
    }

    /// Feed failure output back to the model to refine a patch.
    ///
    /// Callers degrade to the original patch when the channel fails.
    pub fn refine_patch(
        &self,
        channel: &dyn AiChannel,
        original: &GeneratedPatch,
        feedback: &str,
        model: &ModelEntry,
        deployment: Option<DeploymentRef>,
    ) -> Result<GenerationOutcome, AiError> {
        info!("refining patch based on feedback");

        let context = format!(
            "Original patch:\n```diff\n{}\n```\n\nFeedback/Errors:\n{feedback}\n\n\
             Generate an improved patch that addresses this feedback.",
            original.diff
        );
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(CODING_SYSTEM_PROMPT),
                ChatMessage::user(context),
            ],
            model: model.name.clone(),
            max_tokens: model.max_tokens,
            temperature: model.temperature,
            deployment,
        };

        let response = channel.chat(&request)?;
        let patch = Self::patch_from_content(&response.content, &response.model, &model.name);
        Ok(GenerationOutcome { patch, response })
    }

    fn patch_from_content(content: &str, response_model: &str, requested_model: &str) -> GeneratedPatch {
        let diff = extract_diff(content);
        let stats = PatchStats::from_diff(&diff);
        let model = if response_model.is_empty() {
            requested_model.to_string()
        } else {
            response_model.to_string()
        };

        GeneratedPatch {
            diff,
            files_changed: stats.files_list,
            additions: stats.additions,
            deletions: stats.deletions,
            model,
            confidence: 0.8,
        }
    }

    /// Minimal patch used when generation fails entirely: a TODO note
    /// that keeps the pipeline moving without pretending to implement
    /// the plan.
    pub fn fallback_patch(plan: &CodePlan) -> GeneratedPatch {
        let description = crate::ai::planning::truncate(&plan.description, 100);
        let diff = format!(
            "--- a/TODO.md\n+++ b/TODO.md\n@@ -1,1 +1,3 @@\n+# TODO: {}\n+{}\n+\n",
            plan.title, description
        );

        GeneratedPatch {
            diff,
            files_changed: vec!["TODO.md".to_string()],
            additions: 3,
            deletions: 0,
            model: "fallback".to_string(),
            confidence: 0.1,
        }
    }
}

fn build_generation_context(
    plan: &CodePlan,
    file_contents: Option<&BTreeMap<String, String>>,
) -> String {
    let mut parts = vec![
        format!("Implementation Plan: {}", plan.title),
        format!("\n{}", plan.description),
        "\nFile Changes:".to_string(),
    ];

    for change in &plan.file_changes {
        parts.push(format!(
            "  - {}: {}",
            change.action.to_string().to_uppercase(),
            change.path
        ));
        parts.push(format!("    Reason: {}", change.reason));

        if change.action == FileAction::Modify {
            if let Some(content) = file_contents.and_then(|files| files.get(&change.path)) {
                let shown = if content.len() > FILE_CONTENT_LIMIT {
                    format!(
                        "{}\n... (truncated)",
                        crate::ai::planning::truncate(content, FILE_CONTENT_LIMIT)
                    )
                } else {
                    content.clone()
                };
                parts.push(format!("    Current content:\n```\n{shown}\n```"));
            }
        }
    }

    parts.push(format!("\nTest Strategy: {}", plan.test_strategy));
    parts.push("\nGenerate a unified diff patch that implements this plan.".to_string());
    parts.join("\n")
}

/// Extract the diff from model output.
///
/// Ladder: fenced `diff` block, any fenced block, the suffix starting at
/// the first `---`/`+++`/`@@` marker, then the raw content.
pub fn extract_diff(content: &str) -> String {
    let content = content.trim();

    if let Ok(fence_re) = Regex::new(r"(?s)```diff\s*\n(.*?)\n```") {
        if let Some(captures) = fence_re.captures(content) {
            if let Some(body) = captures.get(1) {
                return body.as_str().trim().to_string();
            }
        }
    }

    if let Ok(fence_re) = Regex::new(r"(?s)```\s*\n(.*?)\n```") {
        if let Some(captures) = fence_re.captures(content) {
            if let Some(body) = captures.get(1) {
                return body.as_str().trim().to_string();
            }
        }
    }

    let mut diff_lines: Vec<&str> = Vec::new();
    let mut in_diff = false;
    for line in content.lines() {
        if line.starts_with("---") || line.starts_with("+++") || line.starts_with("@@") {
            in_diff = true;
        }
        if in_diff {
            diff_lines.push(line);
        }
    }
    if !diff_lines.is_empty() {
        return diff_lines.join("\n");
    }

    warn!("no diff markers found in model output, passing content through");
    content.to_string()
}
