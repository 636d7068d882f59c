//! Plan generation: prompt assembly and structured-plan parsing.
//!
//! The planner asks the channel for a JSON plan and tolerates the usual
//! model output quirks: markdown fences, prose around the JSON, missing
//! optional fields. When nothing parseable comes back, a minimal plan is
//! built from the raw content; when the channel itself fails, the
//! orchestrator substitutes [`PlanningEngine::fallback_plan`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai::channel::{AiChannel, AiError, ChatMessage, ChatRequest, ChatResponse, DeploymentRef};
use crate::ai::classifier::RepoContext;
use crate::ai::router::ModelEntry;

/// Maximum file-tree entries included in the planning context.
const FILE_TREE_LIMIT: usize = 20;

/// Maximum characters of raw content kept when a plan fails to parse.
const RAW_DESCRIPTION_LIMIT: usize = 500;

const PLANNING_SYSTEM_PROMPT: &str = "\
You are an expert software architect for a workpad-based version control system.

Analyze the user's request and produce a concrete, actionable implementation plan.

For each request:
1. Understand the intent and scope
2. Identify which files must be created, modified, or deleted
3. Plan the implementation strategy
4. Consider how the change should be tested
5. Call out risks and external dependencies

Respond with a JSON object in exactly this shape:
{
  \"title\": \"Brief title for the change\",
  \"description\": \"What will be implemented and how\",
  \"file_changes\": [
    {
      \"path\": \"path/to/file\",
      \"action\": \"create|modify|delete\",
      \"reason\": \"Why this file changes\",
      \"estimated_lines\": 50
    }
  ],
  \"test_strategy\": \"How this change should be tested\",
  \"risks\": [\"Potential risk\"],
  \"dependencies\": [\"External dependency\"],
  \"estimated_complexity\": \"low|medium|high\"
}

Be specific and practical, and respect the existing structure of the codebase.";

/// Planned action on one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Modify => write!(f, "modify"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One planned file change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    pub reason: String,
    #[serde(default)]
    pub estimated_lines: u32,
}

/// Complexity the planner assigned to its own plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanComplexity {
    Low,
    Medium,
    High,
    Unknown,
}

impl Default for PlanComplexity {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for PlanComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A structured implementation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodePlan {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub estimated_complexity: PlanComplexity,
}

impl std::fmt::Display for CodePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "# {}", self.title)?;
        writeln!(f)?;
        writeln!(f, "{}", self.description)?;
        writeln!(f)?;
        writeln!(f, "## File Changes:")?;
        for change in &self.file_changes {
            writeln!(f, "  - {}: {}", change.action.to_string().to_uppercase(), change.path)?;
            writeln!(f, "    Reason: {}", change.reason)?;
            if change.estimated_lines > 0 {
                writeln!(f, "    Est. lines: {}", change.estimated_lines)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "## Test Strategy:")?;
        writeln!(f, "  {}", self.test_strategy)?;
        writeln!(f)?;
        writeln!(f, "## Risks:")?;
        for risk in &self.risks {
            writeln!(f, "  - {risk}")?;
        }
        if !self.dependencies.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Dependencies:")?;
            for dependency in &self.dependencies {
                writeln!(f, "  - {dependency}")?;
            }
        }
        writeln!(f)?;
        write!(
            f,
            "## Complexity: {}",
            self.estimated_complexity.to_string().to_uppercase()
        )
    }
}

/// Plan plus the channel response that produced it.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: CodePlan,
    pub response: ChatResponse,
}

/// Generates implementation plans through the AI channel.
#[derive(Debug, Default)]
pub struct PlanningEngine;

impl PlanningEngine {
    pub fn new() -> Self {
        Self
    }

    /// Ask the channel for a plan.
    ///
    /// Channel failures surface as [`AiError`]; unparseable content never
    /// fails, it degrades to a minimal plan wrapping the raw text.
    pub fn generate_plan(
        &self,
        channel: &dyn AiChannel,
        prompt: &str,
        repo_context: Option<&RepoContext>,
        model: &ModelEntry,
        deployment: Option<DeploymentRef>,
    ) -> Result<PlanOutcome, AiError> {
        info!("generating plan for: {}", truncate(prompt, 100));

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(PLANNING_SYSTEM_PROMPT),
                ChatMessage::user(build_context_message(prompt, repo_context)),
            ],
            model: model.name.clone(),
            max_tokens: model.max_tokens,
            temperature: model.temperature,
            deployment,
        };

        let response = channel.chat(&request)?;
        let plan = Self::parse_plan(&response.content);
        info!("generated plan with {} file change(s)", plan.file_changes.len());

        Ok(PlanOutcome { plan, response })
    }

    /// Parse model output into a plan.
    ///
    /// Ladder: strip markdown fences and parse; extract the outermost
    /// brace block and parse; finally wrap the raw content in a minimal
    /// plan structure.
    pub fn parse_plan(content: &str) -> CodePlan {
        let stripped = strip_fences(content);

        if let Ok(plan) = serde_json::from_str::<CodePlan>(stripped) {
            return plan;
        }

        if let Ok(brace_re) = Regex::new(r"(?s)\{.*\}") {
            if let Some(found) = brace_re.find(stripped) {
                if let Ok(plan) = serde_json::from_str::<CodePlan>(found.as_str()) {
                    return plan;
                }
            }
        }

        warn!("failed to parse plan JSON, wrapping raw content");
        CodePlan {
            title: "Implementation Plan".to_string(),
            description: truncate(stripped, RAW_DESCRIPTION_LIMIT).to_string(),
            file_changes: Vec::new(),
            test_strategy: "Add tests".to_string(),
            risks: Vec::new(),
            dependencies: Vec::new(),
            estimated_complexity: PlanComplexity::Medium,
        }
    }

    /// Minimal plan used when the channel call itself fails.
    pub fn fallback_plan(prompt: &str) -> CodePlan {
        CodePlan {
            title: "Basic Implementation".to_string(),
            description: format!("Implement: {prompt}"),
            file_changes: Vec::new(),
            test_strategy: "Add tests after implementation".to_string(),
            risks: vec!["Planning failed, proceeding with basic approach".to_string()],
            dependencies: Vec::new(),
            estimated_complexity: PlanComplexity::Unknown,
        }
    }
}

fn build_context_message(prompt: &str, repo_context: Option<&RepoContext>) -> String {
    let mut parts = vec![format!("User request: {prompt}")];

    if let Some(context) = repo_context {
        if !context.file_tree.is_empty() {
            let listing: Vec<String> = context
                .file_tree
                .iter()
                .take(FILE_TREE_LIMIT)
                .map(|entry| format!("  - {entry}"))
                .collect();
            parts.push(format!("\nRepository structure:\n{}", listing.join("\n")));
        }
        if let Some(recent) = &context.recent_changes {
            parts.push(format!("\nRecent changes:\n{recent}"));
        }
        if let Some(language) = &context.language {
            parts.push(format!("\nPrimary language: {language}"));
        }
    }

    parts.join("\n")
}

/// Strip a single layer of markdown fences from model output.
fn strip_fences(content: &str) -> &str {
    let mut content = content.trim();
    if let Some(rest) = content.strip_prefix("```json") {
        content = rest;
    } else if let Some(rest) = content.strip_prefix("```") {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix("```") {
        content = rest;
    }
    content.trim()
}

/// Truncate to at most `limit` characters on a char boundary.
pub(crate) fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
