//! The plan → generate → review → diagnose pipeline.
//!
//! Every operation follows the same shape: analyze, pick a model, check
//! the budget, call the channel, record what it actually cost. Channel
//! failures degrade to zero-cost fallback responses; any other failure
//! gets a single escalation attempt one tier up before surfacing.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::ai::budget::{BudgetStatus, CostGuard, TaskKind};
use crate::ai::channel::{AiChannel, AiError, ChatResponse, DeploymentCredentials, DeploymentRef};
use crate::ai::classifier::{ComplexityAnalyzer, ComplexityMetrics, RepoContext};
use crate::ai::codegen::{CodeGenerator, GeneratedPatch};
use crate::ai::planning::{CodePlan, PlanComplexity, PlanningEngine};
use crate::ai::router::{ModelEntry, ModelRouter, ModelTier};

/// Multiplier applied to a plan-stage cost estimate.
const PLAN_COST_MULTIPLIER: f64 = 2.0;
/// Multiplier applied to a generation-stage cost estimate.
const GENERATION_COST_MULTIPLIER: f64 = 1.5;
/// Extra headroom required before an escalation retry.
const ESCALATION_COST_MULTIPLIER: f64 = 1.5;
/// Review flags patches with more added lines than this.
const LARGE_PATCH_ADDITIONS: usize = 200;
/// Characters of test output quoted in a diagnosis.
const DIAGNOSIS_OUTPUT_LIMIT: usize = 500;

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors raised by the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The daily budget refuses this call. No retry is attempted.
    #[error("budget exceeded, remaining: ${remaining:.2}")]
    BudgetExceeded { remaining: f64 },

    /// A forced model name is not in the configuration.
    #[error("model {0} not found in configuration")]
    ModelNotFound(String),

    /// The channel failed in a way no fallback absorbed.
    #[error(transparent)]
    Channel(#[from] AiError),
}

/// Response from [`Orchestrator::plan`].
#[derive(Debug, Clone)]
pub struct PlanResponse {
    pub plan: CodePlan,
    pub model_used: String,
    pub cost_usd: f64,
    pub complexity: ComplexityMetrics,
}

/// Response from [`Orchestrator::generate_patch`].
#[derive(Debug, Clone)]
pub struct PatchResponse {
    pub patch: GeneratedPatch,
    pub model_used: String,
    pub cost_usd: f64,
}

/// Response from [`Orchestrator::review_patch`].
#[derive(Debug, Clone)]
pub struct ReviewResponse {
    pub approved: bool,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub model_used: String,
    pub cost_usd: f64,
}

/// Model names configured per tier, for status reporting.
#[derive(Debug, Clone)]
pub struct TierModelNames {
    pub fast: Vec<String>,
    pub coding: Vec<String>,
    pub planning: Vec<String>,
}

/// Orchestrator status: budget plus configured models.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub budget: BudgetStatus,
    pub models: TierModelNames,
}

/// Coordinates model routing, budget enforcement, and the AI channel.
pub struct Orchestrator {
    channel: Box<dyn AiChannel>,
    router: ModelRouter,
    cost_guard: CostGuard,
    planning: PlanningEngine,
    codegen: CodeGenerator,
    deployments: BTreeMap<String, DeploymentCredentials>,
}

impl Orchestrator {
    pub fn new(channel: Box<dyn AiChannel>, router: ModelRouter, cost_guard: CostGuard) -> Self {
        info!("orchestrator initialized");
        Self {
            channel,
            router,
            cost_guard,
            planning: PlanningEngine::new(),
            codegen: CodeGenerator::new(),
            deployments: BTreeMap::new(),
        }
    }

    /// Register deployment credentials under a task name ("planning",
    /// "coding").
    pub fn register_deployment(&mut self, name: impl Into<String>, credentials: DeploymentCredentials) {
        self.deployments.insert(name.into(), credentials);
    }

    fn deployment_for(&self, name: &str) -> Option<DeploymentRef> {
        self.deployments.get(name).map(|credentials| DeploymentRef {
            name: name.to_string(),
            credentials: credentials.clone(),
        })
    }

    /// Generate an implementation plan for a prompt.
    ///
    /// `force_model` bypasses routing and resolves the name across all
    /// tiers. Budget refusal surfaces as [`OrchestratorError::BudgetExceeded`];
    /// a channel failure degrades to a zero-cost fallback plan.
    pub fn plan(
        &mut self,
        prompt: &str,
        repo_context: Option<&RepoContext>,
        force_model: Option<&str>,
    ) -> OrchestratorResult<PlanResponse> {
        let mut selected: Option<ModelEntry> = None;
        let mut estimated_cost = 0.0;

        match self.plan_attempt(prompt, repo_context, force_model, &mut selected, &mut estimated_cost)
        {
            Ok(response) => Ok(response),
            Err(err @ OrchestratorError::BudgetExceeded { .. }) => Err(err),
            Err(err) => {
                self.try_escalate(selected.as_ref(), estimated_cost, "planning_failure", |this, model| {
                    this.plan(prompt, repo_context, Some(model.as_str()))
                })
                .unwrap_or(Err(err))
            }
        }
    }

    fn plan_attempt(
        &mut self,
        prompt: &str,
        repo_context: Option<&RepoContext>,
        force_model: Option<&str>,
        selected: &mut Option<ModelEntry>,
        estimated_cost: &mut f64,
    ) -> OrchestratorResult<PlanResponse> {
        info!("starting planning for: {}", crate::ai::planning::truncate(prompt, 100));

        let default_context = RepoContext::default();
        let context = repo_context.unwrap_or(&default_context);
        let complexity = ComplexityAnalyzer::analyze(prompt, context);

        let model = self.resolve_model(force_model, || {
            let remaining = self.cost_guard.remaining_budget();
            self.router.select_model(prompt, context, None, remaining)
        })?;
        *selected = Some(model.clone());
        info!("selected model: {model}");

        let estimated_tokens = prompt.split_whitespace().count() as u64 * 4;
        let estimate =
            estimated_tokens as f64 / 1000.0 * model.cost_per_1k_tokens * PLAN_COST_MULTIPLIER;
        *estimated_cost = estimate;
        if !self.cost_guard.check_budget(estimate) {
            return Err(OrchestratorError::BudgetExceeded {
                remaining: self.cost_guard.remaining_budget(),
            });
        }

        let deployment = self.deployment_for("planning");
        match self
            .planning
            .generate_plan(self.channel.as_ref(), prompt, repo_context, &model, deployment)
        {
            Ok(outcome) => {
                let (cost_usd, model_used) = self.record_usage_for(
                    &outcome.response,
                    estimated_tokens,
                    &model,
                    TaskKind::Planning,
                );
                Ok(PlanResponse {
                    plan: outcome.plan,
                    model_used,
                    cost_usd,
                    complexity,
                })
            }
            Err(err) => {
                warn!("planning channel call failed ({err}), using fallback plan");
                Ok(PlanResponse {
                    plan: PlanningEngine::fallback_plan(prompt),
                    model_used: model.name.clone(),
                    cost_usd: 0.0,
                    complexity,
                })
            }
        }
    }

    /// Generate a patch implementing `plan`.
    ///
    /// The tier comes from the plan's own complexity estimate: low runs
    /// fast, high plans, everything else codes.
    pub fn generate_patch(
        &mut self,
        plan: &CodePlan,
        file_contents: Option<&BTreeMap<String, String>>,
        force_model: Option<&str>,
    ) -> OrchestratorResult<PatchResponse> {
        let mut selected: Option<ModelEntry> = None;
        let mut estimated_cost = 0.0;

        match self.generate_attempt(plan, file_contents, force_model, &mut selected, &mut estimated_cost)
        {
            Ok(response) => Ok(response),
            Err(err @ OrchestratorError::BudgetExceeded { .. }) => Err(err),
            Err(err) => {
                self.try_escalate(selected.as_ref(), estimated_cost, "generation_failure", |this, model| {
                    this.generate_patch(plan, file_contents, Some(model.as_str()))
                })
                .unwrap_or(Err(err))
            }
        }
    }

    fn generate_attempt(
        &mut self,
        plan: &CodePlan,
        file_contents: Option<&BTreeMap<String, String>>,
        force_model: Option<&str>,
        selected: &mut Option<ModelEntry>,
        estimated_cost: &mut f64,
    ) -> OrchestratorResult<PatchResponse> {
        info!("generating patch for: {}", plan.title);

        let model = self.resolve_model(force_model, || {
            let tier = match plan.estimated_complexity {
                PlanComplexity::Low => ModelTier::Fast,
                PlanComplexity::High => ModelTier::Planning,
                PlanComplexity::Medium | PlanComplexity::Unknown => ModelTier::Coding,
            };
            let remaining = self.cost_guard.remaining_budget();
            self.router.model_for_tier(tier, remaining)
        })?;
        *selected = Some(model.clone());
        info!("selected model for coding: {model}");

        let total_file_size: usize = file_contents
            .map(|files| files.values().map(String::len).sum())
            .unwrap_or(0);
        let estimated_tokens = ((plan.description.len() + total_file_size) / 4) as u64;
        let estimate = estimated_tokens as f64 / 1000.0
            * model.cost_per_1k_tokens
            * GENERATION_COST_MULTIPLIER;
        *estimated_cost = estimate;
        if !self.cost_guard.check_budget(estimate) {
            return Err(OrchestratorError::BudgetExceeded {
                remaining: self.cost_guard.remaining_budget(),
            });
        }

        let deployment = self.deployment_for("coding");
        match self.codegen.generate_patch(
            self.channel.as_ref(),
            plan,
            file_contents,
            &model,
            deployment,
        ) {
            Ok(outcome) => {
                let (cost_usd, model_used) = self.record_usage_for(
                    &outcome.response,
                    estimated_tokens,
                    &model,
                    TaskKind::Coding,
                );
                Ok(PatchResponse {
                    patch: outcome.patch,
                    model_used,
                    cost_usd,
                })
            }
            Err(err) => {
                warn!("patch generation channel call failed ({err}), using fallback patch");
                Ok(PatchResponse {
                    patch: CodeGenerator::fallback_patch(plan),
                    model_used: model.name.clone(),
                    cost_usd: 0.0,
                })
            }
        }
    }

    /// Heuristic review of a generated patch.
    ///
    /// Flags oversized patches and missing test coverage; approval means
    /// no issues were found.
    pub fn review_patch(
        &mut self,
        patch: &GeneratedPatch,
        _context: Option<&RepoContext>,
    ) -> ReviewResponse {
        info!("reviewing patch with {} file(s)", patch.files_changed.len());

        let remaining = self.cost_guard.remaining_budget();
        let model = self.router.model_for_tier(ModelTier::Planning, remaining);

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        if patch.additions > LARGE_PATCH_ADDITIONS {
            issues.push("Large patch - consider breaking into smaller changes".to_string());
        }
        if !patch
            .files_changed
            .iter()
            .any(|file| file.to_lowercase().contains("test"))
        {
            suggestions.push("Consider adding tests for these changes".to_string());
        }

        ReviewResponse {
            approved: issues.is_empty(),
            issues,
            suggestions,
            model_used: model.name,
            cost_usd: 0.01,
        }
    }

    /// Structured diagnosis of a failing test run.
    pub fn diagnose_failure(
        &mut self,
        test_output: &str,
        patch: &GeneratedPatch,
        _context: Option<&RepoContext>,
    ) -> String {
        info!("diagnosing test failures");

        let quoted = crate::ai::planning::truncate(test_output, DIAGNOSIS_OUTPUT_LIMIT);
        format!(
            "Test Failure Diagnosis:\n\n\
             Test Output:\n{quoted}\n\n\
             Patch Applied:\n{patch}\n\n\
             Suggested Actions:\n\
             1. Review the test output for specific error messages\n\
             2. Check if the patch introduced syntax errors\n\
             3. Verify that all imports are correct\n\
             4. Ensure test setup and teardown are working"
        )
    }

    /// Budget snapshot plus the configured model catalog.
    pub fn status(&mut self) -> OrchestratorStatus {
        OrchestratorStatus {
            budget: self.cost_guard.status(),
            models: TierModelNames {
                fast: self.router.model_names(ModelTier::Fast),
                coding: self.router.model_names(ModelTier::Coding),
                planning: self.router.model_names(ModelTier::Planning),
            },
        }
    }

    /// Remaining budget for today.
    pub fn remaining_budget(&self) -> f64 {
        self.cost_guard.remaining_budget()
    }

    fn resolve_model(
        &self,
        force_model: Option<&str>,
        select: impl FnOnce() -> ModelEntry,
    ) -> OrchestratorResult<ModelEntry> {
        match force_model {
            Some(name) => self
                .router
                .find_model(name)
                .ok_or_else(|| OrchestratorError::ModelNotFound(name.to_string())),
            None => Ok(select()),
        }
    }

    /// One escalation attempt: next tier up, if its projected cost still
    /// fits the budget. Returns `None` when escalation is not possible,
    /// so the caller surfaces the original error.
    fn try_escalate<T>(
        &mut self,
        current: Option<&ModelEntry>,
        estimated_cost: f64,
        reason: &str,
        retry: impl FnOnce(&mut Self, String) -> OrchestratorResult<T>,
    ) -> Option<OrchestratorResult<T>> {
        let current = current?;
        let escalated = self.router.escalate(current, reason)?;
        let retry_budget = (estimated_cost * ESCALATION_COST_MULTIPLIER).max(estimated_cost);
        if !self.cost_guard.check_budget(retry_budget) {
            return None;
        }
        info!("escalating to {}", escalated.name);
        Some(retry(self, escalated.name))
    }

    fn record_usage_for(
        &mut self,
        response: &ChatResponse,
        estimated_tokens: u64,
        model: &ModelEntry,
        task_kind: TaskKind,
    ) -> (f64, String) {
        let (prompt_tokens, completion_tokens) = if response.has_usage() {
            let prompt_tokens = if response.prompt_tokens > 0 {
                response.prompt_tokens
            } else {
                estimated_tokens
            };
            let completion_tokens = if response.completion_tokens > 0 {
                response.completion_tokens
            } else {
                response.total().saturating_sub(prompt_tokens)
            };
            (prompt_tokens, completion_tokens)
        } else {
            // No counters from the channel: estimate both sides.
            (estimated_tokens, estimated_tokens)
        };

        let cost_usd = self.cost_guard.record_usage(
            if response.model.is_empty() {
                &model.name
            } else {
                &response.model
            },
            prompt_tokens,
            completion_tokens,
            model.cost_per_1k_tokens,
            task_kind,
        );

        let model_used = if response.model.is_empty() {
            model.name.clone()
        } else {
            response.model.clone()
        };
        (cost_usd, model_used)
    }
}
