//! Tiered model routing.
//!
//! Three tiers (FAST, CODING, PLANNING) each carry a primary and an
//! optional fallback model. Tier selection is driven by complexity
//! metrics; model choice within a tier is budget-aware; escalation walks
//! one tier up after a failure.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::classifier::{ComplexityAnalyzer, ComplexityMetrics, RepoContext};

/// Model tier classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Quick, cheap operations.
    Fast,
    /// Specialized code generation.
    Coding,
    /// Complex reasoning and security-sensitive work.
    Planning,
}

impl ModelTier {
    /// Next tier up the escalation path, if any.
    pub fn next_up(self) -> Option<Self> {
        match self {
            Self::Fast => Some(Self::Coding),
            Self::Coding => Some(Self::Planning),
            Self::Planning => None,
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Coding => write!(f, "coding"),
            Self::Planning => write!(f, "planning"),
        }
    }
}

/// A fully resolved model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub tier: ModelTier,
    pub max_tokens: u32,
    pub temperature: f32,
    pub cost_per_1k_tokens: f64,
    pub provider: String,
}

impl std::fmt::Display for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.tier)
    }
}

/// A model entry as it appears in configuration: either a bare name or a
/// partial entry whose missing fields inherit the tier defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSpec {
    Name(String),
    Entry(PartialModelEntry),
}

/// Partial model settings; `None` fields inherit tier defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialModelEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub cost_per_1k_tokens: Option<f64>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Per-tier primary/fallback overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierOverride {
    #[serde(default)]
    pub primary: Option<ModelSpec>,
    #[serde(default)]
    pub fallback: Option<ModelSpec>,
}

/// Explicit per-tier model map. A tier absent from an explicit map gets
/// no entries at all (and selection falls back to FAST).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierOverrides {
    #[serde(default)]
    pub fast: Option<TierOverride>,
    #[serde(default)]
    pub coding: Option<TierOverride>,
    #[serde(default)]
    pub planning: Option<TierOverride>,
}

/// Router configuration. With no explicit model map every tier carries
/// its built-in primary and fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub models: Option<TierOverrides>,
}

/// Built-in defaults per tier and slot.
fn default_entry(tier: ModelTier, fallback: bool) -> ModelEntry {
    match (tier, fallback) {
        (ModelTier::Fast, false) => ModelEntry {
            name: "llama-3.1-8b-instruct".to_string(),
            tier,
            max_tokens: 1024,
            temperature: 0.1,
            cost_per_1k_tokens: 0.0001,
            provider: "abacus".to_string(),
        },
        (ModelTier::Fast, true) => ModelEntry {
            name: "gemma-2-9b-it".to_string(),
            tier,
            max_tokens: 1024,
            temperature: 0.1,
            cost_per_1k_tokens: 0.0001,
            provider: "abacus".to_string(),
        },
        (ModelTier::Coding, false) => ModelEntry {
            name: "deepseek-coder-33b".to_string(),
            tier,
            max_tokens: 2048,
            temperature: 0.1,
            cost_per_1k_tokens: 0.0005,
            provider: "abacus".to_string(),
        },
        (ModelTier::Coding, true) => ModelEntry {
            name: "codellama-70b-instruct".to_string(),
            tier,
            max_tokens: 2048,
            temperature: 0.1,
            cost_per_1k_tokens: 0.0005,
            provider: "abacus".to_string(),
        },
        (ModelTier::Planning, false) => ModelEntry {
            name: "gpt-4o".to_string(),
            tier,
            max_tokens: 4096,
            temperature: 0.2,
            cost_per_1k_tokens: 0.03,
            provider: "abacus".to_string(),
        },
        (ModelTier::Planning, true) => ModelEntry {
            name: "claude-3-5-sonnet".to_string(),
            tier,
            max_tokens: 4096,
            temperature: 0.2,
            cost_per_1k_tokens: 0.025,
            provider: "abacus".to_string(),
        },
    }
}

fn merge_spec(spec: Option<&ModelSpec>, defaults: ModelEntry) -> ModelEntry {
    match spec {
        None => defaults,
        Some(ModelSpec::Name(name)) => ModelEntry {
            name: name.clone(),
            ..defaults
        },
        Some(ModelSpec::Entry(partial)) => ModelEntry {
            name: partial.name.clone().unwrap_or(defaults.name),
            tier: defaults.tier,
            max_tokens: partial.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: partial.temperature.unwrap_or(defaults.temperature),
            cost_per_1k_tokens: partial
                .cost_per_1k_tokens
                .unwrap_or(defaults.cost_per_1k_tokens),
            provider: partial.provider.clone().unwrap_or(defaults.provider),
        },
    }
}

/// Budget below which the cheapest model in a tier wins.
const LOW_BUDGET_USD: f64 = 1.0;

/// Selects a model per task from the tiered catalog.
pub struct ModelRouter {
    fast: Vec<ModelEntry>,
    coding: Vec<ModelEntry>,
    planning: Vec<ModelEntry>,
}

impl ModelRouter {
    /// Build a router from configuration.
    pub fn new(config: &RouterConfig) -> Self {
        let router = match &config.models {
            None => Self {
                fast: Self::resolve_tier(ModelTier::Fast, Some(&TierOverride::default())),
                coding: Self::resolve_tier(ModelTier::Coding, Some(&TierOverride::default())),
                planning: Self::resolve_tier(ModelTier::Planning, Some(&TierOverride::default())),
            },
            Some(overrides) => Self {
                fast: Self::resolve_tier(ModelTier::Fast, overrides.fast.as_ref()),
                coding: Self::resolve_tier(ModelTier::Coding, overrides.coding.as_ref()),
                planning: Self::resolve_tier(ModelTier::Planning, overrides.planning.as_ref()),
            },
        };

        info!(
            "model router initialized with {} model(s)",
            router.fast.len() + router.coding.len() + router.planning.len()
        );
        router
    }

    /// Router carrying only the built-in defaults.
    pub fn with_defaults() -> Self {
        Self::new(&RouterConfig::default())
    }

    fn resolve_tier(tier: ModelTier, tier_override: Option<&TierOverride>) -> Vec<ModelEntry> {
        match tier_override {
            // Tier omitted from an explicit model map: no entries.
            None => Vec::new(),
            Some(overrides) => vec![
                merge_spec(overrides.primary.as_ref(), default_entry(tier, false)),
                merge_spec(overrides.fallback.as_ref(), default_entry(tier, true)),
            ],
        }
    }

    /// Entries configured for a tier, primary first.
    pub fn tier_models(&self, tier: ModelTier) -> &[ModelEntry] {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Coding => &self.coding,
            ModelTier::Planning => &self.planning,
        }
    }

    /// Configured model names for a tier.
    pub fn model_names(&self, tier: ModelTier) -> Vec<String> {
        self.tier_models(tier)
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Select the model for a prompt, analyzing complexity and applying
    /// the tier rules.
    pub fn select_model(
        &self,
        prompt: &str,
        context: &RepoContext,
        force_tier: Option<ModelTier>,
        budget_remaining: f64,
    ) -> ModelEntry {
        if let Some(tier) = force_tier {
            debug!("forced model tier: {tier}");
            return self.model_for_tier(tier, budget_remaining);
        }

        let complexity = ComplexityAnalyzer::analyze(prompt, context);
        debug!("task complexity: {complexity}");
        let tier = self.select_tier(&complexity);
        info!("selected tier {tier} for task");
        self.model_for_tier(tier, budget_remaining)
    }

    /// Map complexity metrics to a tier.
    ///
    /// Security-sensitive and architectural work always plans; beyond
    /// that the score thresholds decide.
    pub fn select_tier(&self, complexity: &ComplexityMetrics) -> ModelTier {
        if complexity.security_sensitive {
            debug!("security-sensitive task, escalating to planning tier");
            return ModelTier::Planning;
        }
        if complexity.requires_architecture {
            debug!("architecture task, escalating to planning tier");
            return ModelTier::Planning;
        }
        if complexity.estimated_patch_size > 200 {
            debug!("large estimated patch, escalating to planning tier");
            return ModelTier::Planning;
        }

        if complexity.score >= 0.7 {
            ModelTier::Planning
        } else if complexity.score >= 0.3 {
            ModelTier::Coding
        } else {
            ModelTier::Fast
        }
    }

    /// Pick a model within a tier.
    ///
    /// Primary by default; with less than one dollar remaining the
    /// cheapest entry wins. An empty tier falls back to FAST's first
    /// entry (or the built-in FAST primary as a last resort).
    pub fn model_for_tier(&self, tier: ModelTier, budget_remaining: f64) -> ModelEntry {
        let models = self.tier_models(tier);

        if models.is_empty() {
            warn!("no models configured for tier {tier}, using fast tier");
            return self
                .fast
                .first()
                .cloned()
                .unwrap_or_else(|| default_entry(ModelTier::Fast, false));
        }

        if budget_remaining < LOW_BUDGET_USD && models.len() > 1 {
            let mut cheapest = &models[0];
            for entry in &models[1..] {
                if entry.cost_per_1k_tokens < cheapest.cost_per_1k_tokens {
                    cheapest = entry;
                }
            }
            return cheapest.clone();
        }

        models[0].clone()
    }

    /// Find a configured model by name across all tiers.
    pub fn find_model(&self, name: &str) -> Option<ModelEntry> {
        [&self.fast, &self.coding, &self.planning]
            .into_iter()
            .flat_map(|models| models.iter())
            .find(|entry| entry.name == name)
            .cloned()
    }

    /// Model one tier up from `current`, or `None` at the top.
    pub fn escalate(&self, current: &ModelEntry, reason: &str) -> Option<ModelEntry> {
        info!("escalating from {} due to {reason}", current.name);
        current
            .tier
            .next_up()
            .map(|tier| self.model_for_tier(tier, f64::MAX))
    }
}
