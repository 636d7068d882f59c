//! Solo-developer version control engine: disposable workpads over a
//! Git-backed trunk, with an AI orchestration core routing planning and
//! code generation across tiered model backends under a daily budget.
//!
//! The engine is organized leaf to root:
//!
//! - [`git`]: repositories and workpads, trunk lifecycle, checkpoints as
//!   tags, the fast-forward promotion gate, durable metadata.
//! - [`patch`]: unified-diff ingestion, validation dry runs, conflict
//!   classification, stats and complexity, decompose/combine.
//! - [`ai`]: complexity scoring, tiered model routing with escalation,
//!   daily budget enforcement with a persistent ledger, and the
//!   plan → generate → review → diagnose pipeline over an abstract
//!   channel.
//!
//! All operations are synchronous; the only potentially long-blocking
//! calls are git subprocesses and the AI channel. Persistence goes
//! through whole-file rewrite-then-rename, so a crash leaves either the
//! prior or the new state.

pub mod ai;
pub mod git;
pub mod patch;

mod storage;

pub use ai::{
    AiChannel, AiError, BudgetConfig, ChatMessage, ChatRequest, ChatResponse, CodePlan,
    ComplexityMetrics, CostGuard, GeneratedPatch, ModelRouter, ModelTier, Orchestrator,
    OrchestratorError, RepoContext, RouterConfig, TaskKind,
};
pub use git::{
    ArchiveExtractor, Checkpoint, GitEngine, GitError, GitResult, Repository, TestStatus, Workpad,
    WorkpadStatus,
};
pub use patch::{ApplyOutcome, PatchEngine, PatchError, PatchPreview, PatchStats, Recommendation};
