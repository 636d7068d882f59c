//! Daily budget enforcement and usage ledger.
//!
//! The tracker owns `usage.json` (one aggregate per calendar day); the
//! guard owns `budget_status.json` (the current-day snapshot with its
//! alert history). Both files are rewritten atomically, and the guard
//! persists its snapshot before answering a budget check so an
//! interrupted process cannot over-report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage;

/// Budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum cumulative spend per calendar day, in USD.
    pub daily_cap_usd: f64,
    /// Fraction of the cap that fires the threshold alert.
    pub alert_threshold: f64,
    /// Whether per-model cost maps are maintained.
    pub track_by_model: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_cap_usd: 10.0,
            alert_threshold: 0.8,
            track_by_model: true,
        }
    }
}

/// Kind of work an AI call served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Planning,
    Coding,
    Review,
    Diagnosis,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Coding => write!(f, "coding"),
            Self::Review => write!(f, "review"),
            Self::Diagnosis => write!(f, "diagnosis"),
        }
    }
}

/// One recorded AI call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub task_kind: TaskKind,
}

/// Aggregate usage for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub calls_count: u64,
    #[serde(default)]
    pub usage_by_model: BTreeMap<String, f64>,
    #[serde(default)]
    pub usage_by_task: BTreeMap<String, f64>,
}

impl DailyUsage {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_cost_usd: 0.0,
            total_tokens: 0,
            calls_count: 0,
            usage_by_model: BTreeMap::new(),
            usage_by_task: BTreeMap::new(),
        }
    }
}

/// Severity of a budget alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Threshold,
    Exceeded,
}

/// A one-shot-per-day budget alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub message: String,
    pub projected_cost: f64,
}

/// Summary of the most recent recorded call, kept in the status file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastUsage {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub cost_usd: f64,
    pub task_kind: TaskKind,
    pub total_tokens: u64,
}

/// On-disk shape of `usage.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    history: Vec<DailyUsage>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Weekly roll-up derived from the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyStats {
    pub period: String,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub total_calls: u64,
    pub average_daily_cost: f64,
}

/// Persistent ledger of AI spending, keyed by calendar day.
pub struct CostTracker {
    storage_path: PathBuf,
    history: BTreeMap<NaiveDate, DailyUsage>,
}

impl CostTracker {
    /// Load (or start) a ledger at `storage_path`.
    ///
    /// A corrupt ledger file is treated as empty with a warning. The
    /// current day's aggregate is created lazily.
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        let storage_path = storage_path.into();
        let file: LedgerFile = storage::read_json_or_default(&storage_path);
        let history: BTreeMap<NaiveDate, DailyUsage> = file
            .history
            .into_iter()
            .map(|daily| (daily.date, daily))
            .collect();

        info!("loaded usage history: {} day(s)", history.len());
        Self {
            storage_path,
            history,
        }
    }

    fn save(&self) {
        let file = LedgerFile {
            history: self.history.values().cloned().collect(),
            last_updated: Some(Utc::now()),
        };
        if let Err(err) = storage::write_json_atomic(&self.storage_path, &file) {
            warn!("failed to save usage history: {err}");
        } else {
            debug!("saved usage history");
        }
    }

    /// Record one call into today's aggregate and persist the ledger.
    pub fn record(&mut self, usage: &TokenUsage, track_by_model: bool) {
        let today = Utc::now().date_naive();
        let daily = self
            .history
            .entry(today)
            .or_insert_with(|| DailyUsage::new(today));

        daily.total_cost_usd += usage.cost_usd;
        daily.total_tokens += usage.total_tokens;
        daily.calls_count += 1;
        if track_by_model {
            *daily.usage_by_model.entry(usage.model.clone()).or_insert(0.0) += usage.cost_usd;
        }
        *daily
            .usage_by_task
            .entry(usage.task_kind.to_string())
            .or_insert(0.0) += usage.cost_usd;

        debug!(
            "recorded usage: {}, {} tokens, ${:.4}",
            usage.model, usage.total_tokens, usage.cost_usd
        );
        self.save();
    }

    /// Today's cumulative cost.
    pub fn today_cost(&self) -> f64 {
        let today = Utc::now().date_naive();
        self.history
            .get(&today)
            .map(|daily| daily.total_cost_usd)
            .unwrap_or(0.0)
    }

    /// Today's cumulative token count.
    pub fn today_tokens(&self) -> u64 {
        let today = Utc::now().date_naive();
        self.history
            .get(&today)
            .map(|daily| daily.total_tokens)
            .unwrap_or(0)
    }

    /// Today's full aggregate, if any calls were recorded.
    pub fn breakdown(&self) -> Option<&DailyUsage> {
        self.history.get(&Utc::now().date_naive())
    }

    /// Roll-up of the trailing seven days.
    pub fn weekly_stats(&self) -> WeeklyStats {
        let today = Utc::now().date_naive();
        let week_ago = today - Duration::days(7);

        let mut total_cost = 0.0;
        let mut total_tokens = 0;
        let mut total_calls = 0;
        for (date, daily) in &self.history {
            if *date >= week_ago && *date <= today {
                total_cost += daily.total_cost_usd;
                total_tokens += daily.total_tokens;
                total_calls += daily.calls_count;
            }
        }

        WeeklyStats {
            period: format!("{week_ago} to {today}"),
            total_cost_usd: total_cost,
            total_tokens,
            total_calls,
            average_daily_cost: total_cost / 7.0,
        }
    }
}

/// On-disk shape of `budget_status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedStatus {
    date: NaiveDate,
    current_cost: f64,
    projected_cost: f64,
    #[serde(default)]
    alerts: Vec<BudgetAlert>,
    #[serde(default)]
    threshold_crossed: bool,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_usage: Option<LastUsage>,
}

impl Default for PersistedStatus {
    fn default() -> Self {
        Self {
            date: Utc::now().date_naive(),
            current_cost: 0.0,
            projected_cost: 0.0,
            alerts: Vec::new(),
            threshold_crossed: false,
            last_updated: None,
            last_usage: None,
        }
    }
}

/// Full budget snapshot returned by [`CostGuard::status`].
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub daily_cap: f64,
    pub current_cost: f64,
    pub remaining: f64,
    pub percentage_used: f64,
    pub within_budget: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<DailyUsage>,
    pub alerts: Vec<BudgetAlert>,
    pub threshold_crossed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_usage: Option<LastUsage>,
}

/// Enforces the daily cap and maintains the alert history.
pub struct CostGuard {
    config: BudgetConfig,
    tracker: CostTracker,
    status_path: PathBuf,
    status: PersistedStatus,
}

impl CostGuard {
    /// Build a guard over explicit ledger and status paths.
    pub fn new(
        config: BudgetConfig,
        usage_path: impl Into<PathBuf>,
        status_path: impl Into<PathBuf>,
    ) -> Self {
        let tracker = CostTracker::new(usage_path);
        let status_path = status_path.into();
        let mut status: PersistedStatus = storage::read_json_or_default(&status_path);
        if status.date != Utc::now().date_naive() {
            status = PersistedStatus::default();
        }

        info!(
            "cost guard initialized: ${:.2} daily cap, {:.0}% alert threshold",
            config.daily_cap_usd,
            config.alert_threshold * 100.0
        );

        Self {
            config,
            tracker,
            status_path,
            status,
        }
    }

    /// Build a guard with the conventional file names under `data_dir`
    /// (`usage.json` and `budget_status.json`).
    pub fn with_data_dir(config: BudgetConfig, data_dir: &Path) -> Self {
        Self::new(
            config,
            data_dir.join("usage.json"),
            data_dir.join("budget_status.json"),
        )
    }

    fn reset_if_new_day(&mut self) {
        let today = Utc::now().date_naive();
        if self.status.date != today {
            debug!("budget day rolled over to {today}");
            self.status = PersistedStatus::default();
        }
    }

    fn save_status(&self) {
        if let Err(err) = storage::write_json_atomic(&self.status_path, &self.status) {
            warn!("failed to persist budget status: {err}");
        }
    }

    /// Record an alert unless one of the same level already fired today.
    fn record_alert(&mut self, level: AlertLevel, message: String, projected_cost: f64) {
        if self.status.alerts.iter().any(|alert| alert.level == level) {
            return;
        }
        self.status.alerts.push(BudgetAlert {
            timestamp: Utc::now(),
            level,
            message,
            projected_cost,
        });
        self.save_status();
    }

    /// Check whether a request with `estimated_cost` fits today's budget.
    ///
    /// Persists the updated cost snapshot before returning. Returns false
    /// only when the projected cost exceeds the cap; crossing the alert
    /// threshold still returns true but records a one-shot alert.
    pub fn check_budget(&mut self, estimated_cost: f64) -> bool {
        self.reset_if_new_day();
        let current_cost = self.tracker.today_cost();
        let projected_cost = current_cost + estimated_cost;

        self.status.current_cost = round4(current_cost);
        self.status.projected_cost = round4(projected_cost);
        self.status.last_updated = Some(Utc::now());
        self.save_status();

        if projected_cost > self.config.daily_cap_usd {
            let message = format!(
                "Budget exceeded: ${current_cost:.2} current + ${estimated_cost:.2} estimated > ${:.2} cap",
                self.config.daily_cap_usd
            );
            warn!("{message}");
            self.record_alert(AlertLevel::Exceeded, message, projected_cost);
            self.status.threshold_crossed = true;
            self.save_status();
            return false;
        }

        let threshold_cost = self.config.daily_cap_usd * self.config.alert_threshold;
        if current_cost < threshold_cost
            && projected_cost >= threshold_cost
            && !self.status.threshold_crossed
        {
            let percentage = projected_cost / self.config.daily_cap_usd * 100.0;
            let message = format!("Budget alert: approaching daily cap ({percentage:.0}%)");
            warn!("{message}");
            self.record_alert(AlertLevel::Threshold, message, projected_cost);
            self.status.threshold_crossed = true;
            self.save_status();
        }

        true
    }

    /// Budget left today, never negative.
    pub fn remaining_budget(&self) -> f64 {
        (self.config.daily_cap_usd - self.tracker.today_cost()).max(0.0)
    }

    /// Record an AI call. Cost is `total tokens / 1000 × cost_per_1k`.
    /// Returns the computed cost.
    pub fn record_usage(
        &mut self,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        cost_per_1k: f64,
        task_kind: TaskKind,
    ) -> f64 {
        let total_tokens = prompt_tokens + completion_tokens;
        let cost_usd = total_tokens as f64 / 1000.0 * cost_per_1k;

        let usage = TokenUsage {
            timestamp: Utc::now(),
            model: model.to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost_usd,
            task_kind,
        };
        self.tracker.record(&usage, self.config.track_by_model);

        self.reset_if_new_day();
        let current = self.tracker.today_cost();
        self.status.current_cost = round4(current);
        self.status.projected_cost = round4(current);
        self.status.last_updated = Some(Utc::now());
        self.status.last_usage = Some(LastUsage {
            timestamp: usage.timestamp,
            model: usage.model.clone(),
            cost_usd: round4(usage.cost_usd),
            task_kind,
            total_tokens,
        });
        self.save_status();

        cost_usd
    }

    /// Full snapshot of today's budget position.
    pub fn status(&mut self) -> BudgetStatus {
        self.reset_if_new_day();
        let current_cost = self.tracker.today_cost();

        self.status.current_cost = round4(current_cost);
        self.status.projected_cost = round4(current_cost);
        self.status.last_updated = Some(Utc::now());
        self.save_status();

        BudgetStatus {
            daily_cap: self.config.daily_cap_usd,
            current_cost,
            remaining: self.remaining_budget(),
            percentage_used: current_cost / self.config.daily_cap_usd * 100.0,
            within_budget: current_cost <= self.config.daily_cap_usd,
            breakdown: self.tracker.breakdown().cloned(),
            alerts: self.status.alerts.clone(),
            threshold_crossed: self.status.threshold_crossed,
            last_usage: self.status.last_usage.clone(),
        }
    }

    /// Weekly roll-up from the ledger.
    pub fn weekly_stats(&self) -> WeeklyStats {
        self.tracker.weekly_stats()
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
