//! Cost guard integration: the on-disk layout of the ledger and status
//! files, alert ordering across restarts, and day-scoped accounting.

use serde_json::Value;
use sologit_engine::ai::{AlertLevel, BudgetConfig, CostGuard, TaskKind};

fn guard_in(dir: &std::path::Path) -> CostGuard {
    CostGuard::with_data_dir(BudgetConfig::default(), dir)
}

#[test]
fn test_usage_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut guard = guard_in(dir.path());
    guard.record_usage("gpt-4o", 1_000, 500, 0.03, TaskKind::Planning);

    let raw = std::fs::read_to_string(dir.path().join("usage.json")).unwrap();
    let parsed: Value = serde_json::from_str(&raw).unwrap();

    let history = parsed["history"].as_array().expect("history array");
    assert_eq!(history.len(), 1);
    let day = &history[0];
    assert!(day["date"].is_string());
    assert_eq!(day["total_tokens"], 1_500);
    assert_eq!(day["calls_count"], 1);
    assert!(day["usage_by_model"]["gpt-4o"].is_number());
    assert!(day["usage_by_task"]["planning"].is_number());
    assert!(parsed["last_updated"].is_string());

    // Pretty-printed with two-space indent, no temp file left behind.
    assert!(raw.contains("\n  \"history\""));
    assert!(!dir.path().join("usage.json.tmp").exists());
}

#[test]
fn test_status_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut guard = guard_in(dir.path());
    guard.record_usage("gpt-4o", 100_000, 40_000, 0.05, TaskKind::Coding);
    assert!(guard.check_budget(1.5));

    let raw = std::fs::read_to_string(dir.path().join("budget_status.json")).unwrap();
    let parsed: Value = serde_json::from_str(&raw).unwrap();

    assert!(parsed["date"].is_string());
    assert_eq!(parsed["current_cost"], 7.0);
    assert_eq!(parsed["projected_cost"], 8.5);
    assert_eq!(parsed["threshold_crossed"], true);
    assert!(parsed["last_updated"].is_string());

    let alerts = parsed["alerts"].as_array().expect("alerts array");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["level"], "threshold");
    assert!(alerts[0]["message"].as_str().unwrap().contains("daily cap"));
    assert!(alerts[0]["projected_cost"].is_number());

    let last_usage = &parsed["last_usage"];
    assert_eq!(last_usage["model"], "gpt-4o");
    assert_eq!(last_usage["task_kind"], "coding");
    assert_eq!(last_usage["total_tokens"], 140_000);
}

#[test]
fn test_alert_once_guarantee_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut guard = guard_in(dir.path());
        guard.record_usage("gpt-4o", 140_000, 0, 0.05, TaskKind::Planning);
        assert!(guard.check_budget(2.0));
        assert_eq!(guard.status().alerts.len(), 1);
    }

    // Same day, fresh process: the recorded alert blocks a duplicate.
    let mut guard = guard_in(dir.path());
    assert!(guard.check_budget(2.0));
    let status = guard.status();
    assert_eq!(
        status
            .alerts
            .iter()
            .filter(|a| a.level == AlertLevel::Threshold)
            .count(),
        1
    );
    assert!(status.threshold_crossed);
}

#[test]
fn test_exceeded_then_threshold_accounting() {
    let dir = tempfile::tempdir().unwrap();
    let mut guard = guard_in(dir.path());

    // Crossing the threshold and the cap in one check records only the
    // exceeded alert and refuses the call.
    guard.record_usage("gpt-4o", 140_000, 0, 0.05, TaskKind::Planning);
    assert!(!guard.check_budget(4.0));

    let status = guard.status();
    assert_eq!(status.alerts.len(), 1);
    assert_eq!(status.alerts[0].level, AlertLevel::Exceeded);

    // Costs only ever grow within a day.
    let before = status.current_cost;
    guard.record_usage("gpt-4o", 10_000, 0, 0.05, TaskKind::Review);
    assert!(guard.status().current_cost > before);
}

#[test]
fn test_check_budget_persists_before_returning() {
    let dir = tempfile::tempdir().unwrap();
    let mut guard = guard_in(dir.path());
    guard.record_usage("gpt-4o", 40_000, 0, 0.05, TaskKind::Planning);
    assert!(guard.check_budget(0.5));

    // The snapshot written by check_budget is already on disk.
    let raw = std::fs::read_to_string(dir.path().join("budget_status.json")).unwrap();
    let parsed: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["current_cost"], 2.0);
    assert_eq!(parsed["projected_cost"], 2.5);
}

#[test]
fn test_custom_cap_and_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let config = BudgetConfig {
        daily_cap_usd: 1.0,
        alert_threshold: 0.5,
        track_by_model: true,
    };
    let mut guard = CostGuard::new(
        config,
        dir.path().join("usage.json"),
        dir.path().join("budget_status.json"),
    );

    assert!(guard.check_budget(0.6));
    let status = guard.status();
    assert_eq!(status.alerts.len(), 1);
    assert_eq!(status.alerts[0].level, AlertLevel::Threshold);

    assert!(!guard.check_budget(1.5));
    assert_eq!(guard.status().alerts.len(), 2);
}
