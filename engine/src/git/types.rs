//! Metadata records for repositories, workpads, and checkpoints.
//!
//! These are the durable records behind `metadata/repositories.json` and
//! `metadata/workpads.json`. Workpads reference their repository by id
//! only; lookups always go through the engine's repository map.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default trunk branch for repositories initialized from an archive.
pub const DEFAULT_TRUNK_BRANCH: &str = "main";

/// Maximum accepted workpad title length, in characters.
pub const MAX_TITLE_LEN: usize = 100;

/// Maximum length of the slug portion of a workpad branch name.
const SLUG_MAX_LEN: usize = 30;

/// Where a repository originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Extracted from an uploaded archive.
    Archive,
    /// Cloned from a remote URL.
    Remote,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Lifecycle state of a workpad.
///
/// `Promoted` and `Deleted` are terminal; the record is retained for audit
/// but the branch is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkpadStatus {
    Active,
    Promoted,
    Deleted,
}

impl std::fmt::Display for WorkpadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Promoted => write!(f, "promoted"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Result of the most recent test run against a workpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Green,
    Red,
}

/// A repository managed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique identifier, `repo_` + 8 hex chars.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Absolute path of the working tree on disk.
    pub path: PathBuf,
    /// Branch that receives promotions.
    pub trunk_branch: String,
    pub created_at: DateTime<Utc>,
    /// Number of workpads currently in `active` status.
    pub workpad_count: u32,
    pub source_type: SourceKind,
    /// Original URL when cloned from a remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// An ephemeral workpad layered over a repository's trunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workpad {
    /// Unique identifier, `pad_` + 8 hex chars.
    pub id: String,
    /// Owning repository id.
    pub repo_id: String,
    /// Human-readable title, at most [`MAX_TITLE_LEN`] characters.
    pub title: String,
    /// Branch name, `pads/<slug>-<YYYYMMDD-HHMMSS>`.
    pub branch_name: String,
    pub created_at: DateTime<Utc>,
    /// Ordered checkpoint ids: `t1`, `t2`, ... with no gaps.
    #[serde(default)]
    pub checkpoints: Vec<String>,
    pub last_activity: DateTime<Utc>,
    pub status: WorkpadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_status: Option<TestStatus>,
    /// Hash of the most recent checkpoint commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
}

impl Workpad {
    /// Id the next checkpoint will get (`t<N>`, 1-based, dense).
    pub fn next_checkpoint_id(&self) -> String {
        format!("t{}", self.checkpoints.len() + 1)
    }

    /// Tag name backing a checkpoint of this workpad.
    pub fn checkpoint_tag(&self, checkpoint_id: &str) -> String {
        format!("{}@{}", self.branch_name, checkpoint_id)
    }
}

/// A resolved checkpoint: the commit a `t<N>` tag points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint id within its workpad (`t1`, `t2`, ...).
    pub id: String,
    /// Owning workpad id.
    pub pad_id: String,
    /// Git tag name, `<branch>@t<N>`.
    pub tag_name: String,
    pub commit_hash: String,
    /// Commit subject line.
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Sort key for filtered workpad listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkpadSort {
    Created,
    Activity,
    Title,
}

/// Generate a prefixed identifier: `<prefix>_` + 8 hex chars.
pub(crate) fn generate_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

/// Lowercase, dash-separate, and truncate a title into a branch slug.
pub(crate) fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .take(SLUG_MAX_LEN)
        .collect()
}

/// Branch name for a new workpad created at `at`.
pub(crate) fn branch_name_for(title: &str, at: DateTime<Utc>) -> String {
    format!("pads/{}-{}", slugify(title), at.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("repo");
        assert!(id.starts_with("repo_"));
        assert_eq!(id.len(), "repo_".len() + 8);
        assert!(id["repo_".len()..].chars().all(|c| c.is_ascii_hexdigit()));

        // Two ids should not collide.
        assert_ne!(generate_id("pad"), generate_id("pad"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add Login Form"), "add-login-form");
        assert_eq!(
            slugify("A very long workpad title that keeps going"),
            "a-very-long-workpad-title-that"
        );
        assert_eq!(slugify("short"), "short");
    }

    #[test]
    fn test_branch_name_format() {
        let at = DateTime::parse_from_rfc3339("2025-10-16T14:23:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            branch_name_for("Add Login", at),
            "pads/add-login-20251016-142300"
        );
    }

    #[test]
    fn test_checkpoint_numbering_helpers() {
        let mut pad = Workpad {
            id: "pad_00000001".to_string(),
            repo_id: "repo_00000001".to_string(),
            title: "Test".to_string(),
            branch_name: "pads/test-20251016-142300".to_string(),
            created_at: Utc::now(),
            checkpoints: vec![],
            last_activity: Utc::now(),
            status: WorkpadStatus::Active,
            test_status: None,
            last_commit: None,
        };

        assert_eq!(pad.next_checkpoint_id(), "t1");
        pad.checkpoints.push("t1".to_string());
        pad.checkpoints.push("t2".to_string());
        assert_eq!(pad.next_checkpoint_id(), "t3");
        assert_eq!(
            pad.checkpoint_tag("t2"),
            "pads/test-20251016-142300@t2"
        );
    }

    #[test]
    fn test_records_survive_serde_round_trip() {
        let repo = Repository {
            id: "repo_a1b2c3d4".to_string(),
            name: "demo".to_string(),
            path: PathBuf::from("/tmp/repo_a1b2c3d4"),
            trunk_branch: "main".to_string(),
            created_at: Utc::now(),
            workpad_count: 2,
            source_type: SourceKind::Archive,
            source_url: None,
            last_activity: Utc::now(),
        };
        let json = serde_json::to_string(&repo).unwrap();
        let parsed: Repository = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, repo);

        let pad = Workpad {
            id: "pad_a1b2c3d4".to_string(),
            repo_id: repo.id.clone(),
            title: "Round trip".to_string(),
            branch_name: "pads/round-trip-20251016-142300".to_string(),
            created_at: Utc::now(),
            checkpoints: vec!["t1".to_string(), "t2".to_string()],
            last_activity: Utc::now(),
            status: WorkpadStatus::Promoted,
            test_status: Some(TestStatus::Green),
            last_commit: Some("0123456789abcdef0123456789abcdef01234567".to_string()),
        };
        let json = serde_json::to_string(&pad).unwrap();
        let parsed: Workpad = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pad);

        let checkpoint = Checkpoint {
            id: "t1".to_string(),
            pad_id: pad.id.clone(),
            tag_name: pad.checkpoint_tag("t1"),
            commit_hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
            message: "Checkpoint 1".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&checkpoint).unwrap();
        let parsed: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, checkpoint);
    }

    #[test]
    fn test_status_serialization_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&WorkpadStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(
            serde_json::to_string(&SourceKind::Remote).unwrap(),
            "\"remote\""
        );
        assert_eq!(
            serde_json::to_string(&TestStatus::Red).unwrap(),
            "\"red\""
        );
    }
}
