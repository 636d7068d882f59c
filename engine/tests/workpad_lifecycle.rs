//! End-to-end workpad lifecycle against real git repositories:
//! archive → workpad → checkpoints → promotion, plus the promotion gate
//! and housekeeping operations.

mod common;

use common::{
    engine_with_repo, farewell_patch, hello_append_patch, new_file_patch, sample_archive,
    JsonArchiveExtractor,
};
use sologit_engine::git::{GitEngine, GitError, GitRunner, WorkpadSort, WorkpadStatus};

#[test]
fn test_create_from_archive_and_promote() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    assert!(repo_id.starts_with("repo_"));
    let repo = engine.repository(&repo_id).expect("repository exists");
    assert_eq!(repo.trunk_branch, "main");
    assert_eq!(repo.name, "Test Project");
    assert!(repo.path.join("hello.py").exists());
    assert!(repo.path.join("README.md").exists());

    let pad_id = engine
        .create_workpad(&repo_id, "Add farewell")
        .expect("create workpad");
    assert!(pad_id.starts_with("pad_"));
    assert_eq!(engine.repository(&repo_id).unwrap().workpad_count, 1);

    let pad = engine.workpad(&pad_id).expect("workpad exists");
    assert!(pad.branch_name.starts_with("pads/add-farewell-"));
    assert_eq!(pad.status, WorkpadStatus::Active);

    let checkpoint = engine
        .apply_patch(&pad_id, &farewell_patch(), None)
        .expect("apply patch");
    assert_eq!(checkpoint, "t1");

    assert!(engine.can_promote(&pad_id));
    let commit_hash = engine.promote_workpad(&pad_id).expect("promote");
    assert_eq!(commit_hash.len(), 40);
    assert!(commit_hash.chars().all(|c| c.is_ascii_hexdigit()));

    let pad = engine.workpad(&pad_id).unwrap();
    assert_eq!(pad.status, WorkpadStatus::Promoted);
    assert_eq!(engine.repository(&repo_id).unwrap().workpad_count, 0);

    // Trunk now carries the change and the pad branch is gone.
    let repo = engine.repository(&repo_id).unwrap();
    let runner = GitRunner::new(&repo.path);
    assert_eq!(runner.rev_parse("main").unwrap(), commit_hash);
    assert!(runner.rev_parse(&pad.branch_name).is_err());
    let content = std::fs::read_to_string(repo.path.join("hello.py")).unwrap();
    assert!(content.contains("def farewell():"));
}

#[test]
fn test_fast_forward_rejection_after_divergence() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    let pad_a = engine.create_workpad(&repo_id, "Feature A").unwrap();
    engine
        .apply_patch(&pad_a, &new_file_patch("feature_a.txt", "feature a"), None)
        .unwrap();

    let pad_b = engine.create_workpad(&repo_id, "Feature B").unwrap();
    engine
        .apply_patch(&pad_b, &new_file_patch("feature_b.txt", "feature b"), None)
        .unwrap();

    // Both pads branched from the same trunk; promoting B moves trunk.
    assert!(engine.can_promote(&pad_a));
    engine.promote_workpad(&pad_b).unwrap();

    assert!(!engine.can_promote(&pad_a));
    let err = engine.promote_workpad(&pad_a).unwrap_err();
    match err {
        GitError::CannotPromote { id, reason } => {
            assert_eq!(id, pad_a);
            assert!(reason.contains("diverged"));
        }
        other => panic!("expected CannotPromote, got {other}"),
    }

    // The failed promotion left pad A untouched.
    assert_eq!(
        engine.workpad(&pad_a).unwrap().status,
        WorkpadStatus::Active
    );
    assert_eq!(engine.repository(&repo_id).unwrap().workpad_count, 1);
}

#[test]
fn test_checkpoints_are_dense_and_tagged() {
    let (_dir, mut engine, repo_id) = engine_with_repo();
    let pad_id = engine.create_workpad(&repo_id, "Checkpoints").unwrap();

    let t1 = engine
        .apply_patch(&pad_id, &new_file_patch("one.txt", "one"), None)
        .unwrap();
    let t2 = engine
        .apply_patch(&pad_id, &new_file_patch("two.txt", "two"), Some("Add two"))
        .unwrap();
    let t3 = engine
        .apply_patch(&pad_id, &new_file_patch("three.txt", "three"), None)
        .unwrap();
    assert_eq!((t1.as_str(), t2.as_str(), t3.as_str()), ("t1", "t2", "t3"));

    let pad = engine.workpad(&pad_id).unwrap();
    assert_eq!(pad.checkpoints, vec!["t1", "t2", "t3"]);

    let checkpoints = engine.checkpoints(&pad_id).unwrap();
    assert_eq!(checkpoints.len(), 3);
    for (index, checkpoint) in checkpoints.iter().enumerate() {
        assert_eq!(checkpoint.id, format!("t{}", index + 1));
        assert_eq!(
            checkpoint.tag_name,
            format!("{}@t{}", pad.branch_name, index + 1)
        );
        assert_eq!(checkpoint.commit_hash.len(), 40);
    }
    assert_eq!(checkpoints[0].message, "Checkpoint 1");
    assert_eq!(checkpoints[1].message, "Add two");

    // The workpad's recorded head is the last checkpoint commit.
    assert_eq!(
        pad.last_commit.as_deref(),
        Some(checkpoints[2].commit_hash.as_str())
    );
}

#[test]
fn test_title_validation_boundaries() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    let exactly_100 = "a".repeat(100);
    let pad_id = engine.create_workpad(&repo_id, &exactly_100).unwrap();
    assert!(engine.workpad(&pad_id).is_some());

    let too_long = "a".repeat(101);
    let err = engine.create_workpad(&repo_id, &too_long).unwrap_err();
    assert!(matches!(err, GitError::InvalidTitle(_)));

    let err = engine.create_workpad(&repo_id, "   ").unwrap_err();
    assert!(matches!(err, GitError::InvalidTitle(_)));
}

#[test]
fn test_init_from_archive_rejects_empty_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = GitEngine::new(dir.path()).unwrap();

    let err = engine
        .init_from_archive(&sample_archive(), "  ", &JsonArchiveExtractor)
        .unwrap_err();
    assert!(matches!(err, GitError::RepositoryInitFailed(_)));
    assert!(engine.list_repositories().is_empty());
}

#[test]
fn test_failed_archive_init_cleans_up_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = GitEngine::new(dir.path()).unwrap();

    // Not valid JSON, so extraction fails mid-init.
    let err = engine
        .init_from_archive(b"not an archive", "Broken", &JsonArchiveExtractor)
        .unwrap_err();
    assert!(matches!(err, GitError::RepositoryInitFailed(_)));

    // No half-initialized directory is left under repos/.
    let repos_dir = dir.path().join("repos");
    assert_eq!(std::fs::read_dir(repos_dir).unwrap().count(), 0);
}

#[test]
fn test_metadata_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (repo_id, pad_id, checkpoints) = {
        let mut engine = GitEngine::new(dir.path()).unwrap();
        let repo_id = engine
            .init_from_archive(&sample_archive(), "Persisted", &JsonArchiveExtractor)
            .unwrap();
        let pad_id = engine.create_workpad(&repo_id, "Durable pad").unwrap();
        engine
            .apply_patch(&pad_id, &new_file_patch("durable.txt", "durable"), None)
            .unwrap();
        let pad = engine.workpad(&pad_id).unwrap();
        (repo_id, pad_id, pad.checkpoints.clone())
    };

    let engine = GitEngine::new(dir.path()).unwrap();
    let repo = engine.repository(&repo_id).expect("repository reloaded");
    assert_eq!(repo.name, "Persisted");
    assert_eq!(repo.workpad_count, 1);

    let pad = engine.workpad(&pad_id).expect("workpad reloaded");
    assert_eq!(pad.title, "Durable pad");
    assert_eq!(pad.checkpoints, checkpoints);
    assert_eq!(pad.status, WorkpadStatus::Active);
}

#[test]
fn test_init_from_remote_local_clone() {
    let (_dir, mut engine, source_repo_id) = engine_with_repo();
    let source_path = engine
        .repository(&source_repo_id)
        .unwrap()
        .path
        .display()
        .to_string();

    let cloned_id = engine.init_from_remote(&source_path, None).unwrap();
    let cloned = engine.repository(&cloned_id).unwrap();
    assert_eq!(cloned.trunk_branch, "main");
    assert_eq!(cloned.source_url.as_deref(), Some(source_path.as_str()));
    // Name is derived from the URL tail: the source repo's directory name.
    assert_eq!(cloned.name, source_repo_id);
    assert!(cloned.path.join("hello.py").exists());

    let named_id = engine
        .init_from_remote(&source_path, Some("named-clone"))
        .unwrap();
    assert_eq!(engine.repository(&named_id).unwrap().name, "named-clone");
}

#[test]
fn test_init_from_remote_failure_surfaces_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = GitEngine::new(dir.path()).unwrap();

    let missing = dir.path().join("no-such-repo").display().to_string();
    let err = engine.init_from_remote(&missing, None).unwrap_err();
    assert!(matches!(err, GitError::RepositoryInitFailed(_)));
    assert_eq!(
        std::fs::read_dir(dir.path().join("repos")).unwrap().count(),
        0
    );
}

#[test]
fn test_switch_and_active_workpad() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    let pad_1 = engine.create_workpad(&repo_id, "First").unwrap();
    let pad_2 = engine.create_workpad(&repo_id, "Second").unwrap();

    engine.switch_workpad(&pad_1).unwrap();
    let active = engine.active_workpad(&repo_id).unwrap().expect("active pad");
    assert_eq!(active.id, pad_1);

    engine.switch_workpad(&pad_2).unwrap();
    let active = engine.active_workpad(&repo_id).unwrap().expect("active pad");
    assert_eq!(active.id, pad_2);

    // On trunk no workpad is active.
    let repo = engine.repository(&repo_id).unwrap();
    GitRunner::new(&repo.path).checkout("main").unwrap();
    assert!(engine.active_workpad(&repo_id).unwrap().is_none());
}

#[test]
fn test_list_workpads_filtered_and_sorted() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    let pad_a = engine.create_workpad(&repo_id, "AAA feature").unwrap();
    let _pad_b = engine.create_workpad(&repo_id, "BBB feature").unwrap();
    let _pad_c = engine.create_workpad(&repo_id, "CCC feature").unwrap();

    engine
        .apply_patch(&pad_a, &new_file_patch("a.txt", "a"), None)
        .unwrap();
    engine.promote_workpad(&pad_a).unwrap();

    let active =
        engine.list_workpads_filtered(None, Some(WorkpadStatus::Active), WorkpadSort::Title, false);
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|pad| pad.status == WorkpadStatus::Active));

    let promoted = engine.list_workpads_filtered(
        None,
        Some(WorkpadStatus::Promoted),
        WorkpadSort::Created,
        false,
    );
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].id, pad_a);

    let by_title = engine.list_workpads_filtered(None, None, WorkpadSort::Title, false);
    assert!(by_title[0].title.starts_with("AAA"));
    assert!(by_title[2].title.starts_with("CCC"));

    let reversed = engine.list_workpads_filtered(None, None, WorkpadSort::Title, true);
    assert!(reversed[0].title.starts_with("CCC"));
}

#[test]
fn test_merge_preview_clean_and_diverged() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    let pad = engine.create_workpad(&repo_id, "Previewed").unwrap();
    engine
        .apply_patch(&pad, &hello_append_patch("print('from pad')"), None)
        .unwrap();

    let preview = engine.merge_preview(&pad).unwrap();
    assert!(preview.can_fast_forward);
    assert_eq!(preview.commits_ahead, 1);
    assert_eq!(preview.commits_behind, 0);
    assert!(preview.files_changed > 0);
    assert!(preview.conflicts.is_empty());
    assert!(preview.ready_to_promote);

    // Move trunk through a second pad touching the same file.
    let trunk_pad = engine.create_workpad(&repo_id, "Trunk change").unwrap();
    engine
        .apply_patch(&trunk_pad, &hello_append_patch("print('from trunk')"), None)
        .unwrap();
    engine.promote_workpad(&trunk_pad).unwrap();

    let preview = engine.merge_preview(&pad).unwrap();
    assert!(!preview.can_fast_forward);
    assert!(preview.commits_behind > 0);
    assert!(!preview.ready_to_promote);
    assert_eq!(preview.conflicts, vec!["hello.py".to_string()]);
}

#[test]
fn test_merge_preview_respects_red_tests() {
    let (_dir, mut engine, repo_id) = engine_with_repo();
    let pad = engine.create_workpad(&repo_id, "Red tests").unwrap();
    engine
        .apply_patch(&pad, &new_file_patch("red.txt", "red"), None)
        .unwrap();

    engine
        .set_test_status(&pad, sologit_engine::TestStatus::Red)
        .unwrap();
    let preview = engine.merge_preview(&pad).unwrap();
    assert!(preview.can_fast_forward);
    assert!(!preview.ready_to_promote);

    engine
        .set_test_status(&pad, sologit_engine::TestStatus::Green)
        .unwrap();
    assert!(engine.merge_preview(&pad).unwrap().ready_to_promote);
}

#[test]
fn test_compare_workpads() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    let pad_1 = engine.create_workpad(&repo_id, "Compare one").unwrap();
    engine
        .apply_patch(&pad_1, &hello_append_patch("print('one')"), None)
        .unwrap();

    let pad_2 = engine.create_workpad(&repo_id, "Compare two").unwrap();
    engine
        .apply_patch(&pad_2, &hello_append_patch("print('two')"), None)
        .unwrap();

    let comparison = engine.compare_workpads(&pad_1, &pad_2).unwrap();
    assert_eq!(comparison.pad_a.id, pad_1);
    assert_eq!(comparison.pad_b.id, pad_2);
    assert_eq!(comparison.files_changed, 1);
    assert!(comparison.diff.contains("hello.py"));
}

#[test]
fn test_diff_against_trunk() {
    let (_dir, mut engine, repo_id) = engine_with_repo();
    let pad = engine.create_workpad(&repo_id, "Diffed").unwrap();
    engine
        .apply_patch(&pad, &hello_append_patch("print('diffed')"), None)
        .unwrap();

    let diff = engine.diff(&pad, None).unwrap();
    assert!(diff.contains("+    print('diffed')"));
    assert!(diff.contains("hello.py"));

    let explicit = engine.diff(&pad, Some("trunk")).unwrap();
    assert_eq!(diff, explicit);
}

#[test]
fn test_delete_workpad_keeps_audit_record() {
    let (_dir, mut engine, repo_id) = engine_with_repo();
    let pad = engine.create_workpad(&repo_id, "Doomed").unwrap();
    engine
        .apply_patch(&pad, &new_file_patch("doomed.txt", "doomed"), None)
        .unwrap();
    let branch = engine.workpad(&pad).unwrap().branch_name.clone();

    engine.delete_workpad(&pad, true).unwrap();

    let record = engine.workpad(&pad).expect("record retained");
    assert_eq!(record.status, WorkpadStatus::Deleted);
    assert_eq!(engine.repository(&repo_id).unwrap().workpad_count, 0);

    let repo = engine.repository(&repo_id).unwrap();
    assert!(GitRunner::new(&repo.path).rev_parse(&branch).is_err());
}

#[test]
fn test_cleanup_is_repo_and_status_scoped() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = GitEngine::new(dir.path()).unwrap();
    let repo_1 = engine
        .init_from_archive(&sample_archive(), "repo1", &JsonArchiveExtractor)
        .unwrap();
    let repo_2 = engine
        .init_from_archive(&sample_archive(), "repo2", &JsonArchiveExtractor)
        .unwrap();

    let pad_1 = engine.create_workpad(&repo_1, "Old in repo1").unwrap();
    let pad_2 = engine.create_workpad(&repo_2, "Old in repo2").unwrap();

    // A zero-day horizon catches every pad; scope to repo_1 only.
    let deleted = engine.cleanup_workpads(Some(&repo_1), 0, None).unwrap();
    assert_eq!(deleted, vec![pad_1.clone()]);
    assert_eq!(
        engine.workpad(&pad_1).unwrap().status,
        WorkpadStatus::Deleted
    );
    assert_eq!(
        engine.workpad(&pad_2).unwrap().status,
        WorkpadStatus::Active
    );

    // A seven-day horizon leaves fresh pads alone.
    let deleted = engine.cleanup_workpads(None, 7, None).unwrap();
    assert!(deleted.is_empty());

    // Status-filtered cleanup ignores non-matching pads.
    let deleted = engine
        .cleanup_workpads(None, 0, Some(WorkpadStatus::Promoted))
        .unwrap();
    assert!(deleted.is_empty());
    assert_eq!(
        engine.workpad(&pad_2).unwrap().status,
        WorkpadStatus::Active
    );
}

#[test]
fn test_revert_last_trunk_commit() {
    let (_dir, mut engine, repo_id) = engine_with_repo();
    let repo_path = engine.repository(&repo_id).unwrap().path.clone();
    let before = GitRunner::new(&repo_path).rev_parse("main").unwrap();

    let pad = engine.create_workpad(&repo_id, "To revert").unwrap();
    engine
        .apply_patch(&pad, &new_file_patch("mistake.txt", "oops"), None)
        .unwrap();
    engine.promote_workpad(&pad).unwrap();
    assert!(repo_path.join("mistake.txt").exists());

    engine.revert_last_trunk_commit(&repo_id).unwrap();
    assert_eq!(GitRunner::new(&repo_path).rev_parse("main").unwrap(), before);
    assert!(!repo_path.join("mistake.txt").exists());
}

#[test]
fn test_update_repo_metadata_delta() {
    let (_dir, mut engine, repo_id) = engine_with_repo();

    engine.update_repo_metadata(&repo_id, 2, true).unwrap();
    assert_eq!(engine.repository(&repo_id).unwrap().workpad_count, 2);

    engine.update_repo_metadata(&repo_id, -1, false).unwrap();
    assert_eq!(engine.repository(&repo_id).unwrap().workpad_count, 1);

    // Deltas never underflow.
    engine.update_repo_metadata(&repo_id, -5, false).unwrap();
    assert_eq!(engine.repository(&repo_id).unwrap().workpad_count, 0);

    let err = engine.update_repo_metadata("repo_missing1", 1, false).unwrap_err();
    assert!(matches!(err, GitError::RepositoryNotFound(_)));
}

#[test]
fn test_file_map_lists_working_tree() {
    let (_dir, engine, repo_id) = engine_with_repo();
    let tree = engine.file_map(&repo_id).unwrap();

    let names: Vec<&str> = tree.children.iter().map(|n| n.name.as_str()).collect();
    assert!(names.contains(&"hello.py"));
    assert!(names.contains(&"README.md"));
    assert!(!names.contains(&".git"));
}

#[test]
fn test_workpad_not_found_errors() {
    let (_dir, mut engine, _repo_id) = engine_with_repo();

    assert!(matches!(
        engine.apply_patch("pad_missing1", "diff", None),
        Err(GitError::WorkpadNotFound(_))
    ));
    assert!(!engine.can_promote("pad_missing1"));
    assert!(matches!(
        engine.promote_workpad("pad_missing1"),
        Err(GitError::WorkpadNotFound(_))
    ));
}
