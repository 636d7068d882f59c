//! Repository lifecycle: initialization, metadata persistence, trunk ops.
//!
//! [`GitEngine`] owns the repository and workpad metadata maps and the two
//! JSON files backing them. Workpad operations live in the sibling
//! `workpads` module; everything repository-scoped is here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::git::error::{GitError, GitResult};
use crate::git::runner::GitRunner;
use crate::git::types::{generate_id, Repository, SourceKind, Workpad, DEFAULT_TRUNK_BRANCH};
use crate::storage;

/// Maximum recursion depth for [`GitEngine::file_map`].
const FILE_MAP_MAX_DEPTH: usize = 5;

/// Directory names never included in a repository file map.
const FILE_MAP_IGNORED: &[&str] = &["node_modules", "__pycache__", ".git", "venv", ".venv"];

/// Hidden files that are still worth showing in a file map.
const FILE_MAP_VISIBLE_HIDDEN: &[&str] = &[".gitignore", ".env.example"];

/// External collaborator that unpacks an uploaded archive into a directory.
///
/// Archive formats and their parsing live outside the engine; the engine
/// hands over the raw bytes and a freshly created destination directory.
pub trait ArchiveExtractor {
    fn extract(&self, archive: &[u8], dest: &Path) -> std::io::Result<()>;
}

/// Node in a repository file map.
#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    pub name: String,
    /// Path relative to the repository root.
    pub path: String,
    pub kind: FileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
}

/// Core engine for repositories and workpads.
///
/// Exclusively owns `metadata/repositories.json`, `metadata/workpads.json`,
/// and the working trees under `repos/`.
pub struct GitEngine {
    pub(crate) data_dir: PathBuf,
    pub(crate) repos_dir: PathBuf,
    pub(crate) metadata_dir: PathBuf,
    pub(crate) repositories: BTreeMap<String, Repository>,
    pub(crate) workpads: BTreeMap<String, Workpad>,
}

impl GitEngine {
    /// Open (or create) an engine rooted at `data_dir`.
    ///
    /// Loads both metadata files; missing or corrupt files start empty.
    pub fn new(data_dir: impl Into<PathBuf>) -> GitResult<Self> {
        let data_dir = data_dir.into();
        let repos_dir = data_dir.join("repos");
        let metadata_dir = data_dir.join("metadata");
        std::fs::create_dir_all(&repos_dir)?;
        std::fs::create_dir_all(&metadata_dir)?;

        let repositories: BTreeMap<String, Repository> =
            storage::read_json_or_default(&metadata_dir.join("repositories.json"));
        let workpads: BTreeMap<String, Workpad> =
            storage::read_json_or_default(&metadata_dir.join("workpads.json"));

        debug!(
            "loaded {} repositories and {} workpads",
            repositories.len(),
            workpads.len()
        );
        info!("git engine initialized at {}", data_dir.display());

        Ok(Self {
            data_dir,
            repos_dir,
            metadata_dir,
            repositories,
            workpads,
        })
    }

    /// Open an engine at the default data root, `~/.sologit/data`.
    pub fn with_default_data_dir() -> GitResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            GitError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        Self::new(home.join(".sologit").join("data"))
    }

    /// Root of the engine's on-disk state.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn repositories_file(&self) -> PathBuf {
        self.metadata_dir.join("repositories.json")
    }

    fn workpads_file(&self) -> PathBuf {
        self.metadata_dir.join("workpads.json")
    }

    /// Rewrite both metadata files atomically.
    pub(crate) fn save_metadata(&self) -> GitResult<()> {
        storage::write_json_atomic(&self.repositories_file(), &self.repositories)?;
        storage::write_json_atomic(&self.workpads_file(), &self.workpads)?;
        debug!("metadata saved");
        Ok(())
    }

    /// Initialize a repository from archive bytes.
    ///
    /// The archive is unpacked by the supplied extractor into a fresh
    /// directory named after the generated repository id, an initial commit
    /// is created, and the default branch is forced to `main`. On any
    /// failure the directory is removed before the error surfaces.
    pub fn init_from_archive(
        &mut self,
        archive: &[u8],
        name: &str,
        extractor: &dyn ArchiveExtractor,
    ) -> GitResult<String> {
        info!("initializing repository from archive: {name}");

        if name.trim().is_empty() {
            return Err(GitError::init_failed("repository name is empty"));
        }

        let repo_id = generate_id("repo");
        let repo_path = self.repos_dir.join(&repo_id);

        if let Err(err) = Self::unpack_and_init(archive, &repo_path, extractor) {
            if repo_path.exists() {
                if let Err(cleanup_err) = std::fs::remove_dir_all(&repo_path) {
                    warn!(
                        "failed to remove partial repository {}: {cleanup_err}",
                        repo_path.display()
                    );
                }
            }
            return Err(GitError::init_failed(err.to_string()));
        }

        let now = Utc::now();
        let repository = Repository {
            id: repo_id.clone(),
            name: name.to_string(),
            path: repo_path,
            trunk_branch: DEFAULT_TRUNK_BRANCH.to_string(),
            created_at: now,
            workpad_count: 0,
            source_type: SourceKind::Archive,
            source_url: None,
            last_activity: now,
        };
        self.repositories.insert(repo_id.clone(), repository);
        self.save_metadata()?;

        info!("repository initialized: {repo_id}");
        Ok(repo_id)
    }

    fn unpack_and_init(
        archive: &[u8],
        repo_path: &Path,
        extractor: &dyn ArchiveExtractor,
    ) -> GitResult<()> {
        std::fs::create_dir_all(repo_path)?;
        extractor.extract(archive, repo_path)?;
        debug!("extracted archive to {}", repo_path.display());

        let runner = GitRunner::init(repo_path)?;
        runner.add_all()?;
        runner.commit("Initial commit from zip")?;
        runner.rename_branch(DEFAULT_TRUNK_BRANCH)?;
        debug!("initialized git repository at {}", repo_path.display());
        Ok(())
    }

    /// Initialize a repository by cloning a remote.
    ///
    /// The clone's active branch becomes the trunk. When `name` is absent
    /// it is derived from the URL tail with any `.git` suffix stripped.
    pub fn init_from_remote(&mut self, url: &str, name: Option<&str>) -> GitResult<String> {
        info!("initializing repository from remote: {url}");

        let repo_id = generate_id("repo");
        let repo_path = self.repos_dir.join(&repo_id);

        let trunk_branch = match Self::clone_and_detect_trunk(url, &repo_path) {
            Ok(trunk) => trunk,
            Err(err) => {
                if repo_path.exists() {
                    if let Err(cleanup_err) = std::fs::remove_dir_all(&repo_path) {
                        warn!(
                            "failed to remove partial repository {}: {cleanup_err}",
                            repo_path.display()
                        );
                    }
                }
                return Err(GitError::init_failed(err.to_string()));
            }
        };

        let name = match name {
            Some(name) => name.to_string(),
            None => derive_name_from_url(url),
        };

        let now = Utc::now();
        let repository = Repository {
            id: repo_id.clone(),
            name,
            path: repo_path,
            trunk_branch,
            created_at: now,
            workpad_count: 0,
            source_type: SourceKind::Remote,
            source_url: Some(url.to_string()),
            last_activity: now,
        };
        self.repositories.insert(repo_id.clone(), repository);
        self.save_metadata()?;

        info!("repository initialized: {repo_id}");
        Ok(repo_id)
    }

    fn clone_and_detect_trunk(url: &str, repo_path: &Path) -> GitResult<String> {
        let runner = GitRunner::clone_into(url, repo_path)?;
        debug!("cloned repository to {}", repo_path.display());
        runner.current_branch()
    }

    /// Look up a repository by id.
    pub fn repository(&self, repo_id: &str) -> Option<&Repository> {
        self.repositories.get(repo_id)
    }

    /// All repositories, ordered by id.
    pub fn list_repositories(&self) -> Vec<&Repository> {
        self.repositories.values().collect()
    }

    pub(crate) fn require_repository(&self, repo_id: &str) -> GitResult<&Repository> {
        self.repositories
            .get(repo_id)
            .ok_or_else(|| GitError::repository_not_found(repo_id))
    }

    /// Apply a workpad-count delta and optionally touch the activity
    /// timestamp, then rewrite the metadata file.
    pub fn update_repo_metadata(
        &mut self,
        repo_id: &str,
        workpad_delta: i32,
        touch_activity: bool,
    ) -> GitResult<()> {
        let repo = self
            .repositories
            .get_mut(repo_id)
            .ok_or_else(|| GitError::repository_not_found(repo_id))?;

        if workpad_delta >= 0 {
            repo.workpad_count = repo.workpad_count.saturating_add(workpad_delta as u32);
        } else {
            repo.workpad_count = repo
                .workpad_count
                .saturating_sub(workpad_delta.unsigned_abs());
        }
        if touch_activity {
            repo.last_activity = Utc::now();
        }
        self.save_metadata()
    }

    /// Hard reset trunk to `HEAD~1`. Emergency rollback after a promotion.
    pub fn revert_last_trunk_commit(&mut self, repo_id: &str) -> GitResult<()> {
        warn!("reverting last trunk commit on {repo_id}");

        let repo = self.require_repository(repo_id)?;
        let runner = GitRunner::new(&repo.path);
        runner.checkout(&repo.trunk_branch)?;
        runner.reset_hard("HEAD~1")?;

        let repo = self
            .repositories
            .get_mut(repo_id)
            .ok_or_else(|| GitError::repository_not_found(repo_id))?;
        repo.last_activity = Utc::now();
        self.save_metadata()?;

        info!("reverted last commit on trunk of {repo_id}");
        Ok(())
    }

    /// Bounded-depth file tree of a repository's working copy.
    pub fn file_map(&self, repo_id: &str) -> GitResult<FileNode> {
        let repo = self.require_repository(repo_id)?;
        walk_directory(&repo.path, &repo.path, 0).ok_or_else(|| {
            GitError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("working tree missing at {}", repo.path.display()),
            ))
        })
    }

    pub(crate) fn runner_for(&self, repo: &Repository) -> GitRunner {
        GitRunner::new(&repo.path)
    }
}

fn derive_name_from_url(url: &str) -> String {
    let tail = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url);
    tail.strip_suffix(".git").unwrap_or(tail).to_string()
}

fn walk_directory(path: &Path, root: &Path, depth: usize) -> Option<FileNode> {
    let name = path.file_name()?.to_string_lossy().to_string();

    // The root directory itself is never filtered, only its contents.
    if depth > 0 {
        if name.starts_with('.') && !FILE_MAP_VISIBLE_HIDDEN.contains(&name.as_str()) {
            return None;
        }
        if FILE_MAP_IGNORED.contains(&name.as_str()) {
            return None;
        }
    }

    let relative = path
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| name.clone());

    if path.is_file() {
        let size = std::fs::metadata(path).map(|m| m.len()).ok();
        return Some(FileNode {
            name,
            path: relative,
            kind: FileKind::File,
            size,
            children: Vec::new(),
        });
    }

    if path.is_dir() && depth < FILE_MAP_MAX_DEPTH {
        let mut children = Vec::new();
        if let Ok(entries) = std::fs::read_dir(path) {
            let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
            paths.sort();
            for child in paths {
                if let Some(node) = walk_directory(&child, root, depth + 1) {
                    children.push(node);
                }
            }
        }
        return Some(FileNode {
            name,
            path: relative,
            kind: FileKind::Directory,
            size: None,
            children,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_name_from_url() {
        assert_eq!(derive_name_from_url("https://example.com/org/demo.git"), "demo");
        assert_eq!(derive_name_from_url("https://example.com/org/demo"), "demo");
        assert_eq!(derive_name_from_url("git@host:demo.git/"), "demo");
    }

    #[test]
    fn test_walk_directory_skips_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("visible.txt"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden"), "x").unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target\n").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("lib.rs"), "x").unwrap();

        let tree = walk_directory(dir.path(), dir.path(), 0).unwrap();
        let names: Vec<&str> = tree.children.iter().map(|n| n.name.as_str()).collect();
        assert!(names.contains(&"visible.txt"));
        assert!(names.contains(&".gitignore"));
        assert!(names.contains(&"src"));
        assert!(!names.contains(&".hidden"));
        assert!(!names.contains(&".git"));
        assert!(!names.contains(&"node_modules"));

        let src = tree
            .children
            .iter()
            .find(|n| n.name == "src")
            .expect("src dir present");
        assert_eq!(src.kind, FileKind::Directory);
        assert_eq!(src.children.len(), 1);
        assert_eq!(src.children[0].path, "src/lib.rs");
    }
}
