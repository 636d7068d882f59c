//! Shared fixtures for integration tests: an in-memory archive format
//! and canned patches against the sample project.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use sologit_engine::git::{ArchiveExtractor, GitEngine};

/// Contents of `hello.py` in the sample archive.
pub const HELLO_CONTENT: &str = "def hello():\n    print('Hello')\n";

/// Archive extractor for tests: the archive bytes are a JSON map of
/// relative path to file content.
pub struct JsonArchiveExtractor;

impl ArchiveExtractor for JsonArchiveExtractor {
    fn extract(&self, archive: &[u8], dest: &Path) -> std::io::Result<()> {
        let files: BTreeMap<String, String> = serde_json::from_slice(archive)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        for (path, content) in files {
            let full_path = dest.join(&path);
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full_path, content)?;
        }
        Ok(())
    }
}

/// Archive bytes for the sample project (`hello.py` + `README.md`).
pub fn sample_archive() -> Vec<u8> {
    let mut files = BTreeMap::new();
    files.insert("hello.py".to_string(), HELLO_CONTENT.to_string());
    files.insert("README.md".to_string(), "# Test Project\n".to_string());
    serde_json::to_vec(&files).expect("serialize sample archive")
}

/// Engine rooted in a fresh temp dir, plus a repository initialized from
/// the sample archive.
pub fn engine_with_repo() -> (tempfile::TempDir, GitEngine, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = GitEngine::new(dir.path()).expect("engine");
    let repo_id = engine
        .init_from_archive(&sample_archive(), "Test Project", &JsonArchiveExtractor)
        .expect("init from archive");
    (dir, engine, repo_id)
}

/// Four-line addition to `hello.py`: a farewell function. Applies cleanly
/// to the pristine sample project.
pub fn farewell_patch() -> String {
    r#"diff --git a/hello.py b/hello.py
--- a/hello.py
+++ b/hello.py
@@ -1,2 +1,6 @@
 def hello():
     print('Hello')
+
+
+def farewell():
+    print('Goodbye')
"#
    .to_string()
}

/// Patch creating a new single-line file.
pub fn new_file_patch(path: &str, line: &str) -> String {
    format!(
        r#"diff --git a/{path} b/{path}
--- /dev/null
+++ b/{path}
@@ -0,0 +1 @@
+{line}
"#
    )
}

/// Patch appending a line to the pristine `hello.py`.
pub fn hello_append_patch(line: &str) -> String {
    format!(
        r#"diff --git a/hello.py b/hello.py
--- a/hello.py
+++ b/hello.py
@@ -1,2 +1,3 @@
 def hello():
     print('Hello')
+    {line}
"#
    )
}

/// Patch whose context does not match `hello.py`, so it never applies.
pub fn conflicting_patch() -> String {
    r#"diff --git a/hello.py b/hello.py
--- a/hello.py
+++ b/hello.py
@@ -1,2 +1,3 @@
 def hello():
     print('Bonjour')
+    print('conflict')
"#
    .to_string()
}
