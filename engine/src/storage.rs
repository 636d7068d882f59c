//! Crash-safe JSON persistence helpers.
//!
//! Every metadata file the engine owns is written whole: serialize to a
//! `.tmp` sibling, then rename into place. A crash mid-write leaves either
//! the prior file or the new one, never a torn state. Unreadable files are
//! recovered as empty state with a warning so a corrupt ledger never takes
//! the engine down.

use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Serialize `value` as pretty-printed JSON and atomically replace `path`.
///
/// Parent directories are created as needed. The write goes through a
/// `<path>.tmp` sibling followed by a rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    Ok(())
}

/// Load a JSON file, falling back to `T::default()` when the file is
/// missing or unreadable. Corruption is logged, not propagated.
pub(crate) fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!("failed to read {}: {err}", path.display());
            return T::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                "corrupt state file {} ({err}), starting from empty state",
                path.display()
            );
            T::default()
        }
    }
}
