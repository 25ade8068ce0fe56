use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;

use crate::diff::Tree;

/// Local snapshot cache: one JSON document per scraper, written atomically
/// (temp file in the target directory, flush, rename).
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached tree. A missing file is a silent miss; an unreadable
    /// or malformed file is logged and treated as a miss.
    pub async fn read(&self) -> Option<Tree> {
        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || read_sync(&path)).await {
            Ok(tree) => tree,
            Err(err) => {
                warn!("cache read task failed: {err}");
                None
            }
        }
    }

    /// Write `tree` to the cache file atomically.
    pub async fn write(&self, tree: &Tree) -> anyhow::Result<()> {
        let path = self.path.clone();
        let mut payload = serde_json::to_vec_pretty(tree)?;
        payload.push(b'\n');
        tokio::task::spawn_blocking(move || write_sync(&path, &payload))
            .await
            .context("cache write task failed")?
    }
}

fn read_sync(path: &Path) -> Option<Tree> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            if path.exists() {
                warn!("failed to read cache file {}: {err}", path.display());
            }
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(tree) => Some(tree),
        Err(_) => {
            warn!("cache file {} contained invalid JSON", path.display());
            None
        }
    }
}

fn write_sync(path: &Path, payload: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .context("cache file path has no parent directory")?;
    // NamedTempFile removes the temporary file on drop, so every early
    // return below leaves no debris behind.
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    file.write_all(payload)?;
    file.as_file().sync_all()?;
    file.persist(path)
        .with_context(|| format!("renaming over {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tree(value: serde_json::Value) -> Tree {
        Tree::from_value(value)
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("claremont.json"));
        let snapshot = tree(json!({"A": 1, "B": {"C": [1, 2, 3]}}));

        cache.write(&snapshot).await.unwrap();
        assert_eq!(cache.read().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn missing_file_is_a_silent_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("absent.json"));
        assert!(cache.read().await.is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(LocalCache::new(path).read().await.is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_debris() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("cache.json");
        let cache = LocalCache::new(missing);
        assert!(cache.write(&tree(json!({}))).await.is_err());
        // The parent never existed, so nothing may have been created.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rewrite_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("claremont.json"));
        cache.write(&tree(json!({"A": 1}))).await.unwrap();
        cache.write(&tree(json!({"A": 2}))).await.unwrap();
        assert_eq!(cache.read().await.unwrap().to_value(), json!({"A": 2}));
        // Only the target file remains; the temp file was renamed away.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
