//! Key-value persistence media.

use std::{
    collections::HashMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::debug;

/// Root directory under the user's data directory used for stored workouts.
pub const DEFAULT_DATA_DIR: &str = "mapty";

static KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("failed to compile storage key regex"));

/// Whether `key` can be used with every medium (it doubles as a file stem).
pub fn is_valid_key(key: &str) -> bool {
    KEY_RE.is_match(key)
}

/// Opaque string store the workout store persists into.
pub trait KeyValueStore {
    /// Read the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Replace the value stored under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    /// Delete `key`; deleting an absent key succeeds.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory medium. Clones share the same contents, so a fresh store built
/// from a clone behaves like a restarted session reading the same profile.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no key is held.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.inner.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }
}

/// File-backed medium storing each key as `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the provided directory. The directory is
    /// created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the user's data directory.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DATA_DIR)
    }

    /// Directory holding the key files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(anyhow!("invalid storage key '{key}'"));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let mut temp = NamedTempFile::new_in(&self.root)
            .with_context(|| format!("failed to create temp file in {}", self.root.display()))?;
        temp.write_all(value.as_bytes())
            .with_context(|| format!("failed to write temp file for {}", path.display()))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("failed to flush temp file for {}", path.display()))?;
        temp.persist(&path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        debug!(path = %path.display(), bytes = value.len(), "stored value");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let mut store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.get("workouts")?, None);
        store.set("workouts", "[1]")?;
        store.set("workouts", "[1,2]")?;
        assert_eq!(store.get("workouts")?.as_deref(), Some("[1,2]"));
        assert!(dir.path().join("nested/workouts.json").exists());

        store.remove("workouts")?;
        assert_eq!(store.get("workouts")?, None);
        store.remove("workouts")?;
        Ok(())
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempdir().expect("tempdir");
        let mut store = FileStore::new(dir.path());
        assert!(store.set("../escape", "x").is_err());
        assert!(store.get("a/b").is_err());
        assert!(is_valid_key("workouts_v1-backup"));
        assert!(!is_valid_key(""));
    }

    #[test]
    fn memory_store_clones_share_contents() -> Result<()> {
        let mut first = MemoryStore::new();
        let second = first.clone();
        first.set("workouts", "[]")?;
        assert_eq!(second.get("workouts")?.as_deref(), Some("[]"));
        assert_eq!(second.len(), 1);

        first.remove("workouts")?;
        assert!(second.is_empty());
        Ok(())
    }
}
