// Vibe-Forge: Storage Backends
// Uniform key/value contract over in-process storage or a directory of JSON files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub trait StorageBackend: Send + Sync {
    /// Raw value for `key`, `None` when absent
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Raw value for `key`, or `default` when absent or unreadable
    fn read_or(&self, key: &str, default: &str) -> String {
        match self.read(key) {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(e) => {
                log::warn!("Failed to read '{}': {}", key, e);
                default.to_string()
            }
        }
    }
}

/// Parse a JSON value, falling back to `default` on absence or corruption
pub fn read_json<T: DeserializeOwned>(backend: &dyn StorageBackend, key: &str, default: T) -> T {
    match backend.read(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("Discarding unparsable value for '{}': {}", key, e);
            default
        }),
        Ok(None) => default,
        Err(e) => {
            log::warn!("Failed to read '{}': {}", key, e);
            default
        }
    }
}

pub fn write_json<T: Serialize + ?Sized>(backend: &dyn StorageBackend, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    backend.write(key, &raw)
}

/// In-process storage, lost when the process exits
#[derive(Default)]
pub struct LocalStorageBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl LocalStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded with values, e.g. rules for tests
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

impl StorageBackend for LocalStorageBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("local storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("local storage lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a root directory
pub struct FileSystemBackend {
    root: PathBuf,
}

impl FileSystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating memory directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", name))
    }
}

impl StorageBackend for FileSystemBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(content))
    }

    /// Write to a temp file, then rename over the target
    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}
