// Vibe-Forge: Memory Store
// Rules (read-only), session context and learned bug patterns behind one
// injectable handle. Backing storage is pluggable.

pub mod backend;
pub mod codebase_map;
pub mod compressor;

pub use backend::{read_json, write_json, FileSystemBackend, LocalStorageBackend, StorageBackend};
pub use codebase_map::{CodebaseMap, FileSummary};
pub use compressor::{CompressorConfig, ContextCompressor, Turn, TurnRole};

use crate::agents::ErrorCategory;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const GLOBAL_RULES_KEY: &str = "vibe_forge.rules.global";
pub const PROJECT_RULES_KEY: &str = "vibe_forge.rules.project";
pub const SUMMARIES_KEY: &str = "vibe_forge.context.summaries";
pub const CODEBASE_MAP_KEY: &str = "vibe_forge.context.codebase_map";
pub const BUG_PATTERNS_KEY: &str = "vibe_forge.learnings.bug_patterns";

/// Maximum bug patterns kept system-wide
pub const DEFAULT_PATTERN_CAP: usize = 100;

/// A diagnosed error and the fix that resolved it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugPattern {
    pub id: String,
    pub category: ErrorCategory,
    /// Normalized error text
    pub pattern: String,
    /// What resolved it
    pub fix: String,
    pub file: String,
    pub timestamp: DateTime<Utc>,
}

impl BugPattern {
    pub fn new(category: ErrorCategory, pattern: &str, fix: &str, file: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            pattern: pattern.to_string(),
            fix: fix.to_string(),
            file: file.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Few-shot rendering for prompts
    pub fn as_example(&self) -> String {
        format!("{} in {}: \"{}\" -> {}", self.category.as_str(), self.file, self.pattern, self.fix)
    }
}

struct MemoryInner {
    backend: Arc<dyn StorageBackend>,
    pattern_cap: usize,
    /// Serializes read-append-trim-write of the pattern log
    learnings_lock: Mutex<()>,
    context_lock: Mutex<()>,
}

/// Cloneable handle; construct once per process and inject
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_pattern_cap(backend, DEFAULT_PATTERN_CAP)
    }

    pub fn with_pattern_cap(backend: Arc<dyn StorageBackend>, pattern_cap: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                backend,
                pattern_cap: pattern_cap.max(1),
                learnings_lock: Mutex::new(()),
                context_lock: Mutex::new(()),
            }),
        }
    }

    /// Process-local store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(LocalStorageBackend::new()))
    }

    /// Store backed by a directory of JSON files
    pub fn on_disk(dir: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(FileSystemBackend::new(dir)?)))
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.inner.backend.as_ref()
    }

    // ------------------------------------------------------------------
    // Rules (read-only)
    // ------------------------------------------------------------------

    /// Global then project rules, verbatim
    pub fn rules(&self) -> String {
        let global = self.backend().read_or(GLOBAL_RULES_KEY, "");
        let project = self.backend().read_or(PROJECT_RULES_KEY, "");
        [global.trim(), project.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    pub fn summaries(&self) -> Vec<String> {
        self.list_or_empty(SUMMARIES_KEY)
    }

    pub async fn append_summary(&self, summary: &str) -> Result<()> {
        let _guard = self.inner.context_lock.lock().await;
        let mut summaries: Vec<String> = self.read_list(SUMMARIES_KEY)?;
        summaries.push(summary.to_string());
        write_json(self.backend(), SUMMARIES_KEY, &summaries)
    }

    /// All stored summaries as one block, if any
    pub fn session_summary(&self) -> Option<String> {
        let summaries = self.summaries();
        if summaries.is_empty() {
            None
        } else {
            Some(summaries.join("\n\n"))
        }
    }

    pub async fn set_codebase_map(&self, map: &CodebaseMap) -> Result<()> {
        let _guard = self.inner.context_lock.lock().await;
        write_json(self.backend(), CODEBASE_MAP_KEY, map)
    }

    /// Rendered codebase map, if one has been stored
    pub fn codebase_map(&self) -> Option<String> {
        let map: Option<CodebaseMap> = read_json(self.backend(), CODEBASE_MAP_KEY, None);
        map.filter(|m| !m.is_empty()).map(|m| m.render())
    }

    // ------------------------------------------------------------------
    // Learnings
    // ------------------------------------------------------------------

    /// All patterns, oldest first
    pub fn patterns(&self) -> Vec<BugPattern> {
        self.list_or_empty(BUG_PATTERNS_KEY)
    }

    /// Append one pattern and evict the oldest beyond the cap.
    /// Returns the number of patterns retained.
    pub async fn record_pattern(&self, pattern: BugPattern) -> Result<usize> {
        let _guard = self.inner.learnings_lock.lock().await;
        let mut patterns: Vec<BugPattern> = self.read_list(BUG_PATTERNS_KEY)?;
        patterns.push(pattern);
        if patterns.len() > self.inner.pattern_cap {
            let excess = patterns.len() - self.inner.pattern_cap;
            patterns.drain(..excess);
        }
        write_json(self.backend(), BUG_PATTERNS_KEY, &patterns)?;
        Ok(patterns.len())
    }

    /// Most recent patterns of one category, newest first
    pub fn patterns_for(&self, category: ErrorCategory, limit: usize) -> Vec<BugPattern> {
        self.patterns()
            .into_iter()
            .rev()
            .filter(|p| p.category == category)
            .take(limit)
            .collect()
    }

    /// Most recent patterns of any category, newest first
    pub fn recent_patterns(&self, limit: usize) -> Vec<BugPattern> {
        self.patterns().into_iter().rev().take(limit).collect()
    }

    /// Stored JSON list under `key`. Entries that no longer parse are skipped;
    /// a read failure or a value that is not a list is an error, so appends
    /// never overwrite a log they could not load.
    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(raw) = self.backend().read(key)? else {
            return Ok(Vec::new());
        };
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&raw).with_context(|| format!("parsing stored list '{}'", key))?;
        let total = entries.len();
        let items: Vec<T> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if items.len() < total {
            log::warn!("Skipped {} unreadable entries in '{}'", total - items.len(), key);
        }
        Ok(items)
    }

    fn list_or_empty<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.read_list(key).unwrap_or_else(|e| {
            log::warn!("{:#}", e);
            Vec::new()
        })
    }
}
