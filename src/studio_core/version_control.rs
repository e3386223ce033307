// Vibe-Forge: Version History
// Bounded per-file ring buffers of versions with an undo/redo cursor.

use crate::agents::FileMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Maximum versions kept per file to prevent unbounded memory growth
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: u64,
    pub label: String,
    pub content: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileVersions {
    versions: VecDeque<VersionRecord>,
    /// Index of the current version in `versions`
    cursor: usize,
}

impl FileVersions {
    fn current(&self) -> Option<&VersionRecord> {
        self.versions.get(self.cursor)
    }
}

/// Undo/redo history keyed by filename
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistory {
    capacity: usize,
    next_id: u64,
    files: HashMap<String, FileVersions>,
}

impl Default for VersionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl VersionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: 1,
            files: HashMap::new(),
        }
    }

    /// Append a version for `filename`, discarding any redo tail.
    /// Returns false when the content equals the current version.
    pub fn record(&mut self, filename: &str, content: &str, label: &str) -> bool {
        let capacity = self.capacity;
        let entry = self.files.entry(filename.to_string()).or_default();

        if entry.current().map(|v| v.content == content).unwrap_or(false) {
            return false;
        }

        if !entry.versions.is_empty() {
            entry.versions.truncate(entry.cursor + 1);
        }
        entry.versions.push_back(VersionRecord {
            id: self.next_id,
            label: label.to_string(),
            content: content.to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        });
        self.next_id += 1;

        while entry.versions.len() > capacity {
            entry.versions.pop_front();
        }
        entry.cursor = entry.versions.len() - 1;
        true
    }

    /// Record every file of a snapshot; returns how many versions were added
    pub fn snapshot(&mut self, files: &FileMap, label: &str) -> usize {
        files
            .iter()
            .filter(|(filename, content)| self.record(filename, content, label))
            .count()
    }

    /// Step back one version and return its content
    pub fn undo(&mut self, filename: &str) -> Option<&str> {
        let entry = self.files.get_mut(filename)?;
        if entry.cursor == 0 {
            return None;
        }
        entry.cursor -= 1;
        entry.current().map(|v| v.content.as_str())
    }

    /// Step forward one version and return its content
    pub fn redo(&mut self, filename: &str) -> Option<&str> {
        let entry = self.files.get_mut(filename)?;
        if entry.cursor + 1 >= entry.versions.len() {
            return None;
        }
        entry.cursor += 1;
        entry.current().map(|v| v.content.as_str())
    }

    pub fn current(&self, filename: &str) -> Option<&VersionRecord> {
        self.files.get(filename).and_then(FileVersions::current)
    }

    pub fn can_undo(&self, filename: &str) -> bool {
        self.files.get(filename).map(|f| f.cursor > 0).unwrap_or(false)
    }

    pub fn can_redo(&self, filename: &str) -> bool {
        self.files
            .get(filename)
            .map(|f| f.cursor + 1 < f.versions.len())
            .unwrap_or(false)
    }

    /// Versions for a file, oldest first
    pub fn versions(&self, filename: &str) -> Vec<&VersionRecord> {
        self.files
            .get(filename)
            .map(|f| f.versions.iter().collect())
            .unwrap_or_default()
    }

    /// Current content of every tracked file
    pub fn current_files(&self) -> FileMap {
        self.files
            .iter()
            .filter_map(|(name, f)| f.current().map(|v| (name.clone(), v.content.clone())))
            .collect()
    }
}
