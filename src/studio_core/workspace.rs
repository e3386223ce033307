// Vibe-Forge: Workspace Merge
// Merges File Operations back into a file-map snapshot.

use super::version_control::VersionHistory;
use crate::agents::{FileMap, FileOperation};

/// Apply operations to a snapshot, returning the new snapshot.
/// Later operations on the same file win.
pub fn apply_operations(files: &FileMap, operations: &[FileOperation]) -> FileMap {
    let mut merged = files.clone();
    for op in operations {
        merged.insert(op.filename.clone(), op.content.clone());
    }
    merged
}

/// Apply operations and record each changed file in the history
pub fn apply_with_history(
    files: &FileMap,
    operations: &[FileOperation],
    history: &mut VersionHistory,
    label: &str,
) -> FileMap {
    for (filename, content) in files {
        if history.current(filename).is_none() {
            history.record(filename, content, "baseline");
        }
    }
    for op in operations {
        history.record(&op.filename, &op.content, label);
    }
    apply_operations(files, operations)
}

/// Files whose content differs between two snapshots, plus new files
pub fn changed_files(before: &FileMap, after: &FileMap) -> Vec<String> {
    after
        .iter()
        .filter(|(name, content)| before.get(*name) != Some(*content))
        .map(|(name, _)| name.clone())
        .collect()
}
