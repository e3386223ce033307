// Vibe-Forge: Preview Runner Interface
// The sandbox that executes a file map and reports the first runtime error.

use crate::agents::{FileMap, RuntimeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreviewReport {
    Success,
    RuntimeError(RuntimeError),
}

impl PreviewReport {
    pub fn is_success(&self) -> bool {
        matches!(self, PreviewReport::Success)
    }

    pub fn error(&self) -> Option<&RuntimeError> {
        match self {
            PreviewReport::Success => None,
            PreviewReport::RuntimeError(error) => Some(error),
        }
    }
}

/// Executes an artifact in an isolated sandbox
#[async_trait]
pub trait PreviewRunner: Send + Sync {
    async fn run(&self, files: &FileMap) -> anyhow::Result<PreviewReport>;
}
