// Vibe-Forge: Context Compressor
// Bounds conversation size: every N turns the log is summarized into the
// Memory Store and only a short tail of raw turns is kept.

use super::MemoryStore;
use crate::llm::{LanguageModel, ModelRequest, SystemPrompts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressorConfig {
    /// Summarize after this many turns
    pub summarize_every: usize,
    /// Raw turns kept after summarizing
    pub retain_turns: usize,
    pub summary_max_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            summarize_every: 20,
            retain_turns: 5,
            summary_max_chars: 2000,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Default)]
struct SessionState {
    turns: Vec<Turn>,
    summaries: Vec<String>,
    turn_count: usize,
    /// Turns added since the last stored summary
    pending: usize,
}

pub struct ContextCompressor {
    model: Arc<dyn LanguageModel>,
    memory: MemoryStore,
    config: CompressorConfig,
    state: Mutex<SessionState>,
}

impl ContextCompressor {
    /// Resumes from summaries already in the Memory Store
    pub fn new(model: Arc<dyn LanguageModel>, memory: MemoryStore, config: CompressorConfig) -> Self {
        let state = SessionState {
            summaries: memory.summaries(),
            ..Default::default()
        };

        Self {
            model,
            memory,
            config,
            state: Mutex::new(state),
        }
    }

    /// Record a turn. Returns true when this turn triggered summarization.
    pub async fn add_turn(&self, role: TurnRole, content: &str) -> bool {
        let mut state = self.state.lock().await;
        state.turns.push(Turn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        state.turn_count += 1;
        state.pending += 1;

        // Reset only once a summary is stored; an abandoned summarization retries next turn
        if state.pending < self.config.summarize_every.max(1) {
            return false;
        }

        let summary = self.summarize(&state.turns).await;
        if let Err(e) = self.memory.append_summary(&summary).await {
            log::warn!("Failed to persist session summary: {}", e);
        }
        state.summaries.push(summary);
        state.pending = 0;

        let keep = self.config.retain_turns;
        if state.turns.len() > keep {
            let drop = state.turns.len() - keep;
            state.turns.drain(..drop);
        }
        log::info!(
            "Compressed session at turn {} ({} summaries, {} turns retained)",
            state.turn_count,
            state.summaries.len(),
            state.turns.len()
        );
        true
    }

    /// Summaries first, then recent raw turns
    pub async fn compressed_context(&self) -> String {
        let state = self.state.lock().await;
        let mut out = String::new();

        if !state.summaries.is_empty() {
            out.push_str("## Previous summaries\n\n");
            for (i, summary) in state.summaries.iter().enumerate() {
                out.push_str(&format!("[{}] {}\n\n", i + 1, summary));
            }
        }

        if !state.turns.is_empty() {
            out.push_str("## Recent conversation\n\n");
            out.push_str(&render_turns(&state.turns));
        }

        out
    }

    pub async fn retained_turns(&self) -> usize {
        self.state.lock().await.turns.len()
    }

    pub async fn turn_count(&self) -> usize {
        self.state.lock().await.turn_count
    }

    pub async fn summaries(&self) -> Vec<String> {
        self.state.lock().await.summaries.clone()
    }

    async fn summarize(&self, turns: &[Turn]) -> String {
        let request = ModelRequest::new(SystemPrompts::summarizer(), render_turns(turns))
            .with_temperature(0.2)
            .with_max_tokens(1024);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        match tokio::time::timeout(timeout, self.model.call(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => truncate_chars(text.trim(), self.config.summary_max_chars),
            Ok(Ok(_)) => {
                log::warn!("Summarizer returned nothing; using truncation summary");
                self.fallback_summary(turns)
            }
            Ok(Err(e)) => {
                log::warn!("Summarizer failed ({}); using truncation summary", e);
                self.fallback_summary(turns)
            }
            Err(_) => {
                log::warn!("Summarizer timed out; using truncation summary");
                self.fallback_summary(turns)
            }
        }
    }

    fn fallback_summary(&self, turns: &[Turn]) -> String {
        let mut out = format!("Session excerpt ({} turns):\n", turns.len());
        for turn in turns {
            let first_line = turn.content.lines().next().unwrap_or("");
            out.push_str(&format!("- {}: {}\n", turn.role.as_str(), truncate_chars(first_line, 120)));
        }
        truncate_chars(&out, self.config.summary_max_chars)
    }
}

fn render_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}\n", t.role.as_str(), t.content))
        .collect()
}

/// Truncate on a char boundary
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
