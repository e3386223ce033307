// Vibe-Forge: Unified LLM API Layer
// Every agent talks to a model through the `LanguageModel` trait so the
// pipeline never depends on a concrete provider.

pub mod prompts;
pub mod provider;
pub mod resilient;

pub use prompts::{extract_code_block, extract_json, PromptContext, PromptTemplate, SystemPrompts};
pub use provider::{LlmConfig, LlmProvider, ProviderType};
pub use resilient::{ErrorKind, ResilientLlmProvider, ResilientLlmProviderBuilder, RetryConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One request to the language-model collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Overrides the provider's configured model when set
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// External text-completion capability. Fallible and untrusted.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn call(&self, request: ModelRequest) -> Result<String, anyhow::Error>;

    /// Name used in logs
    fn name(&self) -> &str {
        "model"
    }
}
