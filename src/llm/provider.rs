// Vibe-Forge: LLM Provider
// Concrete model backends:
// - Cerebras: via cerebras-rs (native high-speed client)
// - Anthropic: via rig-core
// - OpenAI/OpenRouter/Ollama/Compatible: via rig-core with custom base_url

use super::{LanguageModel, ModelRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;

/// Supported LLM providers
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub enum ProviderType {
    #[default]
    OpenAI,
    Anthropic,
    Cerebras,
    /// OpenRouter.ai - unified API for multiple models
    OpenRouter,
    /// Local Ollama server speaking the OpenAI protocol
    Ollama,
    /// Any OpenAI-compatible API (requires base_url)
    OpenAICompatible,
}

impl ProviderType {
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "anthropic" => ProviderType::Anthropic,
            "cerebras" => ProviderType::Cerebras,
            "openrouter" => ProviderType::OpenRouter,
            "ollama" => ProviderType::Ollama,
            "openai-compatible" | "openai_compatible" | "compatible" => ProviderType::OpenAICompatible,
            _ => ProviderType::OpenAI,
        }
    }

    /// Environment variable consulted when no key is configured
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI | ProviderType::OpenAICompatible => Some("OPENAI_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Cerebras => Some("CEREBRAS_API_KEY"),
            ProviderType::OpenRouter => Some("OPENROUTER_API_KEY"),
            ProviderType::Ollama => None,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderType,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::OpenAI,
            model: "gpt-4o".to_string(),
            api_key: env::var("OPENAI_API_KEY").ok(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

impl LlmConfig {
    /// Cerebras configuration using cerebras-rs native client
    pub fn cerebras() -> Self {
        Self {
            provider: ProviderType::Cerebras,
            model: "llama-4-scout-17b-16e-instruct".to_string(),
            api_key: env::var("CEREBRAS_API_KEY").ok(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 8192,
        }
    }

    /// Anthropic Claude configuration
    pub fn anthropic() -> Self {
        Self {
            provider: ProviderType::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: env::var("ANTHROPIC_API_KEY").ok(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 8192,
        }
    }

    /// OpenRouter configuration (access multiple models via one API)
    pub fn openrouter() -> Self {
        Self {
            provider: ProviderType::OpenRouter,
            model: "anthropic/claude-sonnet-4".to_string(),
            api_key: env::var("OPENROUTER_API_KEY").ok(),
            base_url: Some("https://openrouter.ai/api/v1".to_string()),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    /// Local Ollama server
    pub fn ollama(model: &str) -> Self {
        Self {
            provider: ProviderType::Ollama,
            model: model.to_string(),
            // Ollama ignores the key but the OpenAI client insists on one
            api_key: Some("ollama".to_string()),
            base_url: Some("http://localhost:11434/v1".to_string()),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    /// Custom OpenAI-compatible API (e.g., local LLM servers)
    pub fn openai_compatible(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            provider: ProviderType::OpenAICompatible,
            model: model.to_string(),
            api_key,
            base_url: Some(base_url.to_string()),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Unified LLM provider
#[derive(Debug, Clone)]
pub struct LlmProvider {
    config: LlmConfig,
}

impl LlmProvider {
    pub fn new(config: LlmConfig) -> Result<Self, anyhow::Error> {
        if config.api_key.is_none() {
            anyhow::bail!("API key not configured for {:?}", config.provider);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Configuration for one request: per-request parameters win over defaults
    fn effective_config(&self, request: &ModelRequest) -> LlmConfig {
        let mut config = self.config.clone();
        if let Some(model) = &request.model {
            config.model = model.clone();
        }
        config.temperature = request.temperature;
        config.max_tokens = request.max_tokens;
        config
    }

    async fn call_llm(&self, config: &LlmConfig, system: &str, user: &str) -> Result<String, anyhow::Error> {
        match config.provider {
            ProviderType::Cerebras => self.call_cerebras(config, system, user).await,
            ProviderType::Anthropic => self.call_anthropic(config, system, user).await,
            ProviderType::OpenAI => self.call_openai(config, system, user, None).await,
            ProviderType::OpenRouter => self.call_openrouter(config, system, user).await,
            ProviderType::Ollama | ProviderType::OpenAICompatible => {
                let base_url = config.base_url.as_deref()
                    .ok_or_else(|| anyhow::anyhow!("base_url required for {:?}", config.provider))?;
                self.call_openai(config, system, user, Some(base_url)).await
            }
        }
    }

    /// Call Cerebras using native cerebras-rs client (high-speed)
    async fn call_cerebras(&self, config: &LlmConfig, system: &str, user: &str) -> Result<String, anyhow::Error> {
        use cerebras_rs::{ChatCompletionRequest, Client, ModelIdentifier};

        let api_key = config.api_key.as_ref()
            .ok_or_else(|| anyhow::anyhow!("Cerebras API key not configured"))?;

        let client = Client::new(api_key);

        let model = match config.model.as_str() {
            "llama-4-scout-17b-16e-instruct" => ModelIdentifier::Llama4Scout17b16eInstruct,
            "llama-3.1-8b" | "llama3.1-8b" => ModelIdentifier::Llama3Period18b,
            "llama-3.3-70b" | "llama3.3-70b" => ModelIdentifier::Llama3Period370b,
            "qwen-3-32b" | "qwen3-32b" => ModelIdentifier::Qwen332b,
            "deepseek-r1-distill-llama-70b" => ModelIdentifier::DeepseekR1DistillLlama70b,
            _ => ModelIdentifier::Llama4Scout17b16eInstruct,
        };

        let request = ChatCompletionRequest::builder(model)
            .system_message(system)
            .user_message(user)
            .temperature(config.temperature as f64)
            .max_tokens(config.max_tokens)
            .build();

        let response = client.chat_completion(request).await?;

        let content = response.choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .map(|msg| msg.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            anyhow::bail!("Malformed response: Cerebras returned no content");
        }
        Ok(content)
    }

    /// Call Anthropic using rig-core
    async fn call_anthropic(&self, config: &LlmConfig, system: &str, user: &str) -> Result<String, anyhow::Error> {
        use rig::client::{CompletionClient, ProviderClient};
        use rig::completion::Prompt;
        use rig::providers::anthropic;

        let api_key = config.api_key.as_ref()
            .ok_or_else(|| anyhow::anyhow!("Anthropic API key not configured"))?;

        // rig-core's anthropic client reads its key from the environment
        std::env::set_var("ANTHROPIC_API_KEY", api_key);

        let client = anthropic::Client::from_env();
        let agent = client
            .agent(&config.model)
            .preamble(system)
            .temperature(config.temperature as f64)
            .max_tokens(config.max_tokens as u64)
            .build();

        let response = agent.prompt(user).await?;
        Ok(response)
    }

    /// Call OpenRouter using rig-core's native openrouter provider
    async fn call_openrouter(&self, config: &LlmConfig, system: &str, user: &str) -> Result<String, anyhow::Error> {
        use rig::client::CompletionClient;
        use rig::completion::Prompt;
        use rig::providers::openrouter;

        let api_key = config.api_key.as_ref()
            .ok_or_else(|| anyhow::anyhow!("OpenRouter API key not configured"))?;

        let client: openrouter::Client = openrouter::Client::new(api_key)?;
        let agent = client
            .agent(&config.model)
            .preamble(system)
            .temperature(config.temperature as f64)
            .max_tokens(config.max_tokens as u64)
            .build();

        let response = agent.prompt(user).await?;
        Ok(response)
    }

    /// Call OpenAI or OpenAI-compatible API using rig-core
    async fn call_openai(
        &self,
        config: &LlmConfig,
        system: &str,
        user: &str,
        base_url: Option<&str>,
    ) -> Result<String, anyhow::Error> {
        use rig::client::CompletionClient;
        use rig::completion::Prompt;
        use rig::providers::openai;

        let api_key = config.api_key.as_ref()
            .ok_or_else(|| anyhow::anyhow!("OpenAI API key not configured"))?;

        let client: openai::Client = match base_url {
            Some(url) => openai::Client::builder()
                .api_key(api_key)
                .base_url(url)
                .build()?,
            None => openai::Client::new(api_key)?,
        };

        let agent = client
            .agent(&config.model)
            .preamble(system)
            .temperature(config.temperature as f64)
            .max_tokens(config.max_tokens as u64)
            .build();

        let response = agent.prompt(user).await?;
        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for LlmProvider {
    async fn call(&self, request: ModelRequest) -> Result<String, anyhow::Error> {
        let config = self.effective_config(&request);
        log::debug!(
            "{:?}/{} request: {} system chars, {} user chars",
            config.provider,
            config.model,
            request.system_prompt.len(),
            request.user_prompt.len()
        );
        self.call_llm(&config, &request.system_prompt, &request.user_prompt).await
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_requires_api_key() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(LlmProvider::new(config).is_err());
    }

    #[test]
    fn test_request_overrides_config() {
        let provider = LlmProvider::new(LlmConfig::ollama("llama3")).unwrap();
        let request = ModelRequest::new("sys", "user")
            .with_model(Some("qwen2.5-coder".to_string()))
            .with_temperature(0.1)
            .with_max_tokens(2048);

        let config = provider.effective_config(&request);
        assert_eq!(config.model, "qwen2.5-coder");
        assert_eq!(config.max_tokens, 2048);
        assert!((config.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn test_provider_type_from_name() {
        assert_eq!(ProviderType::from_name("Anthropic"), ProviderType::Anthropic);
        assert_eq!(ProviderType::from_name("ollama"), ProviderType::Ollama);
        assert_eq!(ProviderType::from_name("something-else"), ProviderType::OpenAI);
    }
}
