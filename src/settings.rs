// Vibe-Forge: Settings
// Per-agent provider selection, API keys and pipeline limits, persisted as
// JSON under the user's config directory.

use crate::agents::{AgentSettings, AgentSuite, Analyzer, CodeWriter, Designer, Planner};
use crate::llm::{LanguageModel, LlmConfig, ProviderType, ResilientLlmProvider, RetryConfig};
use crate::memory::{CompressorConfig, FileSystemBackend, MemoryStore, DEFAULT_PATTERN_CAP};
use crate::studio_core::{QualityScorer, DEFAULT_THRESHOLD};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Model choice for one agent role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    4096
}

impl ProviderConfig {
    pub fn new(provider: &str, model: &str, temperature: f32) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            temperature,
            max_tokens: default_max_tokens(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider_type(&self) -> ProviderType {
        ProviderType::from_name(&self.provider)
    }

    /// Connection settings for this role, keys resolved through `keys`
    pub fn to_llm_config(&self, keys: &ApiKeys) -> LlmConfig {
        let provider = self.provider_type();
        let base = match provider {
            ProviderType::Anthropic => LlmConfig::anthropic(),
            ProviderType::Cerebras => LlmConfig::cerebras(),
            ProviderType::OpenRouter => LlmConfig::openrouter(),
            ProviderType::Ollama => LlmConfig::ollama(&self.model),
            ProviderType::OpenAICompatible => {
                LlmConfig::openai_compatible(&keys.compatible_url, &self.model, keys.key_for(&provider))
            }
            ProviderType::OpenAI => LlmConfig::default(),
        };

        LlmConfig {
            model: self.model.clone(),
            api_key: keys.key_for(&provider).or(base.api_key.clone()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..base
        }
    }

    fn agent_settings(&self, timeout: Duration) -> AgentSettings {
        AgentSettings {
            model: Some(self.model.clone()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout,
        }
    }
}

/// One provider choice per agent role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub planner: ProviderConfig,
    pub analyzer: ProviderConfig,
    pub code_writer: ProviderConfig,
    pub designer: ProviderConfig,
    pub debugger: ProviderConfig,
    pub summarizer: ProviderConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let model = "gpt-4o";
        Self {
            planner: ProviderConfig::new("openai", model, 0.7),
            analyzer: ProviderConfig::new("openai", model, 0.2),
            code_writer: ProviderConfig::new("openai", model, 0.3).with_max_tokens(8192),
            designer: ProviderConfig::new("openai", model, 0.8),
            debugger: ProviderConfig::new("openai", model, 0.2).with_max_tokens(8192),
            summarizer: ProviderConfig::new("openai", model, 0.3).with_max_tokens(1024),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub openai: String,
    #[serde(default)]
    pub anthropic: String,
    #[serde(default)]
    pub cerebras: String,
    #[serde(default)]
    pub openrouter: String,
    #[serde(default)]
    pub ollama_url: String,
    /// Base URL for an OpenAI-compatible server
    #[serde(default)]
    pub compatible_url: String,
}

impl ApiKeys {
    /// Stored key for a provider, falling back to its environment variable
    pub fn key_for(&self, provider: &ProviderType) -> Option<String> {
        let stored = match provider {
            ProviderType::OpenAI | ProviderType::OpenAICompatible => &self.openai,
            ProviderType::Anthropic => &self.anthropic,
            ProviderType::Cerebras => &self.cerebras,
            ProviderType::OpenRouter => &self.openrouter,
            ProviderType::Ollama => return Some("ollama".to_string()),
        };
        if !stored.trim().is_empty() {
            return Some(stored.clone());
        }
        provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Providers that have a usable key, in preference order
    pub fn configured_providers(&self) -> Vec<ProviderType> {
        [
            ProviderType::OpenAI,
            ProviderType::Anthropic,
            ProviderType::Cerebras,
            ProviderType::OpenRouter,
        ]
        .into_iter()
        .filter(|p| self.key_for(p).is_some())
        .collect()
    }
}

/// Limits and thresholds of the generation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quality_threshold: f64,
    pub max_debug_attempts: usize,
    pub pattern_cap: usize,
    pub summarize_every: usize,
    pub retain_turns: usize,
    pub summary_max_chars: usize,
    pub agent_timeout_secs: u64,
    pub max_plan_files: usize,
    /// Re-run the preview once after applying operations and repair what it reports
    pub auto_fix: bool,
    /// None keeps memory in-process
    pub memory_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: DEFAULT_THRESHOLD,
            max_debug_attempts: 3,
            pattern_cap: DEFAULT_PATTERN_CAP,
            summarize_every: 20,
            retain_turns: 5,
            summary_max_chars: 2000,
            agent_timeout_secs: 120,
            max_plan_files: 20,
            auto_fix: true,
            memory_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn scorer(&self) -> QualityScorer {
        QualityScorer::new(self.quality_threshold).with_max_plan_files(self.max_plan_files)
    }

    pub fn compressor(&self) -> CompressorConfig {
        CompressorConfig {
            summarize_every: self.summarize_every,
            retain_turns: self.retain_turns,
            summary_max_chars: self.summary_max_chars,
            ..CompressorConfig::default()
        }
    }

    /// Open the Memory Store this pipeline is configured for
    pub fn open_memory(&self) -> Result<MemoryStore> {
        match &self.memory_dir {
            Some(dir) => {
                let backend = FileSystemBackend::new(dir.clone())
                    .with_context(|| format!("Failed to open memory directory {}", dir.display()))?;
                Ok(MemoryStore::with_pattern_cap(Arc::new(backend), self.pattern_cap))
            }
            None => Ok(MemoryStore::with_pattern_cap(
                Arc::new(crate::memory::LocalStorageBackend::new()),
                self.pattern_cap,
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioSettings {
    #[serde(default)]
    pub agent_config: AgentConfig,
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `<config dir>/vibe-forge/settings.json`
pub fn settings_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config_dir.join("vibe-forge").join("settings.json")
}

/// `<data dir>/vibe-forge/memory`
pub fn default_memory_dir() -> PathBuf {
    let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("vibe-forge").join("memory")
}

impl StudioSettings {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&json).context("Failed to parse settings")
    }

    /// Saved settings if present, defaults otherwise
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring unreadable settings: {:#}", e);
                Self::default()
            }
        }
    }

    /// Model for one role: its configured provider first, then every other
    /// provider with a key as fallback
    pub fn build_model(&self, role: &ProviderConfig) -> Result<Arc<dyn LanguageModel>> {
        let primary = role.to_llm_config(&self.api_keys);
        let mut configs = vec![primary];

        for provider in self.api_keys.configured_providers() {
            if provider == role.provider_type() {
                continue;
            }
            let base = match provider {
                ProviderType::Anthropic => LlmConfig::anthropic(),
                ProviderType::Cerebras => LlmConfig::cerebras(),
                ProviderType::OpenRouter => LlmConfig::openrouter(),
                _ => LlmConfig::default(),
            };
            configs.push(LlmConfig {
                api_key: self.api_keys.key_for(&provider),
                temperature: role.temperature,
                ..base
            });
        }

        let provider = ResilientLlmProvider::from_configs(configs, RetryConfig::default())
            .context("No LLM provider configured. Set an API key in settings or the environment")?;
        Ok(Arc::new(provider))
    }

    /// Every agent on its own configured model
    pub fn build_agents(&self) -> Result<AgentSuite> {
        let timeout = self.pipeline.agent_timeout();
        let roles = &self.agent_config;

        let planner = Planner::new(self.build_model(&roles.planner)?, roles.planner.agent_settings(timeout));
        let analyzer = Analyzer::new(self.build_model(&roles.analyzer)?, roles.analyzer.agent_settings(timeout));
        let code_writer = CodeWriter::new(
            self.build_model(&roles.code_writer)?,
            roles.code_writer.agent_settings(timeout),
        );
        let designer = Designer::new(self.build_model(&roles.designer)?, roles.designer.agent_settings(timeout));
        let debug_writer = CodeWriter::new(self.build_model(&roles.debugger)?, roles.debugger.agent_settings(timeout));

        Ok(AgentSuite::from_agents(planner, analyzer, code_writer, designer, debug_writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = StudioSettings::default();
        settings.api_keys.cerebras = "csk-test".to_string();
        settings.pipeline.max_debug_attempts = 5;
        settings.save(&path).unwrap();

        let loaded = StudioSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"pipeline": {"quality_threshold": 0.9}}"#).unwrap();

        let loaded = StudioSettings::load(&path).unwrap();
        assert_eq!(loaded.pipeline.quality_threshold, 0.9);
        assert_eq!(loaded.pipeline.max_debug_attempts, 3);
        assert_eq!(loaded.pipeline.pattern_cap, 100);
        assert_eq!(loaded.agent_config.analyzer.temperature, 0.2);
    }

    #[test]
    fn test_missing_or_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert_eq!(StudioSettings::load_or_default(&missing), StudioSettings::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        assert_eq!(StudioSettings::load_or_default(&broken), StudioSettings::default());
    }

    #[test]
    fn test_stored_key_wins_over_environment() {
        let keys = ApiKeys {
            anthropic: "sk-ant-stored".to_string(),
            ..Default::default()
        };
        assert_eq!(keys.key_for(&ProviderType::Anthropic).as_deref(), Some("sk-ant-stored"));
        assert_eq!(keys.key_for(&ProviderType::Ollama).as_deref(), Some("ollama"));
    }

    #[test]
    fn test_role_config_carries_model_and_temperature() {
        let keys = ApiKeys {
            cerebras: "csk-test".to_string(),
            ..Default::default()
        };
        let role = ProviderConfig::new("cerebras", "llama-3.3-70b", 0.1).with_max_tokens(2048);
        let config = role.to_llm_config(&keys);

        assert_eq!(config.provider, ProviderType::Cerebras);
        assert_eq!(config.model, "llama-3.3-70b");
        assert_eq!(config.api_key.as_deref(), Some("csk-test"));
        assert_eq!(config.max_tokens, 2048);
    }

    #[test]
    fn test_pipeline_builds_scorer_and_compressor() {
        let pipeline = PipelineConfig {
            quality_threshold: 0.9,
            summarize_every: 10,
            ..PipelineConfig::default()
        };
        assert_eq!(pipeline.scorer().threshold(), 0.9);
        assert_eq!(pipeline.compressor().summarize_every, 10);
        assert_eq!(pipeline.compressor().retain_turns, 5);
    }

    #[tokio::test]
    async fn test_memory_dir_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PipelineConfig {
            memory_dir: Some(dir.path().join("memory")),
            ..PipelineConfig::default()
        };
        let memory = pipeline.open_memory().unwrap();
        assert!(memory.patterns().is_empty());
        assert!(dir.path().join("memory").is_dir());
    }
}
