// Vibe-Forge: Resilient LLM Provider
// Retry with exponential backoff and a fallback chain over any set of
// `LanguageModel` backends. Transport-level only: agent-level retries are
// the debug loop's business.

use super::{LanguageModel, LlmConfig, LlmProvider, ModelRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per provider
    pub max_retries: u32,
    /// Base delay between retries (will be multiplied exponentially)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0) to add randomness to delays
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Create a retry config for fast-failing scenarios
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 5000,
            jitter_factor: 0.1,
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let jitter_range = (capped_delay as f64 * self.jitter_factor) as u64;
        let jitter = if jitter_range > 0 {
            fastrand::u64(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_delay + jitter)
    }
}

/// Error classification for determining retry behavior
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Network issues, rate limits, timeouts
    Transient,
    /// Auth failures, invalid requests
    Permanent,
    /// Unknown error type - treat as transient with limited retries
    Unknown,
}

/// Substrings marking an error worth retrying: network trouble, throttling, 5xx
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "temporarily",
    "service unavailable",
    "internal server error",
    "too many requests",
    "rate limit",
    "overloaded",
    "quota",
    "500",
    "502",
    "503",
    "504",
    "429",
];

/// Substrings marking an error no retry will fix
const PERMANENT_MARKERS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "authentication",
    "api key not configured",
    "invalid api key",
    "bad request",
    "invalid",
    "not found",
    "unsupported model",
    "context length",
    "token limit",
    "400",
    "401",
    "403",
    "404",
];

impl ErrorKind {
    /// Classify an error from its message; transient markers win over permanent ones
    pub fn classify(error: &anyhow::Error) -> Self {
        let message = error.to_string().to_lowercase();
        let has_any = |markers: &[&str]| markers.iter().any(|m| message.contains(m));

        if has_any(TRANSIENT_MARKERS) {
            Self::Transient
        } else if has_any(PERMANENT_MARKERS) {
            Self::Permanent
        } else {
            Self::Unknown
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Transient | Self::Unknown)
    }
}

/// Statistics for resilient provider operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub retry_count: u64,
    pub fallback_count: u64,
    pub permanent_failures: u64,
}

/// A model that wraps several backends with retry and fallback logic
pub struct ResilientLlmProvider {
    /// Primary first, then fallbacks
    providers: Vec<Arc<dyn LanguageModel>>,
    retry_config: RetryConfig,
    stats: std::sync::Mutex<ResilienceStats>,
}

impl ResilientLlmProvider {
    pub fn new(
        primary: Arc<dyn LanguageModel>,
        fallbacks: Vec<Arc<dyn LanguageModel>>,
        retry_config: RetryConfig,
    ) -> Self {
        let mut providers = vec![primary];
        providers.extend(fallbacks);

        Self {
            providers,
            retry_config,
            stats: std::sync::Mutex::new(ResilienceStats::default()),
        }
    }

    /// Build from provider configurations; configs without usable keys are skipped
    pub fn from_configs(configs: Vec<LlmConfig>, retry_config: RetryConfig) -> Result<Self, anyhow::Error> {
        let mut providers: Vec<Arc<dyn LanguageModel>> = Vec::new();
        for config in configs {
            match LlmProvider::new(config) {
                Ok(provider) => providers.push(Arc::new(provider)),
                Err(e) => log::warn!("Skipping provider: {}", e),
            }
        }

        if providers.is_empty() {
            anyhow::bail!("At least one usable provider configuration is required");
        }

        let primary = providers.remove(0);
        Ok(Self::new(primary, providers, retry_config))
    }

    pub fn stats(&self) -> ResilienceStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn reset_stats(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = ResilienceStats::default();
        }
    }

    /// Walk the chain until a backend answers; each backend gets its own retries
    pub async fn complete(&self, request: ModelRequest) -> Result<String, anyhow::Error> {
        self.update_stats(|s| s.total_requests += 1);
        let total = self.providers.len();
        let mut failure = None;

        for (idx, provider) in self.providers.iter().enumerate() {
            let name = provider.name().to_string();
            if idx > 0 {
                self.update_stats(|s| s.fallback_count += 1);
                log::warn!("Falling back to {} ({}/{})", name, idx + 1, total);
            }

            let error = match self.try_provider_with_retries(provider.as_ref(), &request, &name).await {
                Ok(answer) => {
                    self.update_stats(|s| s.successful_requests += 1);
                    if idx > 0 {
                        log::info!("{} answered after {} backend(s) failed", name, idx);
                    }
                    return Ok(answer);
                }
                Err(e) => e,
            };

            let kind = ErrorKind::classify(&error);
            log::warn!("{} failed ({:?}): {}", name, kind, error);
            if kind == ErrorKind::Permanent {
                self.update_stats(|s| s.permanent_failures += 1);
            }
            failure = Some(error);
        }

        Err(failure.unwrap_or_else(|| anyhow::anyhow!("No providers configured")))
    }

    async fn try_provider_with_retries(
        &self,
        provider: &dyn LanguageModel,
        request: &ModelRequest,
        name: &str,
    ) -> Result<String, anyhow::Error> {
        let attempts = self.retry_config.max_retries + 1;
        let mut attempt = 0;

        loop {
            let error = match provider.call(request.clone()).await {
                Ok(answer) => {
                    if attempt > 0 {
                        log::info!("{} succeeded on retry {}", name, attempt);
                    }
                    return Ok(answer);
                }
                Err(e) => e,
            };

            let kind = ErrorKind::classify(&error);
            log::debug!("{} attempt {}/{} failed ({:?}): {}", name, attempt + 1, attempts, kind, error);
            if !kind.should_retry() || attempt + 1 >= attempts {
                return Err(error);
            }

            let delay = self.retry_config.calculate_delay(attempt);
            self.update_stats(|s| s.retry_count += 1);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut ResilienceStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

#[async_trait]
impl LanguageModel for ResilientLlmProvider {
    async fn call(&self, request: ModelRequest) -> Result<String, anyhow::Error> {
        self.complete(request).await
    }

    fn name(&self) -> &str {
        "resilient"
    }
}

/// Builder pattern for creating ResilientLlmProvider
pub struct ResilientLlmProviderBuilder {
    primary: Option<Arc<dyn LanguageModel>>,
    fallbacks: Vec<Arc<dyn LanguageModel>>,
    retry_config: RetryConfig,
}

impl Default for ResilientLlmProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilientLlmProviderBuilder {
    pub fn new() -> Self {
        Self {
            primary: None,
            fallbacks: Vec::new(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn primary(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.primary = Some(model);
        self
    }

    pub fn fallback(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.fallbacks.push(model);
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn build(self) -> Result<ResilientLlmProvider, anyhow::Error> {
        let primary = self.primary
            .ok_or_else(|| anyhow::anyhow!("Primary provider is required"))?;

        Ok(ResilientLlmProvider::new(primary, self.fallbacks, self.retry_config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails `failures` times with `error`, then answers "ok"
    struct FlakyModel {
        failures: usize,
        error: &'static str,
        calls: AtomicUsize,
    }

    impl FlakyModel {
        fn new(failures: usize, error: &'static str) -> Self {
            Self { failures, error, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl LanguageModel for FlakyModel {
        async fn call(&self, _request: ModelRequest) -> Result<String, anyhow::Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(anyhow::anyhow!(self.error))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn instant_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 1,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            jitter_factor: 0.0,
        };

        assert_eq!(config.calculate_delay(0).as_millis(), 1000);
        assert_eq!(config.calculate_delay(1).as_millis(), 2000);
        assert_eq!(config.calculate_delay(2).as_millis(), 4000);
        assert_eq!(config.calculate_delay(3).as_millis(), 8000);
        // capped
        assert_eq!(config.calculate_delay(4).as_millis(), 10000);
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(ErrorKind::classify(&anyhow::anyhow!("Connection timeout")), ErrorKind::Transient);
        assert_eq!(ErrorKind::classify(&anyhow::anyhow!("Rate limit exceeded (429)")), ErrorKind::Transient);
        assert_eq!(ErrorKind::classify(&anyhow::anyhow!("Unauthorized: Invalid API key")), ErrorKind::Permanent);
        assert_eq!(ErrorKind::classify(&anyhow::anyhow!("Bad request: invalid parameter")), ErrorKind::Permanent);
        assert_eq!(ErrorKind::classify(&anyhow::anyhow!("Something went wrong")), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let model = Arc::new(FlakyModel::new(2, "503 service unavailable"));
        let provider = ResilientLlmProviderBuilder::new()
            .primary(model.clone())
            .retry_config(instant_retries(3))
            .build()
            .unwrap();

        let out = provider.call(ModelRequest::new("s", "u")).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.stats().retry_count, 2);
    }

    #[tokio::test]
    async fn test_permanent_error_falls_back_without_retry() {
        let primary = Arc::new(FlakyModel::new(usize::MAX, "401 unauthorized"));
        let fallback = Arc::new(FlakyModel::new(0, ""));
        let provider = ResilientLlmProviderBuilder::new()
            .primary(primary.clone())
            .fallback(fallback.clone())
            .retry_config(instant_retries(3))
            .build()
            .unwrap();

        let out = provider.call(ModelRequest::new("s", "u")).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        let stats = provider.stats();
        assert_eq!(stats.fallback_count, 1);
        assert_eq!(stats.permanent_failures, 1);
    }
}
