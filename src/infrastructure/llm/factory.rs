use std::sync::Arc;
use std::time::Duration;

use super::http_client::HttpClient;
use super::{AnthropicProvider, OpenAiProvider};
use crate::config::{LlmConfig, LlmProviderKind};
use crate::domain::{DomainError, LlmProvider};

/// Factory for creating LLM providers
#[derive(Debug)]
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create the configured provider, reading the API key from `api_key_env`
    pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            DomainError::configuration(format!(
                "Environment variable {} is not set",
                config.api_key_env
            ))
        })?;

        Self::create(config, api_key)
    }

    /// Create the configured provider with an explicit API key
    pub fn create(
        config: &LlmConfig,
        api_key: impl Into<String>,
    ) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DomainError::configuration("LLM API key is empty"));
        }

        let http_client = HttpClient::with_timeout(Duration::from_secs(config.timeout_secs))?;

        let provider: Arc<dyn LlmProvider> = match (config.provider, &config.base_url) {
            (LlmProviderKind::OpenAi, Some(base_url)) => Arc::new(OpenAiProvider::with_base_url(
                http_client,
                api_key,
                base_url,
            )),
            (LlmProviderKind::OpenAi, None) => Arc::new(OpenAiProvider::new(http_client, api_key)),
            (LlmProviderKind::Anthropic, Some(base_url)) => Arc::new(
                AnthropicProvider::with_base_url(http_client, api_key, base_url),
            ),
            (LlmProviderKind::Anthropic, None) => {
                Arc::new(AnthropicProvider::new(http_client, api_key))
            }
        };

        tracing::info!(
            provider = provider.provider_name(),
            model = %config.model,
            "LLM provider configured"
        );

        Ok(provider)
    }

    /// Create an OpenAI provider directly
    pub fn create_openai(api_key: impl Into<String>) -> Arc<dyn LlmProvider> {
        Arc::new(OpenAiProvider::new(HttpClient::new(), api_key))
    }

    /// Create an Anthropic provider directly
    pub fn create_anthropic(api_key: impl Into<String>) -> Arc<dyn LlmProvider> {
        Arc::new(AnthropicProvider::new(HttpClient::new(), api_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_openai_provider() {
        let provider = LlmProviderFactory::create_openai("test-key");
        assert_eq!(provider.provider_name(), "openai");
    }

    #[test]
    fn test_create_anthropic_provider() {
        let provider = LlmProviderFactory::create_anthropic("test-key");
        assert_eq!(provider.provider_name(), "anthropic");
    }

    #[test]
    fn test_create_from_config() {
        let config = LlmConfig {
            provider: LlmProviderKind::Anthropic,
            base_url: Some("http://localhost:8081".to_string()),
            ..LlmConfig::default()
        };

        let provider = LlmProviderFactory::create(&config, "sk-test").unwrap();
        assert_eq!(provider.provider_name(), "anthropic");
    }

    #[test]
    fn test_create_rejects_empty_key() {
        let result = LlmProviderFactory::create(&LlmConfig::default(), "  ");
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_from_config_missing_env_var() {
        let config = LlmConfig {
            api_key_env: "AOP_AGENT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };

        let err = LlmProviderFactory::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("AOP_AGENT_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
