//! LLM Client abstractions and provider selection
//!
//! Three backends are supported:
//! - **OpenAI**: chat-completions API
//! - **Together**: OpenAI-compatible chat-completions API
//! - **Ollama**: local inference server
//!
//! A backend is picked once per pipeline by [`Provider::detect`].

use crate::types::{AppError, Result};
use crate::utils::toml_config::{LlmConfig, ScholarConfig};
use async_trait::async_trait;
use std::time::Duration;

/// Generic LLM client trait for provider abstraction
///
/// All LLM providers implement this trait, allowing for easy swapping
/// between providers without changing application code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Sampling settings applied to every request of a client.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Secrets and environment overrides relevant to provider selection.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub together_api_key: Option<String>,
    /// Explicit provider preference; wins over the configuration file.
    pub preferred: Option<String>,
    pub ollama_base_url: Option<String>,
}

impl Credentials {
    /// Read the variables named by the configuration.
    pub fn from_env(config: &ScholarConfig) -> Self {
        Self {
            openai_api_key: config.resolve_env(&config.llm.openai.api_key_env),
            together_api_key: config.resolve_env(&config.llm.together.api_key_env),
            preferred: config.resolve_env(&config.llm.provider_env),
            ollama_base_url: config.resolve_env(&config.llm.ollama.base_url_env),
        }
    }
}

/// Provider enum for runtime selection
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// OpenAI API
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Together AI, reached through its OpenAI-compatible endpoint
    Together {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "llama3.1".to_string(),
    /// };
    /// ```
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Choose a backend from configuration and credentials.
    ///
    /// An explicit preference (credentials first, then configuration) wins and
    /// fails if its key is missing. Otherwise the first available of OpenAI,
    /// Together and Ollama is used; Ollama needs no key, so detection without
    /// a preference always succeeds.
    pub fn detect(config: &LlmConfig, credentials: &Credentials) -> Result<Provider> {
        let preferred = credentials
            .preferred
            .as_deref()
            .or(config.provider.as_deref())
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty());

        let openai = |key: &str| Provider::OpenAI {
            api_key: key.to_string(),
            api_base: config.openai.api_base.clone(),
            model: config.openai.model.clone(),
        };
        let together = |key: &str| Provider::Together {
            api_key: key.to_string(),
            api_base: config.together.api_base.clone(),
            model: config.together.model.clone(),
        };
        let ollama = || Provider::Ollama {
            base_url: credentials
                .ollama_base_url
                .clone()
                .unwrap_or_else(|| config.ollama.base_url.clone()),
            model: config.ollama.model.clone(),
        };

        match preferred.as_deref() {
            Some("openai") => credentials
                .openai_api_key
                .as_deref()
                .map(openai)
                .ok_or_else(|| missing_key("openai", &config.openai.api_key_env)),
            Some("together") => credentials
                .together_api_key
                .as_deref()
                .map(together)
                .ok_or_else(|| missing_key("together", &config.together.api_key_env)),
            Some("ollama") => Ok(ollama()),
            Some(other) => Err(AppError::Configuration(format!(
                "Unknown LLM provider '{}'. Available: openai, together, ollama",
                other
            ))),
            None => Ok(credentials
                .openai_api_key
                .as_deref()
                .map(openai)
                .or_else(|| credentials.together_api_key.as_deref().map(together))
                .unwrap_or_else(ollama)),
        }
    }

    /// Create a client instance for this provider
    pub async fn create_client(&self, params: &GenerationParams) -> Result<Box<dyn LLMClient>> {
        match self {
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            }
            | Provider::Together {
                api_key,
                api_base,
                model,
            } => Ok(Box::new(super::openai::OpenAICompatClient::new(
                self.name(),
                Some(api_key.clone()),
                api_base.clone(),
                model.clone(),
                params.clone(),
            )?)),

            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Box::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone(), params.clone())
                    .await?,
            )),

            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { base_url, model } => {
                Ok(Box::new(super::openai::OpenAICompatClient::new(
                    self.name(),
                    None,
                    format!("{}/v1", base_url.trim_end_matches('/')),
                    model.clone(),
                    params.clone(),
                )?))
            }
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Together { .. } => "Together",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    /// Configured model identifier
    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. }
            | Provider::Together { model, .. }
            | Provider::Ollama { model, .. } => model,
        }
    }
}

fn missing_key(provider: &str, env: &str) -> AppError {
    AppError::Configuration(format!(
        "Provider '{}' was requested but {} is not set",
        provider, env
    ))
}
