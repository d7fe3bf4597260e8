//! TOML-based configuration for Scholar Agent
//!
//! All settings live in a single `scholar.toml`. Every field has a default,
//! so an empty file (or no file at all) yields a working configuration.
//! Secrets are never stored in the file: the `[llm]` section names the
//! environment variables that hold API keys.

use crate::research::dedup::DedupConfig;
use crate::research::ranker::RankingConfig;
use crate::sources::{arxiv, crossref, BUILTIN_SOURCES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "scholar.toml";

/// Known language model provider names.
pub const PROVIDER_NAMES: &[&str] = &["openai", "together", "ollama"];

/// Root configuration structure loaded from scholar.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScholarConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

// ============= LLM Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Preferred provider (`openai`, `together`, `ollama`). Auto-detected when unset.
    #[serde(default)]
    pub provider: Option<String>,

    /// Environment variable that may override `provider`.
    #[serde(default = "default_provider_env")]
    pub provider_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "OpenAICompatConfig::openai")]
    pub openai: OpenAICompatConfig,

    #[serde(default = "OpenAICompatConfig::together")]
    pub together: OpenAICompatConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Settings for a provider speaking the OpenAI chat-completions schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAICompatConfig {
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub api_base: String,
    pub model: String,
}

impl OpenAICompatConfig {
    pub fn openai() -> Self {
        Self {
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn together() -> Self {
        Self {
            api_key_env: "TOGETHER_API_KEY".to_string(),
            api_base: "https://api.together.xyz/v1".to_string(),
            model: "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Environment variable that may override `base_url`.
    #[serde(default = "default_ollama_url_env")]
    pub base_url_env: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_provider_env() -> String {
    "DEFAULT_LLM_PROVIDER".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_url_env() -> String {
    "OLLAMA_BASE_URL".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            base_url_env: default_ollama_url_env(),
            model: default_ollama_model(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            provider_env: default_provider_env(),
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_llm_timeout(),
            openai: OpenAICompatConfig::openai(),
            together: OpenAICompatConfig::together(),
            ollama: OllamaConfig::default(),
        }
    }
}

// ============= Source Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Adapters to query, in this order
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP client timeout for provider requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub arxiv: ArxivConfig,

    #[serde(default)]
    pub crossref: CrossrefConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_url")]
    pub base_url: String,

    /// arXiv asks for at most one request every three seconds
    #[serde(default = "default_arxiv_interval")]
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossrefConfig {
    #[serde(default = "default_crossref_url")]
    pub base_url: String,

    /// Contact address for Crossref's polite pool
    #[serde(default)]
    pub mailto: Option<String>,

    /// Environment variable that may override `mailto`.
    #[serde(default = "default_mailto_env")]
    pub mailto_env: String,

    #[serde(default = "default_crossref_interval")]
    pub min_interval_ms: u64,
}

fn default_enabled_sources() -> Vec<String> {
    BUILTIN_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_user_agent() -> String {
    format!(
        "scholar-agent/{} (+https://github.com/dirmacs/scholar-agent)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_request_timeout() -> u64 {
    30
}

fn default_arxiv_url() -> String {
    arxiv::DEFAULT_BASE_URL.to_string()
}

fn default_arxiv_interval() -> u64 {
    3000
}

fn default_crossref_url() -> String {
    crossref::DEFAULT_BASE_URL.to_string()
}

fn default_mailto_env() -> String {
    "CROSSREF_MAILTO".to_string()
}

fn default_crossref_interval() -> u64 {
    100
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: default_arxiv_url(),
            min_interval_ms: default_arxiv_interval(),
        }
    }
}

impl Default for CrossrefConfig {
    fn default() -> Self {
        Self {
            base_url: default_crossref_url(),
            mailto: None,
            mailto_env: default_mailto_env(),
            min_interval_ms: default_crossref_interval(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            arxiv: ArxivConfig::default(),
            crossref: CrossrefConfig::default(),
        }
    }
}

// ============= Pipeline Configuration =============

/// How the query expander produces variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionMode {
    #[default]
    Heuristic,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of queries issued per run, seed included
    #[serde(default = "default_fanout")]
    pub fanout: usize,

    /// Upper bound on a per-run fanout override
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,

    /// Maximum records requested from each source per query
    #[serde(default = "default_per_query_cap")]
    pub per_query_cap: usize,

    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,

    /// Optional wall-clock bound for the whole retrieval round
    #[serde(default)]
    pub aggregation_deadline_secs: Option<u64>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_model_retry_limit")]
    pub model_retry_limit: u32,

    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,

    #[serde(default = "default_abstract_snippet_chars")]
    pub abstract_snippet_chars: usize,

    #[serde(default)]
    pub expansion: ExpansionMode,
}

fn default_fanout() -> usize {
    3
}

fn default_max_fanout() -> usize {
    10
}

fn default_per_query_cap() -> usize {
    25
}

fn default_adapter_timeout() -> u64 {
    30
}

fn default_top_k() -> usize {
    10
}

fn default_model_retry_limit() -> u32 {
    2
}

fn default_retry_pause_ms() -> u64 {
    500
}

fn default_abstract_snippet_chars() -> usize {
    600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fanout: default_fanout(),
            max_fanout: default_max_fanout(),
            per_query_cap: default_per_query_cap(),
            adapter_timeout_secs: default_adapter_timeout(),
            aggregation_deadline_secs: None,
            top_k: default_top_k(),
            model_retry_limit: default_model_retry_limit(),
            retry_pause_ms: default_retry_pause_ms(),
            abstract_snippet_chars: default_abstract_snippet_chars(),
            expansion: ExpansionMode::default(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    MissingContact,
    MissingCredential,
    AggressiveRateLimit,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl ScholarConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// Returns whether the file was found alongside the configuration.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, bool), ConfigError> {
        match Self::load(path) {
            Ok(config) => Ok((config, true)),
            Err(ConfigError::FileNotFound(_)) => Ok((Self::default(), false)),
            Err(e) => Err(e),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ScholarConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.fanout == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.fanout must be at least 1".to_string(),
            ));
        }
        if p.fanout > p.max_fanout {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.fanout ({}) exceeds pipeline.max_fanout ({})",
                p.fanout, p.max_fanout
            )));
        }
        if p.per_query_cap == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.per_query_cap must be at least 1".to_string(),
            ));
        }
        if p.adapter_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.adapter_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if p.aggregation_deadline_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "pipeline.aggregation_deadline_secs must be greater than 0".to_string(),
            ));
        }
        if self.sources.request_timeout_secs == 0 || self.llm.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request timeouts must be greater than 0".to_string(),
            ));
        }

        if self.sources.enabled.is_empty() {
            return Err(ConfigError::ValidationError(
                "sources.enabled must name at least one source".to_string(),
            ));
        }
        for id in &self.sources.enabled {
            if !BUILTIN_SOURCES.contains(&id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown source '{}' in sources.enabled. Available: {}",
                    id,
                    BUILTIN_SOURCES.join(", ")
                )));
            }
        }

        if let Some(provider) = &self.llm.provider {
            if !PROVIDER_NAMES.contains(&provider.to_lowercase().as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown LLM provider '{}'. Available: {}",
                    provider,
                    PROVIDER_NAMES.join(", ")
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be within [0, 2]".to_string(),
            ));
        }

        let t = self.dedup.title_similarity_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ConfigError::ValidationError(
                "dedup.title_similarity_threshold must be within (0, 1]".to_string(),
            ));
        }

        let r = &self.ranking;
        for (name, weight) in [
            ("ranking.relevance_weight", r.relevance_weight),
            ("ranking.recency_weight", r.recency_weight),
            ("ranking.unknown_date_recency", r.unknown_date_recency),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within [0, 1], got {}",
                    name, weight
                )));
            }
        }
        if r.relevance_decay <= 0.0 || r.title_match_weight < 0.0 || r.abstract_match_weight < 0.0
        {
            return Err(ConfigError::ValidationError(
                "ranking.relevance_decay must be positive and match weights non-negative"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and collect non-fatal warnings
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();

        if self.sources.enabled.iter().any(|s| s == crossref::SOURCE_ID)
            && self.crossref_mailto().is_none()
        {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::MissingContact,
                message: format!(
                    "No Crossref contact set (sources.crossref.mailto or {}); requests use the public pool",
                    self.sources.crossref.mailto_env
                ),
            });
        }

        if self.sources.enabled.iter().any(|s| s == arxiv::SOURCE_ID)
            && self.sources.arxiv.min_interval_ms < default_arxiv_interval()
        {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::AggressiveRateLimit,
                message: format!(
                    "sources.arxiv.min_interval_ms = {} is below arXiv's requested 3000 ms",
                    self.sources.arxiv.min_interval_ms
                ),
            });
        }

        if let Some(provider) = self.preferred_provider() {
            let key_env = match provider.as_str() {
                "openai" => Some(&self.llm.openai.api_key_env),
                "together" => Some(&self.llm.together.api_key_env),
                _ => None,
            };
            if let Some(env) = key_env {
                if self.resolve_env(env).is_none() {
                    warnings.push(ConfigWarning {
                        kind: ConfigWarningKind::MissingCredential,
                        message: format!(
                            "Provider '{}' is preferred but {} is not set",
                            provider, env
                        ),
                    });
                }
            }
        }

        Ok(warnings)
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Get a required value from an env var reference
    pub fn require_env(&self, env_name: &str) -> Result<String, ConfigError> {
        self.resolve_env(env_name)
            .ok_or_else(|| ConfigError::MissingEnvVar(env_name.to_string()))
    }

    /// Preferred provider: environment override first, then the file.
    pub fn preferred_provider(&self) -> Option<String> {
        self.resolve_env(&self.llm.provider_env)
            .or_else(|| self.llm.provider.clone())
            .map(|p| p.to_lowercase())
    }

    /// Crossref contact: environment override first, then the file.
    pub fn crossref_mailto(&self) -> Option<String> {
        self.resolve_env(&self.sources.crossref.mailto_env).or_else(|| {
            self.sources
                .crossref
                .mailto
                .clone()
                .filter(|m| !m.trim().is_empty())
        })
    }

    /// Ollama base URL: environment override first, then the file.
    pub fn ollama_base_url(&self) -> String {
        self.resolve_env(&self.llm.ollama.base_url_env)
            .unwrap_or_else(|| self.llm.ollama.base_url.clone())
    }

    /// Source settings with environment overrides applied.
    pub fn effective_sources(&self) -> SourcesConfig {
        let mut sources = self.sources.clone();
        sources.crossref.mailto = self.crossref_mailto();
        sources
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(format!("Failed to serialize: {}", e)))
    }
}
