use crate::llm::client::{GenerationParams, LLMClient};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    models::ModelOptions,
    Ollama,
};

pub struct OllamaClient {
    client: Ollama,
    model: String,
    params: GenerationParams,
}

impl OllamaClient {
    pub async fn new(base_url: String, model: String, params: GenerationParams) -> Result<Self> {
        let (host, port) = split_host_port(&base_url);
        let client = Ollama::new(host, port);

        Ok(Self {
            client,
            model,
            params,
        })
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut options = ModelOptions::default().temperature(self.params.temperature);
        if let Some(max_tokens) = self.params.max_tokens {
            options = options.num_predict(max_tokens as i32);
        }
        let request = ChatMessageRequest::new(self.model.clone(), messages).options(options);

        let response = tokio::time::timeout(
            self.params.timeout,
            self.client.send_chat_messages(request),
        )
        .await
        .map_err(|_| AppError::LLM("Ollama request timed out".to_string()))?
        .map_err(|e| AppError::LLM(format!("Ollama error: {}", e)))?;

        Ok(response.message.content)
    }
}

/// `http://host:port` into the scheme-qualified host and port `Ollama::new` expects.
fn split_host_port(base_url: &str) -> (String, u16) {
    let trimmed = base_url.trim().trim_end_matches('/');
    let (scheme, rest) = trimmed.split_once("://").unwrap_or(("http", trimmed));
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(11434)),
        None => (rest, 11434),
    };
    let host = if host.is_empty() { "localhost" } else { host };
    (format!("{}://{}", scheme, host), port)
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(vec![ChatMessage::user(prompt.to_string())]).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(vec![
            ChatMessage::system(system.to_string()),
            ChatMessage::user(prompt.to_string()),
        ])
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
