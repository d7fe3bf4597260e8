//! Client for OpenAI-compatible chat-completions endpoints.
//!
//! Used for OpenAI itself, Together AI, and (without the `ollama` feature)
//! Ollama's `/v1` compatibility layer.

use crate::llm::client::{GenerationParams, LLMClient};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct OpenAICompatClient {
    client: reqwest::Client,
    provider: &'static str,
    api_key: Option<String>,
    api_base: String,
    model: String,
    params: GenerationParams,
}

impl OpenAICompatClient {
    pub fn new(
        provider: &'static str,
        api_key: Option<String>,
        api_base: String,
        model: String,
        params: GenerationParams,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(params.timeout)
            .build()
            .map_err(|e| AppError::LLM(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            api_key: api_key.filter(|k| !k.is_empty()),
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            params,
        })
    }

    async fn chat(&self, messages: Vec<Value>) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.params.temperature,
        });
        if let Some(max_tokens) = self.params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("{} request failed: {}", self.provider, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::LLM(format!("{} response unreadable: {}", self.provider, e)))?;

        if !status.is_success() {
            return Err(AppError::LLM(format!(
                "{} API error ({}): {}",
                self.provider,
                status,
                truncate(&text, 300)
            )));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::LLM(format!("{} returned invalid JSON: {}", self.provider, e)))?;

        parse_completion(&json)
            .ok_or_else(|| AppError::LLM(format!("No response from {}", self.provider)))
    }
}

/// `choices[0].message.content`
fn parse_completion(body: &Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[async_trait]
impl LLMClient for OpenAICompatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(vec![json!({"role": "user", "content": prompt})])
            .await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(vec![
            json!({"role": "system", "content": system}),
            json!({"role": "user", "content": prompt}),
        ])
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello [1]"}}]
        });
        assert_eq!(parse_completion(&body).as_deref(), Some("Hello [1]"));
        assert_eq!(parse_completion(&json!({"choices": []})), None);
        assert_eq!(
            parse_completion(&json!({"choices": [{"message": {"content": null}}]})),
            None
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OpenAICompatClient::new(
            "Together",
            Some("key".into()),
            "https://api.together.xyz/v1/".into(),
            "m".into(),
            GenerationParams::default(),
        )
        .unwrap();
        assert_eq!(client.api_base, "https://api.together.xyz/v1");
        assert_eq!(client.model_name(), "m");
    }
}
