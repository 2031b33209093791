//! OpenAI-compatible language model and embedding client.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions` and `/embeddings`. Analysis prompts are single-turn
//! and non-streaming.

use async_trait::async_trait;
use querylens_core::{EmbeddingService, LanguageModel, ModelError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: Option<String>,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            embedding_model: None,
            temperature: 0.0,
            client,
        }
    }

    /// Create an OpenAI client (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Create an Ollama client (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama",
            model,
        )
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completion_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream: false,
        }
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<reqwest::Response, ModelError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(model = %self.name, status, body = %error_body, "Model endpoint returned error");
            return Err(ModelError::Api {
                status_code: status,
                message: error_body,
            });
        }
        Ok(response)
    }
}

fn map_transport_error(e: reqwest::Error, timeout: Duration) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        ModelError::Network(e.to_string())
    }
}

/// First choice's message content.
fn parse_completion(response: ChatResponse) -> Result<String, ModelError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ModelError::InvalidResponse("No choices in response".into()))
}

/// Embedding vectors ordered by their `index`.
fn parse_embeddings(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, ModelError> {
    let mut data = response.data;
    data.sort_by_key(|d| d.index);
    if data.len() != expected {
        return Err(ModelError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Sending completion request");

        let response = self
            .post_json("chat/completions", &self.completion_body(prompt), timeout)
            .await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        parse_completion(parsed)
    }
}

#[async_trait]
impl EmbeddingService for OpenAiCompatModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ModelError::InvalidResponse("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self
            .embedding_model
            .as_deref()
            .ok_or_else(|| ModelError::NotConfigured("no embedding model configured".into()))?;

        debug!(model = %model, count = texts.len(), "Sending embedding request");

        let body = serde_json::json!({
            "model": model,
            "input": texts,
            "encoding_format": "float",
        });
        let response = self
            .post_json("embeddings", &body, Duration::from_secs(30))
            .await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse embeddings: {e}")))?;

        parse_embeddings(parsed, texts.len())
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_constructor() {
        let m = OpenAiCompatModel::ollama(None, "llama3");
        assert_eq!(LanguageModel::name(&m), "ollama");
        assert_eq!(m.base_url, "http://localhost:11434/v1");
        assert_eq!(m.model(), "llama3");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let m = OpenAiCompatModel::new("custom", "http://host/v1/", "k", "m");
        assert_eq!(m.base_url, "http://host/v1");
    }

    #[test]
    fn completion_body_is_single_user_turn() {
        let m = OpenAiCompatModel::openai("k", "gpt-4o-mini").with_temperature(0.2);
        let json = serde_json::to_value(m.completion_body("classify this")).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "classify this");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn parse_completion_response() {
        let raw = r#"{"id":"x","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":"AGGREGATION|0.9"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_completion(parsed).unwrap(), "AGGREGATION|0.9");
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            parse_completion(parsed),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn parse_embedding_response_reorders_by_index() {
        let raw = r#"{"data":[{"embedding":[0.3,0.4],"index":1},{"embedding":[0.1,0.2],"index":0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        let vectors = parse_embeddings(parsed, 2).unwrap();
        assert_eq!(vectors[0], vec![0.1, 0.2]);
        assert_eq!(vectors[1], vec![0.3, 0.4]);
    }

    #[test]
    fn embedding_count_mismatch_rejected() {
        let raw = r#"{"data":[{"embedding":[0.1],"index":0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert!(parse_embeddings(parsed, 2).is_err());
    }

    #[tokio::test]
    async fn embedding_without_model_is_not_configured() {
        let m = OpenAiCompatModel::openai("k", "gpt-4o-mini");
        let err = m.embed("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured(_)));
    }
}
