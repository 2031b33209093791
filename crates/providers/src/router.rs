//! Builds the model stack from configuration.

use crate::disabled::DisabledModel;
use crate::openai_compat::OpenAiCompatModel;
use querylens_config::ModelConfig;
use querylens_core::{EmbeddingService, LanguageModel};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The language model plus the optional embedding service.
#[derive(Clone)]
pub struct ModelStack {
    pub language: Arc<dyn LanguageModel>,
    pub embeddings: Option<Arc<dyn EmbeddingService>>,
    pub timeout: Duration,
}

impl ModelStack {
    /// A stack whose model always fails; analysis runs on heuristics only.
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            language: Arc::new(DisabledModel::new(reason)),
            embeddings: None,
            timeout: Duration::from_millis(1),
        }
    }
}

/// Build the model stack from configuration.
///
/// Hosted providers without an API key yield a disabled model rather than
/// an error: the pipeline degrades to heuristics.
pub fn build_from_config(config: &ModelConfig) -> ModelStack {
    let timeout = Duration::from_millis(config.timeout_ms);
    let provider = config.provider.to_ascii_lowercase();

    if provider == "disabled" || provider == "none" {
        info!("Language model disabled by configuration");
        return ModelStack::disabled("model provider is disabled");
    }

    let api_key = match (&config.api_key, requires_api_key(&provider)) {
        (Some(key), _) => key.clone(),
        (None, false) => provider.clone(),
        (None, true) => {
            warn!(provider = %provider, "No API key configured, language model disabled");
            return ModelStack::disabled(format!("no API key for provider '{provider}'"));
        }
    };

    let base_url = if config.base_url.trim_end_matches('/') == OPENAI_BASE_URL {
        default_base_url(&provider)
    } else {
        config.base_url.clone()
    };

    let mut model = OpenAiCompatModel::new(&provider, &base_url, api_key, &config.model)
        .with_temperature(config.temperature);
    if let Some(embedding_model) = &config.embedding_model {
        model = model.with_embedding_model(embedding_model);
    }
    let model = Arc::new(model);

    info!(provider = %provider, model = %config.model, base_url = %base_url, "Model stack ready");

    ModelStack {
        language: model.clone(),
        embeddings: config
            .embedding_model
            .as_ref()
            .map(|_| model as Arc<dyn EmbeddingService>),
        timeout,
    }
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn requires_api_key(provider: &str) -> bool {
    !matches!(provider, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => OPENAI_BASE_URL.into(),
    }
}
