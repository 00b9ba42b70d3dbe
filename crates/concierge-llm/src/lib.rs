pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

use concierge_core::config::{AppConfig, ModelConfig};
use concierge_core::error::Result;
use concierge_core::traits::LlmClient;
use concierge_core::types::{ChatMessage, StreamDelta};

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for the configured provider.
///
/// Every supported provider speaks the OpenAI chat-completions protocol;
/// the provider name only selects endpoint defaults.
pub fn create_client(_config: &ModelConfig) -> Box<dyn LlmClient> {
    Box::new(OpenAiClient::new())
}

/// Build the process-wide client: primary model wrapped with retry and fallbacks.
pub fn build_client(config: &AppConfig) -> Arc<dyn LlmClient> {
    let primary = create_client(&config.model);
    let fallbacks: Vec<_> = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();

    if config.model.retry.is_none() && fallbacks.is_empty() {
        return Arc::from(primary);
    }
    let retry = config.model.retry.clone().unwrap_or_default();
    Arc::new(RetryingClient::new(primary, fallbacks, retry))
}

/// Drain a delta stream into the full response text.
pub async fn collect_text(mut stream: BoxStream<'_, Result<StreamDelta>>) -> Result<String> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(t) => text.push_str(&t),
            StreamDelta::Stop(reason) => debug!(?reason, "LLM stream stopped"),
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => debug!(input_tokens, output_tokens, "LLM usage"),
        }
    }
    Ok(text)
}

/// A client bound to one model config, for single-shot prompts.
#[derive(Clone)]
pub struct Completion {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl Completion {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }

    /// Same client, different sampling temperature.
    pub fn with_temperature(&self, temperature: f32) -> Self {
        Self {
            llm: self.llm.clone(),
            config: self.config.with_temperature(temperature),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Send a system + user prompt pair and return the trimmed reply.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.chat(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .await
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let stream = self.llm.chat_stream(&self.config, messages).await?;
        let text = collect_text(stream).await?;
        Ok(text.trim().to_string())
    }
}
