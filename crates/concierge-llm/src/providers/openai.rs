use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use concierge_core::config::ModelConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::LlmClient;
use concierge_core::types::*;

use crate::providers::presets::get_preset;
use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat client. Works with OpenAI, Ollama, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDeltaContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|m| OaiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content,
        })
        .collect()
}

/// Resolve the endpoint: explicit `base_url`, then the provider preset, then OpenAI.
fn endpoint(config: &ModelConfig) -> String {
    if let Some(url) = &config.base_url {
        return url.clone();
    }
    get_preset(&config.provider)
        .map(|p| p.default_base_url.to_string())
        .unwrap_or_else(|| OPENAI_API_URL.to_string())
}

fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(c) => c,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                deltas.push(Ok(StreamDelta::TextDelta(text)));
            }
        }
        if let Some(reason) = choice.finish_reason {
            let stop = match reason.as_str() {
                "length" => StopReason::MaxTokens,
                "stop_sequence" => StopReason::StopSequence,
                _ => StopReason::EndTurn,
            };
            deltas.push(Ok(StreamDelta::Stop(stop)));
        }
    }
    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }
    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let url = endpoint(&config);
            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: config.max_tokens,
                temperature: Some(config.temperature),
                stream: true,
            };

            debug!(url = %url, model = %config.model_id, "Sending chat request");
            let mut req = self.http.post(&url).json(&body);

            if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
            if let Some(preset) = get_preset(&config.provider) {
                for (k, v) in preset.extra_headers {
                    if !config.extra_headers.contains_key(*k) {
                        req = req.header(*k, *v);
                    }
                }
            }
            for (k, v) in &config.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .send()
                .await
                .map_err(|e| ConciergeError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(ConciergeError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let delta_stream = SseStream::new(response.bytes_stream())
                .map(|event| futures::stream::iter(parse_chunk(event)))
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_chunk_text() {
        let deltas = parse_chunk(event(r#"{"choices":[{"delta":{"content":"Ciao"}}]}"#));
        assert_eq!(deltas.len(), 1);
        match &deltas[0] {
            Ok(StreamDelta::TextDelta(t)) => assert_eq!(t, "Ciao"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_chunk_done_and_garbage() {
        assert!(parse_chunk(event("[DONE]")).is_empty());
        assert!(parse_chunk(event("not json")).is_empty());
    }

    #[test]
    fn test_parse_chunk_finish_reason() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#,
        ));
        assert!(matches!(
            deltas.as_slice(),
            [Ok(StreamDelta::Stop(StopReason::MaxTokens))]
        ));
    }

    #[test]
    fn test_endpoint_resolution() {
        let mut config = ModelConfig {
            provider: "ollama".into(),
            model_id: "llama3".into(),
            api_key: None,
            base_url: None,
            max_tokens: 100,
            temperature: 0.0,
            retry: None,
            extra_headers: Default::default(),
        };
        assert_eq!(endpoint(&config), "http://localhost:11434/v1/chat/completions");
        config.provider = "openai".into();
        assert_eq!(endpoint(&config), OPENAI_API_URL);
        config.base_url = Some("http://proxy/v1/chat/completions".into());
        assert_eq!(endpoint(&config), "http://proxy/v1/chat/completions");
    }

    #[test]
    fn test_convert_messages_roles() {
        let msgs = convert_messages(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        let roles: Vec<_> = msgs.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }

    #[tokio::test]
    async fn test_streams_reply_from_server() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Buon\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"giorno\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let config = ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            api_key: Some("sk-test".into()),
            base_url: Some(format!("{}/v1/chat/completions", server.uri())),
            max_tokens: 64,
            temperature: 0.0,
            retry: None,
            extra_headers: Default::default(),
        };
        let client = OpenAiClient::new();
        let stream = client
            .chat_stream(&config, vec![ChatMessage::user("ciao")])
            .await
            .unwrap();

        assert_eq!(crate::collect_text(stream).await.unwrap(), "Buongiorno");
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let config = ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            api_key: None,
            base_url: Some(server.uri()),
            max_tokens: 64,
            temperature: 0.0,
            retry: None,
            extra_headers: Default::default(),
        };
        let err = match OpenAiClient::new()
            .chat_stream(&config, vec![ChatMessage::user("ciao")])
            .await
        {
            Ok(_) => panic!("expected an HTTP error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("401"));
    }
}
