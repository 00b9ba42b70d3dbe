//! Test doubles shared by the Concierge crates.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use concierge_core::config::ModelConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::{Clock, LlmClient, Provider};
use concierge_core::types::{ChatMessage, StopReason, StreamDelta};

/// A model config pointing nowhere, for clients that ignore it.
pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "scripted".into(),
        model_id: "scripted-1".into(),
        api_key: None,
        base_url: None,
        max_tokens: 256,
        temperature: 0.0,
        retry: None,
        extra_headers: Default::default(),
    }
}

/// One scripted LLM turn.
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Error(String),
}

/// An `LlmClient` that answers from a queue of canned replies.
///
/// Replies are consumed in order. Once the queue is empty the fallback reply
/// is used if one is set, otherwise the call fails with `LlmRequest`.
/// Every request is recorded so tests can assert on prompts.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of text replies.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let llm = Self::new();
        for r in replies {
            llm.push_reply(r);
        }
        llm
    }

    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Text(text.into()));
        self
    }

    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Error(message.into()));
        self
    }

    /// Reply used when the queue runs dry.
    pub fn set_fallback(&self, text: impl Into<String>) -> &Self {
        *self.fallback.lock().unwrap() = Some(text.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    /// Content of the last message of the n-th request.
    pub fn user_prompt(&self, n: usize) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .get(n)
            .and_then(|msgs| msgs.last())
            .map(|m| m.content.clone())
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn next_reply(&self) -> Reply {
        if let Some(r) = self.replies.lock().unwrap().pop_front() {
            return r;
        }
        match self.fallback.lock().unwrap().clone() {
            Some(text) => Reply::Text(text),
            None => Reply::Error("no scripted reply left".into()),
        }
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.lock().unwrap().push(messages);
        let reply = self.next_reply();

        Box::pin(async move {
            match reply {
                Reply::Error(msg) => Err(ConciergeError::LlmRequest(msg)),
                Reply::Text(text) => {
                    // Split in two deltas so callers must concatenate.
                    let mid = text
                        .char_indices()
                        .nth(text.chars().count() / 2)
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    let (a, b) = text.split_at(mid);
                    let deltas = vec![
                        Ok(StreamDelta::TextDelta(a.to_string())),
                        Ok(StreamDelta::TextDelta(b.to_string())),
                        Ok(StreamDelta::Stop(StopReason::EndTurn)),
                    ];
                    Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, _>)
                }
            }
        })
    }
}

/// A `Provider` that returns a fixed value (or error) and records its inputs.
pub struct StaticProvider {
    name: String,
    response: std::result::Result<serde_json::Value, String>,
    inputs: Mutex<Vec<serde_json::Value>>,
}

impl StaticProvider {
    pub fn ok(name: &str, response: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            response: Ok(response),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            response: Err(message.to_string()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<serde_json::Value> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Static test provider"
    }

    fn fetch(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        self.inputs.lock().unwrap().push(input);
        let out = self
            .response
            .clone()
            .map_err(|m| ConciergeError::provider(&self.name, m));
        Box::pin(async move { out })
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    tick: Mutex<chrono::Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            tick: Mutex::new(chrono::Duration::zero()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }

    /// Move time forward by `by` after every read of `now()`.
    pub fn tick_on_read(&self, by: Duration) {
        *self.tick.lock().unwrap() = chrono::Duration::from_std(by).unwrap();
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        let current = *now;
        *now += *self.tick.lock().unwrap();
        current
    }
}
