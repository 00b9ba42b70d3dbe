use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use concierge_core::types::{ChatMessage, Role};

/// Ordered, append-only transcript threaded through a workflow run.
///
/// There is no way to remove or reorder entries once pushed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLog(Vec<ChatMessage>);

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.0.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.0.extend(messages);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.0
    }

    /// Content of the most recent assistant entry.
    pub fn last_assistant(&self) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn into_vec(self) -> Vec<ChatMessage> {
        self.0
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Whether a field counts as present for routing purposes.
///
/// Absent, `null`, `""`, `[]` and `{}` all count as not set.
pub fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

/// The record a workflow threads from node to node: named JSON fields plus
/// the message log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    fields: HashMap<String, Value>,
    messages: MessageLog,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insert for initial states.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value of a set field; blank strings read as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn is_set(&self, key: &str) -> bool {
        is_set(self.fields.get(key))
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn into_messages(self) -> MessageLog {
        self.messages
    }

    /// Fold a node's update into this state.
    ///
    /// Field operations apply in the order they were recorded; messages are
    /// appended after the existing log.
    pub fn apply(&mut self, update: StateUpdate) {
        for (key, value) in update.fields {
            match value {
                Some(Value::Null) | None => {
                    self.fields.remove(&key);
                }
                Some(v) => {
                    self.fields.insert(key, v);
                }
            }
        }
        self.messages.extend(update.messages);
    }
}

/// What a node returns: field writes/clears and messages to append.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    fields: Vec<(String, Option<Value>)>,
    messages: Vec<ChatMessage>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), Some(value.into())));
        self
    }

    pub fn clear(mut self, key: impl Into<String>) -> Self {
        self.fields.push((key.into(), None));
        self
    }

    /// Append an assistant message.
    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::assistant(text));
        self
    }

    pub fn push(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn extend(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.messages.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
