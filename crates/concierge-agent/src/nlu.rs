//! Structured extraction over the text-completion collaborator.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use concierge_core::traits::{Clock, SystemClock};
use concierge_llm::Completion;

/// What an agent asks the extractor to pull out of free text.
#[derive(Debug, Clone)]
pub struct DomainSchema {
    /// Short name for logs.
    pub name: &'static str,
    /// System prompt.
    pub system: String,
    /// Instructions with `{query}` and `{today}` placeholders.
    pub template: String,
}

impl DomainSchema {
    pub fn new(name: &'static str, system: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name,
            system: system.into(),
            template: template.into(),
        }
    }

    pub fn render(&self, query: &str, today: &str) -> String {
        self.template
            .replace("{today}", today)
            .replace("{query}", query)
    }
}

/// Outcome of an extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The collaborator produced a JSON object.
    Fields(Map<String, Value>),
    /// The reply could not be read as a JSON object.
    Invalid { raw: Option<String> },
    /// The collaborator could not be reached.
    Unavailable(String),
}

impl Extraction {
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match self {
            Extraction::Fields(map) => Some(map),
            _ => None,
        }
    }
}

/// Natural-language extraction collaborator.
///
/// Never fails: malformed replies become [`Extraction::Invalid`].
pub trait Extractor: Send + Sync + 'static {
    fn extract<'a>(&'a self, text: &'a str, schema: &'a DomainSchema) -> BoxFuture<'a, Extraction>;
}

/// Extractor backed by a chat completion that is asked to answer in JSON.
pub struct LlmExtractor {
    completion: Completion,
    clock: Arc<dyn Clock>,
}

impl LlmExtractor {
    pub fn new(completion: Completion) -> Self {
        Self::with_clock(completion, Arc::new(SystemClock))
    }

    pub fn with_clock(completion: Completion, clock: Arc<dyn Clock>) -> Self {
        Self { completion, clock }
    }
}

impl Extractor for LlmExtractor {
    fn extract<'a>(&'a self, text: &'a str, schema: &'a DomainSchema) -> BoxFuture<'a, Extraction> {
        Box::pin(async move {
            let today = self.clock.now().format("%d/%m/%Y").to_string();
            let prompt = schema.render(text, &today);

            let reply = match self.completion.complete(&schema.system, &prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(schema = schema.name, error = %e, "Extraction request failed");
                    return Extraction::Unavailable(e.to_string());
                }
            };

            match extract_json(&reply) {
                Some(fields) => {
                    debug!(schema = schema.name, keys = fields.len(), "Extracted fields");
                    Extraction::Fields(fields)
                }
                None => {
                    warn!(schema = schema.name, reply = %reply, "Unparseable extraction reply");
                    Extraction::Invalid { raw: Some(reply) }
                }
            }
        })
    }
}

/// Find a JSON object in a model reply.
///
/// Accepts a bare object, one wrapped in a code fence, or one surrounded by
/// prose (the outermost `{...}` span is tried).
pub fn extract_json(reply: &str) -> Option<Map<String, Value>> {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(Value::Object(map)) = serde_json::from_str(unfenced) {
        return Some(map);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&unfenced[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Trimmed, non-empty string field.
pub fn field_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Integer field, also accepting numeric strings and whole floats.
pub fn field_i64(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn field_f64(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean field, also accepting `"true"` / `"false"` strings.
pub fn field_bool(fields: &Map<String, Value>, key: &str) -> Option<bool> {
    match fields.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "si" | "sì" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_test_utils::{test_model_config, ManualClock, ScriptedLlm};
    use serde_json::json;

    fn schema() -> DomainSchema {
        DomainSchema::new("test", "Rispondi in JSON.", "Oggi è {today}. Query: {query}")
    }

    #[test]
    fn test_extract_json_variants() {
        let bare = extract_json(r#"{"location": "Roma"}"#).unwrap();
        assert_eq!(bare["location"], "Roma");

        let fenced = extract_json("```json\n{\"location\": \"Roma\"}\n```").unwrap();
        assert_eq!(fenced["location"], "Roma");

        let prose = extract_json("Ecco il risultato: {\"a\": 1} spero sia utile").unwrap();
        assert_eq!(prose["a"], 1);

        assert!(extract_json("nessun json qui").is_none());
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(extract_json("} rovesciato {").is_none());
    }

    #[test]
    fn test_field_helpers() {
        let fields = json!({
            "days": "2",
            "offset": 3.0,
            "valid": "true",
            "flag": false,
            "blank": "  ",
            "confidence": "0.8"
        });
        let fields = fields.as_object().unwrap();
        assert_eq!(field_i64(fields, "days"), Some(2));
        assert_eq!(field_i64(fields, "offset"), Some(3));
        assert_eq!(field_bool(fields, "valid"), Some(true));
        assert_eq!(field_bool(fields, "flag"), Some(false));
        assert_eq!(field_str(fields, "blank"), None);
        assert_eq!(field_f64(fields, "confidence"), Some(0.8));
        assert_eq!(field_i64(fields, "missing"), None);
    }

    #[tokio::test]
    async fn test_llm_extractor_renders_prompt() {
        let llm = Arc::new(ScriptedLlm::with_replies([r#"{"location": "Milano"}"#]));
        let extractor = LlmExtractor::with_clock(
            Completion::new(llm.clone(), test_model_config()),
            ManualClock::shared(),
        );

        let out = extractor.extract("meteo a Milano", &schema()).await;
        assert_eq!(out.fields().unwrap()["location"], "Milano");
        assert_eq!(
            llm.user_prompt(0).unwrap(),
            "Oggi è 01/06/2024. Query: meteo a Milano"
        );
    }

    #[tokio::test]
    async fn test_llm_extractor_never_fails() {
        let llm = Arc::new(ScriptedLlm::with_replies(["non so"]));
        llm.push_error("HTTP 503: unavailable");
        let extractor = LlmExtractor::new(Completion::new(llm, test_model_config()));

        let garbled = extractor.extract("x", &schema()).await;
        assert_eq!(garbled, Extraction::Invalid { raw: Some("non so".into()) });

        let down = extractor.extract("x", &schema()).await;
        assert!(matches!(down, Extraction::Unavailable(msg) if msg.contains("503")));
    }
}
