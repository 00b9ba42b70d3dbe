use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use concierge_core::config::ProvidersConfig;
use concierge_core::error::{ConciergeError, Result};

/// Shared HTTP client: one timeout and one User-Agent for every provider.
pub(crate) fn build_client(config: &ProvidersConfig) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .unwrap_or_default()
}

/// Send a request and decode the JSON body, mapping every failure to a
/// provider error tagged with `provider`.
pub(crate) async fn get_json(provider: &str, req: RequestBuilder) -> Result<Value> {
    let response = req
        .send()
        .await
        .map_err(|e| ConciergeError::provider(provider, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConciergeError::provider(
            provider,
            format!("HTTP {}: {}", status, truncate(&body, 200)),
        ));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ConciergeError::provider(provider, format!("invalid JSON: {}", e)))
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Read a required string field from a provider input.
pub(crate) fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConciergeError::ProviderInput(format!("missing '{}'", key)))
}

pub(crate) fn required_f64(input: &Value, key: &str) -> Result<f64> {
    input
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ConciergeError::ProviderInput(format!("missing numeric '{}'", key)))
}
