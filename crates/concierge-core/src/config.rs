use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConciergeError, Result};
use crate::types::Domain;

/// Top-level Concierge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Extra HTTP headers sent with every request.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

impl ModelConfig {
    /// Same model, different sampling temperature.
    pub fn with_temperature(&self, temperature: f32) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Pending-request store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a pending request stays resumable. Default: 600
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    /// Seconds between background sweeps of expired entries. Default: 60
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_pending_ttl_secs() -> u64 { 600 }
fn default_sweep_interval_secs() -> u64 { 60 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Domains answered with the "not yet available" message even when an
    /// agent exists for them.
    #[serde(default)]
    pub disabled_domains: Vec<Domain>,
}

/// Endpoints and HTTP settings for the data providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_horoscope_url")]
    pub horoscope_url: String,
    /// Base URL of the encyclopedia; `{lang}` is replaced by `encyclopedia_lang`.
    #[serde(default = "default_encyclopedia_url")]
    pub encyclopedia_url: String,
    #[serde(default = "default_encyclopedia_lang")]
    pub encyclopedia_lang: String,
    /// Appended to geocoding queries to bias results toward one country.
    #[serde(default = "default_geocode_country_hint")]
    pub geocode_country_hint: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_forecast_timezone")]
    pub forecast_timezone: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            geocode_url: default_geocode_url(),
            forecast_url: default_forecast_url(),
            horoscope_url: default_horoscope_url(),
            encyclopedia_url: default_encyclopedia_url(),
            encyclopedia_lang: default_encyclopedia_lang(),
            geocode_country_hint: default_geocode_country_hint(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            forecast_timezone: default_forecast_timezone(),
        }
    }
}

fn default_geocode_url() -> String { "https://nominatim.openstreetmap.org/search".to_string() }
fn default_forecast_url() -> String { "https://api.open-meteo.com/v1/forecast".to_string() }
fn default_horoscope_url() -> String { "https://horoscope-app-api.vercel.app/api/v1/get-horoscope".to_string() }
fn default_encyclopedia_url() -> String { "https://{lang}.wikipedia.org".to_string() }
fn default_encyclopedia_lang() -> String { "it".to_string() }
fn default_geocode_country_hint() -> Option<String> { Some("Italia".to_string()) }
fn default_user_agent() -> String { format!("Concierge/{}", env!("CARGO_PKG_VERSION")) }
fn default_timeout_secs() -> u64 { 10 }
fn default_forecast_timezone() -> String { "Europe/Rome".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConciergeError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| ConciergeError::Config(e.to_string()))
    }

    /// Build a config around a single model with every other section defaulted.
    pub fn with_model(model: ModelConfig) -> Self {
        Self {
            model,
            fallback_models: vec![],
            session: SessionConfig::default(),
            router: RouterConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
