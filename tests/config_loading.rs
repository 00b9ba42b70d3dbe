use std::io::Write;
use std::time::Duration;

use concierge_core::config::AppConfig;
use concierge_core::error::ConciergeError;
use concierge_core::types::Domain;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[model]
provider = "groq"
model_id = "llama-3.1-8b-instant"
api_key = "gsk-test-key"
max_tokens = 512
temperature = 0.2

[model.retry]
max_retries = 2
initial_backoff_ms = 200

[[fallback_models]]
provider = "ollama"
model_id = "llama3.2"
base_url = "http://localhost:11434/v1/chat/completions"

[session]
pending_ttl_secs = 120
sweep_interval_secs = 15

[router]
disabled_domains = ["calendar", "encyclopedia"]

[providers]
encyclopedia_lang = "en"
geocode_country_hint = "Svizzera"
timeout_secs = 5
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "groq");
    assert_eq!(config.model.model_id, "llama-3.1-8b-instant");
    assert_eq!(config.model.api_key, Some("gsk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 512);

    let retry = config.model.retry.expect("retry present");
    assert_eq!(retry.max_retries, 2);
    assert_eq!(retry.initial_backoff_ms, 200);
    assert_eq!(retry.max_backoff_ms, 30000);

    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.fallback_models[0].provider, "ollama");

    assert_eq!(config.session.pending_ttl(), Duration::from_secs(120));
    assert_eq!(config.session.sweep_interval(), Duration::from_secs(15));
    assert_eq!(
        config.router.disabled_domains,
        vec![Domain::Calendar, Domain::Encyclopedia]
    );

    assert_eq!(config.providers.encyclopedia_lang, "en");
    assert_eq!(config.providers.geocode_country_hint.as_deref(), Some("Svizzera"));
    assert_eq!(config.providers.timeout_secs, 5);
    assert_eq!(config.providers.forecast_timezone, "Europe/Rome");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("CONCIERGE_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${CONCIERGE_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("CONCIERGE_TEST_API_KEY");
}

#[test]
fn test_unknown_domain_is_a_config_error() {
    let toml_content = r#"
[model]
model_id = "llama3.2"

[router]
disabled_domains = ["astrology"]
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, ConciergeError::Config(_)));
}

#[test]
fn test_missing_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/concierge.toml")).unwrap_err();
    assert!(matches!(err, ConciergeError::ConfigNotFound(_)));
}
